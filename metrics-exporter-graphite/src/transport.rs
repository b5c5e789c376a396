use std::{
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
};

use bytes::Bytes;
use thiserror::Error;

/// Errors that could occur while sending payloads to the remote server.
#[derive(Debug, Error)]
pub enum FlushError {
    /// Failed to resolve the remote address.
    #[error("failed to resolve remote address {host}:{port}")]
    Resolve {
        /// Configured host.
        host: String,

        /// Configured port.
        port: u16,

        /// Underlying resolution error.
        #[source]
        source: io::Error,
    },

    /// The remote address resolved to no usable addresses.
    #[error("remote address {host}:{port} did not resolve to any addresses")]
    NoAddress {
        /// Configured host.
        host: String,

        /// Configured port.
        port: u16,
    },

    /// Failed to bind the local socket used for sending.
    #[error("failed to bind local socket")]
    Bind(#[source] io::Error),

    /// Failed to send a payload.
    #[error("failed to send payload to {addr} after {} successful payloads", .report.payloads_sent)]
    Send {
        /// Resolved remote address.
        addr: SocketAddr,

        /// Payloads sent before the failure.
        report: FlushReport,

        /// Underlying send error.
        #[source]
        source: io::Error,
    },
}

impl FlushError {
    /// Returns the payloads that were sent before the error occurred.
    ///
    /// Only a failed send can follow successful ones, so this is empty for every other error.
    pub fn partial_report(&self) -> FlushReport {
        match self {
            FlushError::Send { report, .. } => *report,
            _ => FlushReport::default(),
        }
    }
}

/// Summary of a flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of payloads sent.
    pub payloads_sent: usize,

    /// Number of bytes sent, across all payloads.
    pub bytes_sent: usize,
}

impl FlushReport {
    /// Tracks a payload that was sent.
    pub fn track_payload_sent(&mut self, bytes_len: usize) {
        self.payloads_sent += 1;
        self.bytes_sent += bytes_len;
    }
}

/// Address of the remote Graphite server.
///
/// The host is resolved on every flush, so that changes in DNS are picked up without restarting the host process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteAddr {
    host: String,
    port: u16,
}

impl RemoteAddr {
    /// Creates a new `RemoteAddr`.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves the address, preferring IPv4 addresses when the host has both.
    fn resolve(&self) -> Result<SocketAddr, FlushError> {
        let addrs = (self.host.as_str(), self.port).to_socket_addrs().map_err(|source| FlushError::Resolve {
            host: self.host.clone(),
            port: self.port,
            source,
        })?;

        let mut fallback = None;
        for addr in addrs {
            if addr.is_ipv4() {
                return Ok(addr);
            }
            fallback.get_or_insert(addr);
        }

        fallback.ok_or_else(|| FlushError::NoAddress { host: self.host.clone(), port: self.port })
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A transport for delivering payloads to the remote server.
///
/// Delivery is best-effort: a transport sends every payload in order, and stops at the first failure.
pub trait Transport: Send {
    /// Returns the transport ID, such as `udp` for UDP.
    fn transport_id(&self) -> &'static str;

    /// Sends all of the given payloads to the remote address.
    ///
    /// # Errors
    ///
    /// If the remote address cannot be resolved, or any payload fails to send, an error is returned. Payloads sent
    /// before the failure are not retried.
    fn send(&mut self, remote: &RemoteAddr, payloads: &[Bytes]) -> Result<FlushReport, FlushError>;
}

/// UDP transport.
///
/// A new socket is opened for every flush, and closed once all payloads have been sent or a send fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    fn transport_id(&self) -> &'static str {
        "udp"
    }

    fn send(&mut self, remote: &RemoteAddr, payloads: &[Bytes]) -> Result<FlushReport, FlushError> {
        let addr = remote.resolve()?;
        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).map_err(FlushError::Bind)?;

        let mut report = FlushReport::default();
        for payload in payloads {
            let sent =
                socket.send_to(payload, addr).map_err(|source| FlushError::Send { addr, report, source })?;
            report.track_payload_sent(sent);
        }

        Ok(report)
    }
}
