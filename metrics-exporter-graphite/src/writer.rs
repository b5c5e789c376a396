use bytes::{BufMut as _, Bytes, BytesMut};

/// Writes records into larger payloads for more efficient network I/O.
///
/// Graphite plaintext records are newline delimited, which means that multiple records can be sent in a single
/// datagram, and then trivially split apart by the remote server. This saves on the number of system calls required
/// to send the records over the network.
///
/// Payloads are filled greedily, in the order records are written: when a record would push the current payload over
/// the maximum payload length, the current payload is finalized and a new one is started with that record. A record is
/// never split across payloads, so a record that is longer than the maximum payload length on its own is still
/// written, as the sole record in its payload.
///
/// Every record in a payload is followed by a newline, including the last one, and the newlines count towards the
/// payload length.
pub struct PayloadWriter {
    max_payload_len: usize,
    payload_buf: BytesMut,
    current_records: usize,
    payloads: Vec<Bytes>,
}

impl PayloadWriter {
    /// Creates a new `PayloadWriter` with the given maximum payload length.
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            max_payload_len,
            payload_buf: BytesMut::with_capacity(max_payload_len),
            current_records: 0,
            payloads: Vec::new(),
        }
    }

    /// Returns the number of bytes in the current payload.
    fn current_payload_len(&self) -> usize {
        self.payload_buf.len()
    }

    /// Finalizes the current payload and starts a new one.
    ///
    /// If the current payload is empty, this method does nothing.
    fn finalize_current_payload(&mut self) {
        if self.current_records == 0 {
            return;
        }

        self.payloads.push(self.payload_buf.split().freeze());
        self.current_records = 0;
    }

    /// Writes a single record.
    ///
    /// The record should not contain any newlines.
    pub fn write_record(&mut self, record: &str) {
        let record_len = record.len() + 1;
        if self.current_records > 0 && self.current_payload_len() + record_len > self.max_payload_len {
            self.finalize_current_payload();
        }

        self.payload_buf.put_slice(record.as_bytes());
        self.payload_buf.put_u8(b'\n');
        self.current_records += 1;
    }

    /// Returns the number of payloads finalized so far, not counting the one currently being written.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns `true` if no payloads have been finalized yet.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Finalizes the current payload and returns all payloads written by this writer, in the order they were written.
    ///
    /// The writer is empty afterwards, and can be reused.
    pub fn payloads(&mut self) -> Vec<Bytes> {
        self.finalize_current_payload();
        std::mem::take(&mut self.payloads)
    }
}

/// Packs the given records into as few payloads as the greedy policy of [`PayloadWriter`] allows.
pub fn pack<I, S>(records: I, max_payload_len: usize) -> Vec<Bytes>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut writer = PayloadWriter::new(max_payload_len);
    for record in records {
        writer.write_record(record.as_ref());
    }
    writer.payloads()
}
