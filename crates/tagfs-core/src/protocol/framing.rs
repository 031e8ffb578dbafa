//! Newline framing for byte streams.
//!
//! A backend may emit several JSON lines in one write, or split one line
//! across writes. [`LineBuffer`] keeps the unterminated tail until the next
//! chunk completes it.

/// Reassembles newline-delimited messages from arbitrary chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    ///
    /// Lines are trimmed; empty fragments are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(line) = Self::decode(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush whatever remains once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        Self::decode(&rest)
    }

    /// Bytes buffered without a terminating newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn decode(bytes: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Frame a message for a line-oriented stream.
pub fn frame(message: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(message.len() + 1);
    framed.extend_from_slice(message);
    framed.push(b'\n');
    framed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"status\":").is_empty());
        assert!(buf.push(b"\"ok\"").is_empty());
        assert_eq!(buf.push(b"}\n"), vec![r#"{"status":"ok"}"#]);
    }

    #[test]
    fn test_empty_fragments_and_crlf_are_dropped() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"\n\r\n  \n{\"x\":1}\r\n\n");
        assert_eq!(lines, vec![r#"{"x":1}"#]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut buf = LineBuffer::new();
        let text = "{\"m\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["{\"m\":\"héllo\"}"]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"{\"a\":1}\n{\"tail\"");
        assert_eq!(buf.finish().as_deref(), Some("{\"tail\""));
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_frame_appends_single_newline() {
        assert_eq!(frame(b"{\"action\":\"LIST\"}"), b"{\"action\":\"LIST\"}\n".to_vec());
    }
}
