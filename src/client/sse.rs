// Incremental `text/event-stream` decoder.
// Feeds arbitrary body chunks, yields the `data` payload of each complete event.
// Comment lines (keep-alives) and fields other than `data` are ignored.

use bytes::{Buf, BytesMut};

/// Longest unterminated line accepted before the stream is treated as malformed.
pub const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event line exceeds {limit} bytes without a line break")]
pub struct LineTooLong {
    pub limit: usize,
}

#[derive(Debug)]
pub struct SseDecoder {
    buf: BytesMut,
    data: Vec<String>,
    // Length of the trailing segment with no line break yet.
    tail: usize,
    max_line: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

fn is_eol(b: &u8) -> bool {
    *b == b'\n' || *b == b'\r'
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            data: Vec::new(),
            tail: 0,
            max_line,
        }
    }

    /// Buffers a body chunk. Fails, discarding everything buffered, once a single
    /// line grows past the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), LineTooLong> {
        self.buf.extend_from_slice(chunk);
        self.tail = match chunk.iter().rposition(is_eol) {
            Some(i) => chunk.len() - i - 1,
            None => self.tail + chunk.len(),
        };
        if self.tail > self.max_line {
            self.buf.clear();
            self.data.clear();
            self.tail = 0;
            return Err(LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(())
    }

    /// Next complete event's data, if one has been fully received.
    pub fn next_event(&mut self) -> Option<String> {
        while let Some(line) = self.next_line() {
            if line.is_empty() {
                if self.data.is_empty() {
                    continue;
                }
                let payload = self.data.join("\n");
                self.data.clear();
                return Some(payload);
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.find(':') {
                Some(i) => {
                    let value = &line[i + 1..];
                    (&line[..i], value.strip_prefix(' ').unwrap_or(value))
                }
                None => (line.as_str(), ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        None
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n' || b == b'\r')?;
        // A trailing `\r` might be the first half of `\r\n`; wait for more input.
        if self.buf[end] == b'\r' && end + 1 == self.buf.len() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        let skip = if self.buf[end] == b'\r' && self.buf.get(end + 1) == Some(&b'\n') {
            2
        } else {
            1
        };
        self.buf.advance(end + skip);
        Some(line)
    }
}
