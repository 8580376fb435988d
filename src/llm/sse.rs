//! Server-sent event framing for streamed chat completions

/// Accumulates raw body bytes and yields complete event blocks
///
/// Bytes are only decoded once a whole block has arrived, so a multi-byte
/// character split across network chunks is never mangled.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a body chunk; carriage returns are dropped so CRLF framing
    /// splits the same way as LF framing
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
    }

    /// Next block terminated by a blank line, if one is complete
    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    /// Whatever is left once the body has ended
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            None
        } else {
            Some(text.into_owned())
        }
    }
}

/// Payloads of the `data:` lines in one event block
#[must_use]
pub fn data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect()
}
