//! Sentence segmentation of a streamed reply

/// Sentence-ending characters, line break included
pub const DEFAULT_DELIMITERS: &[char] = &['。', '！', '？', '!', '?', '\n'];

/// Accumulates reply deltas and cuts them into speakable sentences
///
/// At most one segment is emitted per delta; anything left over is picked up
/// by the next delta or by [`SpeechSegmenter::finish`].
#[derive(Debug, Clone)]
pub struct SpeechSegmenter {
    buffer: String,
    delimiters: Vec<char>,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITERS.to_vec())
    }
}

impl SpeechSegmenter {
    #[must_use]
    pub const fn new(delimiters: Vec<char>) -> Self {
        Self {
            buffer: String::new(),
            delimiters,
        }
    }

    /// Feed one delta, returning a completed sentence if one closed
    ///
    /// The cut is made after the earliest delimiter in the buffer, whatever
    /// its position in the delimiter list. At most one segment is returned
    /// per call; further delimiters stay buffered for the next push or
    /// [`finish`](Self::finish).
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);

        let (at, delimiter) = self
            .buffer
            .char_indices()
            .find(|(_, c)| self.delimiters.contains(c))?;

        let rest = self.buffer.split_off(at + delimiter.len_utf8());
        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Text received but not yet emitted
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// End of stream: whatever is buffered, delimiter or not
    #[must_use]
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}
