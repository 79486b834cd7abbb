/// Append-only answer buffer owned by a single stream session.
///
/// Appends are accepted until the session reaches a terminal state and
/// freezes the buffer; after that the text is read-only.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buf: String,
    frozen: bool,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns false (and drops the content) once frozen.
    pub fn append(&mut self, content: &str) -> bool {
        if self.frozen {
            return false;
        }
        self.buf.push_str(content);
        true
    }

    /// Freeze and return the final text. Idempotent.
    pub fn freeze(&mut self) -> &str {
        self.frozen = true;
        &self.buf
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
