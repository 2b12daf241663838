/// Forward-only cursor over a finished reply, yielding pieces of at most
/// `chunk_size` characters. Chunks never split a UTF-8 character.
#[derive(Debug, Clone)]
pub struct ChunkStream {
    source: String,
    offset: usize,
    chunk_size: usize,
}

impl ChunkStream {
    pub fn new(source: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            source: source.into(),
            offset: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.source.len()
    }

    pub fn remaining(&self) -> &str {
        &self.source[self.offset..]
    }
}

impl Iterator for ChunkStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.is_finished() {
            return None;
        }

        let rest = self.remaining();
        let end = rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());

        let chunk = rest[..end].to_string();
        self.offset += end;
        Some(chunk)
    }
}
