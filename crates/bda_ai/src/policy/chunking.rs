use super::model::Chunk;

const SENTENCE_END: [char; 3] = ['.', '!', '?'];

/// Splits document text into overlapping, sentence-aware chunks.
///
/// Sizes and offsets are measured in characters. Within each window the splitter looks backward
/// from the window end for the nearest `.`, `!` or `?` followed by a space or newline and cuts
/// there instead. A boundary is only taken when the next window would still start after the
/// current one, so the sequence always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkSplitter {
    /// `chunk_size` 0 is treated as 1; overlap is clamped to `chunk_size - 1`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Chunks {
        Chunks {
            chars: text.chars().collect(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            start: 0,
            ordinal: 0,
            done: false,
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split(text).map(|c| c.text).collect()
    }
}

/// Lazy chunk sequence. Restarting means calling [`ChunkSplitter::split`] again.
#[derive(Debug, Clone)]
pub struct Chunks {
    chars: Vec<char>,
    chunk_size: usize,
    chunk_overlap: usize,
    start: usize,
    ordinal: u32,
    done: bool,
}

impl Chunks {
    fn window_end(&self, start: usize) -> usize {
        let len = self.chars.len();
        let raw_end = (start + self.chunk_size).min(len);
        if raw_end == len {
            return raw_end;
        }
        // Nearest terminator whose following whitespace also lies inside the window.
        let mut p = raw_end.saturating_sub(2);
        loop {
            if p < start {
                return raw_end;
            }
            if SENTENCE_END.contains(&self.chars[p]) && matches!(self.chars[p + 1], ' ' | '\n') {
                let boundary = p + 1;
                return if boundary > start + self.chunk_overlap {
                    boundary
                } else {
                    raw_end
                };
            }
            if p == 0 {
                return raw_end;
            }
            p -= 1;
        }
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let len = self.chars.len();
        while !self.done {
            if self.start >= len {
                self.done = true;
                break;
            }
            let start = self.start;
            let end = if len <= self.chunk_size {
                len
            } else {
                self.window_end(start)
            };

            if end >= len {
                self.done = true;
            } else {
                self.start = end - self.chunk_overlap;
            }

            let window: String = self.chars[start..end].iter().collect();
            let trimmed = window.trim();
            if trimmed.is_empty() {
                continue;
            }
            let chunk = Chunk {
                ordinal: self.ordinal,
                start_offset: start,
                end_offset: end,
                text: trimmed.to_string(),
            };
            self.ordinal += 1;
            return Some(chunk);
        }
        None
    }
}
