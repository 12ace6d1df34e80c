//! Recursive character text splitter
//!
//! Splits text into chunks of at most `chunk_size` characters, preferring to
//! break on paragraph, then line, then word boundaries, and only splitting
//! inside a word as a last resort. Consecutive chunks share up to
//! `chunk_overlap` characters so that context spanning a boundary is kept.
//!
//! The same chunker must be used for learning and querying.

use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            // Overlap must stay below the chunk size or merging never advances
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator hierarchy (most preferred first)
    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|s| s.to_string()).collect();
        if self.separators.last().map(|s| !s.is_empty()).unwrap_or(true) {
            self.separators.push(String::new());
        }
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(idx).map(String::as_str).unwrap_or("");
        let finer = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut fitting), separator));
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(fitting, separator));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying a tail of at most
    /// `chunk_overlap` characters into the next chunk
    fn merge(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            let joined = if window.is_empty() { len } else { total + sep_len + len };

            if joined > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);

                // Drop from the front until the carried tail is within the
                // overlap and the next piece fits
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + sep_len + len > self.chunk_size)
                {
                    if let Some(front) = window.pop_front() {
                        total -= char_len(&front);
                        if !window.is_empty() {
                            total -= sep_len;
                        }
                    }
                }
                if window.is_empty() {
                    total = 0;
                }
            }

            total = if window.is_empty() { len } else { total + sep_len + len };
            window.push_back(piece);
        }

        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<String>, separator: &str) {
    let joined = window.iter().map(String::as_str).collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::default();
        assert_eq!(chunker.split("Project Alpha kickoff notes"), vec!["Project Alpha kickoff notes"]);
        assert!(chunker.split("   \n ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = TextChunker::new(50, 10);
        let text = "word ".repeat(200);
        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = TextChunker::new(40, 0);
        let text = "First paragraph is here.\n\nSecond paragraph is here.";
        let chunks = chunker.split(text);
        assert_eq!(chunks, vec!["First paragraph is here.", "Second paragraph is here."]);
    }

    #[test]
    fn test_neighbouring_chunks_overlap() {
        let chunker = TextChunker::new(30, 12);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunker.split(text);

        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word), "{:?} should overlap {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unbreakable_text_splits_by_character() {
        let chunker = TextChunker::new(10, 2);
        let chunks = chunker.split(&"x".repeat(35));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert!(chunks.len() >= 4);
    }

    #[test]
    fn test_multibyte_safe() {
        let chunker = TextChunker::new(5, 1);
        let chunks = chunker.split(&"é".repeat(12));
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }
}
