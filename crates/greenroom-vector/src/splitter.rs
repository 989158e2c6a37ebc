//! Sliding-window text splitter for document ingestion.
//!
//! Produces fixed-size overlapping segments of a source document. Splitting
//! is a pure function of the input text and the configured sizes, so
//! re-running ingestion over the same document yields the same chunks.

use greenroom_core::config::ChunkingConfig;

/// A single segment produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Verbatim substring of the source document.
    pub text: String,
    /// Byte offset of the segment start in the source, for provenance.
    pub start: usize,
}

/// Fixed-size sliding-window splitter with configurable overlap.
///
/// Sizes are measured in characters rather than bytes, so multi-byte UTF-8
/// input is never cut mid-character.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkSplitter {
    /// Create a splitter with the given chunk size and overlap, in characters.
    ///
    /// A zero chunk size is clamped to 1, and the overlap is clamped below
    /// the chunk size so the window always advances.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size - 1);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Build a splitter from the chunking section of the configuration.
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into overlapping segments in source order.
    ///
    /// Returns an empty vector for empty input. The final segment may be
    /// shorter than the configured chunk size.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offsets of every character boundary, plus the end of the text.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());

        let total_chars = boundaries.len() - 1;
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut pos = 0;
        loop {
            let end = (pos + self.chunk_size).min(total_chars);
            let start_byte = boundaries[pos];
            let end_byte = boundaries[end];
            chunks.push(TextChunk {
                text: text[start_byte..end_byte].to_string(),
                start: start_byte,
            });
            if end == total_chars {
                break;
            }
            pos += step;
        }

        chunks
    }

    /// Maximum segment length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between consecutive segments in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}
