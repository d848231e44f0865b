//! Line-run chunking for classification.
//!
//! Text is split into maximal runs of non-blank lines, so a paragraph (or a
//! block separated by a blank line in the flattened text) is one chunk.
//! Offsets are kept so findings can point back into the analysed text.

/// Default minimum words for a chunk to be classified.
pub const DEFAULT_MIN_CHUNK_WORDS: usize = 5;

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Chunks with fewer words are dropped.
    /// Default: 5.
    pub min_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_words: DEFAULT_MIN_CHUNK_WORDS,
        }
    }
}

impl ChunkConfig {
    /// Create a config with a specific minimum word count.
    pub fn with_min_words(mut self, min_words: usize) -> Self {
        self.min_words = min_words;
        self
    }
}

/// A chunk and its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Split text into runs of non-blank lines, dropping short runs.
///
/// A line is blank when it holds only whitespace. Each chunk spans from the
/// start of its first line to the end of its last line.
pub fn chunk_lines(content: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    let mut offset = 0;

    let close = |span: Option<(usize, usize)>, chunks: &mut Vec<Chunk>| {
        if let Some((start, end)) = span {
            let chunk = Chunk {
                text: content[start..end].to_string(),
                start,
                end,
            };
            if chunk.word_count() >= config.min_words {
                chunks.push(chunk);
            }
        }
    };

    for line in content.split('\n') {
        let line_start = offset;
        let line_end = offset + line.len();
        offset = line_end + 1;

        if line.trim().is_empty() {
            close(run.take(), &mut chunks);
        } else {
            run = Some(match run {
                Some((start, _)) => (start, line_end),
                None => (line_start, line_end),
            });
        }
    }
    close(run, &mut chunks);

    chunks
}
