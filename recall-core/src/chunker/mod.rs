//! # Document Chunker
//!
//! Deterministic semantic chunking of documents: split on major section
//! headers, accumulate toward a target token size, balance oversized chunks
//! at paragraph boundaries, and content-address every chunk with a 16-hex
//! SHA-256 prefix.
//!
//! Determinism is a hard requirement: the differ compares chunk hashes
//! across document versions, so the same input must always produce the same
//! boundaries and hashes.

mod tokens;

pub use tokens::estimate_tokens;

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::constants::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, MIN_PARAGRAPH_SIZE, TARGET_CHUNK_SIZE};

/// Chunker size limits, in tokens
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_chunk_size: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub min_paragraph_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: TARGET_CHUNK_SIZE,
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            min_paragraph_size: MIN_PARAGRAPH_SIZE,
        }
    }
}

/// One emitted chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Position in the document, 0-based
    pub index: usize,
    pub content: String,
    pub token_count: usize,
    /// 16 hex chars of SHA-256 over the trimmed content
    pub chunk_hash: String,
    /// Section title, or the first non-header line truncated to 100 chars
    pub context: String,
}

/// Full chunking result for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDocument {
    pub document_id: Uuid,
    pub chunks: Vec<DocumentChunk>,
    pub total_chunks: usize,
    /// 16 hex chars of SHA-256 over the trimmed full content
    pub content_hash: String,
    pub chunk_hashes: Vec<String>,
    /// Token size of the whole document
    pub total_tokens: usize,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^(#{1,6}\s+.*|={3,}|-{3,})$").expect("header regex is valid")
    })
}

/// 16-hex-char SHA-256 prefix over the trimmed input
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.trim().as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// Deterministic semantic chunker
#[derive(Debug, Clone, Default)]
pub struct SemanticChunker {
    config: ChunkerConfig,
}

/// One major section: an optional header line plus its body
#[derive(Debug, Clone)]
struct Section {
    title: Option<String>,
    text: String,
}

impl SemanticChunker {
    /// Create a chunker with default sizes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chunker with custom sizes
    #[must_use]
    pub fn with_config(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a document. Same input always yields identical hashes and
    /// boundaries.
    #[must_use]
    pub fn chunk(&self, original_content: &str, title: &str) -> ChunkedDocument {
        let sections = split_sections(original_content);

        let mut chunks: Vec<DocumentChunk> = Vec::new();
        let mut current = String::new();
        let mut current_title: Option<String> = None;

        for section in sections {
            let section_tokens = estimate_tokens(&section.text);
            let current_tokens = estimate_tokens(&current);

            // Close the running chunk rather than blow past the ceiling
            if current_tokens + section_tokens > self.config.max_chunk_size
                && current_tokens >= self.config.min_chunk_size
            {
                self.emit(&mut chunks, &current, current_title.take());
                current.clear();
            }

            if current_title.is_none() {
                current_title.clone_from(&section.title);
            }

            // Only the section just appended may be split at a paragraph
            // boundary; already-accumulated sections stay intact
            let mut last_section = section.text;
            loop {
                let combined = join_chunk(&current, &last_section);
                if estimate_tokens(&combined) < self.config.target_chunk_size {
                    current = combined;
                    break;
                }
                match self.balance_last_section(&current, &last_section) {
                    Some((before, after)) => {
                        self.emit(&mut chunks, &before, current_title.take());
                        current.clear();
                        last_section = after;
                    }
                    None => {
                        current = combined;
                        break;
                    }
                }
            }
        }

        if estimate_tokens(&current) >= self.config.min_paragraph_size {
            self.emit(&mut chunks, &current, current_title.take());
        }

        let chunk_hashes: Vec<String> = chunks.iter().map(|c| c.chunk_hash.clone()).collect();
        ChunkedDocument {
            document_id: Uuid::new_v4(),
            total_chunks: chunks.len(),
            content_hash: content_hash(original_content),
            chunk_hashes,
            total_tokens: estimate_tokens(original_content),
            chunks,
        }
    }

    /// Split within the last section's paragraphs: `before` keeps the
    /// accumulated prefix plus the section's leading paragraphs, `after` is
    /// the section's remainder. The split minimises
    /// `|tokens(before) - target|` under `tokens(before) >= min_chunk` and
    /// `tokens(after) >= min_paragraph`. The last section must contain at
    /// least two paragraphs; returns `None` when no split is feasible.
    fn balance_last_section(&self, prefix: &str, last_section: &str) -> Option<(String, String)> {
        let paragraphs: Vec<&str> = last_section.split("\n\n").collect();
        if paragraphs.len() < 2 {
            return None;
        }

        let mut best: Option<(usize, usize)> = None; // (split index, distance)
        for split in 1..paragraphs.len() {
            let before = join_chunk(prefix, &paragraphs[..split].join("\n\n"));
            let after = paragraphs[split..].join("\n\n");
            let before_tokens = estimate_tokens(&before);
            let after_tokens = estimate_tokens(&after);

            if before_tokens < self.config.min_chunk_size
                || after_tokens < self.config.min_paragraph_size
            {
                continue;
            }

            let distance = before_tokens.abs_diff(self.config.target_chunk_size);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((split, distance));
            }
        }

        let (split, _) = best?;
        Some((
            join_chunk(prefix, &paragraphs[..split].join("\n\n")),
            paragraphs[split..].join("\n\n"),
        ))
    }

    fn emit(&self, chunks: &mut Vec<DocumentChunk>, content: &str, title: Option<String>) {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return;
        }
        let context = title.unwrap_or_else(|| derive_context(trimmed));
        chunks.push(DocumentChunk {
            index: chunks.len(),
            content: trimmed.to_string(),
            token_count: estimate_tokens(trimmed),
            chunk_hash: content_hash(trimmed),
            context,
        });
    }
}

/// Accumulated chunk text plus the next piece, blank-line separated
fn join_chunk(prefix: &str, tail: &str) -> String {
    if prefix.is_empty() {
        tail.to_string()
    } else {
        format!("{prefix}\n\n{tail}")
    }
}

/// Split content at major-section headers. The header line leads its section.
fn split_sections(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut current_title: Option<String> = None;

    for line in content.lines() {
        if header_regex().is_match(line) {
            if !current_lines.is_empty() {
                sections.push(Section {
                    title: current_title.take(),
                    text: current_lines.join("\n"),
                });
                current_lines.clear();
            }
            current_title = Some(line.trim().to_string());
        }
        current_lines.push(line);
    }
    if !current_lines.is_empty() {
        sections.push(Section {
            title: current_title,
            text: current_lines.join("\n"),
        });
    }

    sections
}

/// First non-header line, truncated to 100 chars
fn derive_context(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !header_regex().is_match(line))
        .map_or_else(String::new, |line| {
            line.chars().take(100).collect::<String>()
        })
}
