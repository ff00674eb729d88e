// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-chunk
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Hierarchical (heading-scoped parent/child) chunking.
pub mod hierarchy;
/// Span-level splitting primitives.
pub mod split;

use idf_core::{Chunk, ChunkConfig, ChunkPosition, ChunkStrategy};
use idf_error::{ErrorCode, FoundryError};
use split::Span;
use tracing::debug;

/// Chunker version pinned into phase manifests for reproducibility.
pub const CHUNKER_VERSION: &str = concat!("idf-chunk/", env!("CARGO_PKG_VERSION"));

/// Normalise raw text before chunking: strip a UTF-8 BOM and fold CRLF / CR
/// line endings to LF.
///
/// All byte offsets recorded on chunks point into this normalised form.
pub fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// A validated, reusable chunking configuration.
///
/// Chunking is a pure function of `(text, config)`: identical inputs always
/// yield identical chunk ids, across processes and platforms.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Validate `config` and build a chunker.
    ///
    /// # Errors
    ///
    /// Returns `CHUNK_ERROR` for a zero `max_chars`, `min_chars` above
    /// `max_chars`, or an empty separator hierarchy in recursive mode.
    pub fn new(config: ChunkConfig) -> Result<Self, FoundryError> {
        if config.max_chars == 0 {
            return Err(FoundryError::new(
                ErrorCode::ChunkError,
                "max_chars must be positive",
            ));
        }
        if config.min_chars > config.max_chars {
            return Err(FoundryError::new(
                ErrorCode::ChunkError,
                format!(
                    "min_chars ({}) exceeds max_chars ({})",
                    config.min_chars, config.max_chars
                ),
            ));
        }
        if matches!(
            config.strategy,
            ChunkStrategy::Recursive | ChunkStrategy::Hierarchical
        ) && config.separators.is_empty()
        {
            return Err(FoundryError::new(
                ErrorCode::ChunkError,
                "recursive chunking requires a separator hierarchy",
            ));
        }
        Ok(Self { config })
    }

    /// The configuration this chunker was built from.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split `text` (already normalised) into chunks for `doc_id`.
    ///
    /// Returns an empty vector for blank input.  The produced chunks are
    /// ordered by `chunk_index`, carry byte spans into `text`, and satisfy
    /// `len <= max_chars`; spans tile the document for the flat strategies.
    pub fn chunk(
        &self,
        doc_id: &str,
        source_id: &str,
        text: &str,
    ) -> Result<Vec<Chunk>, FoundryError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chunks = match self.config.strategy {
            ChunkStrategy::Hierarchical => {
                hierarchy::chunk_hierarchical(text, doc_id, source_id, &self.config)
            }
            strategy => {
                let spans = self.flat_spans(text, strategy);
                self.render(text, doc_id, source_id, strategy, spans)
            }
        };

        debug!(
            target: "idf.chunk",
            doc_id,
            strategy = ?self.config.strategy,
            count = chunks.len(),
            "chunked document"
        );
        Ok(chunks)
    }

    fn flat_spans(&self, text: &str, strategy: ChunkStrategy) -> Vec<Span> {
        let whole = Span::whole(text);
        let max = self.config.max_chars;
        match strategy {
            ChunkStrategy::Fixed => {
                let mut out = Vec::new();
                split::hard_split(text, whole, max, &mut out);
                out
            }
            ChunkStrategy::Recursive => {
                let mut out = Vec::new();
                split::recursive_spans(text, whole, &self.config.separators, max, &mut out);
                split::merge_short_tail(text, &mut out, self.config.min_chars, max);
                out
            }
            ChunkStrategy::Paragraph => {
                self.boundary_spans(text, split::split_on(text, whole, "\n\n"), &["\n", ". ", " "])
            }
            ChunkStrategy::Heading => self.boundary_spans(
                text,
                split::split_headings(text, whole),
                &["\n\n", "\n", ". ", " "],
            ),
            ChunkStrategy::Page => self.boundary_spans(
                text,
                split::split_on(text, whole, "\u{c}"),
                &["\n\n", "\n", ". ", " "],
            ),
            ChunkStrategy::Sentence => {
                self.boundary_spans(text, split::split_sentences(text, whole), &[" "])
            }
            ChunkStrategy::Hierarchical => unreachable!("handled by caller"),
        }
    }

    /// Merge under-min fragments into their predecessor, then re-split any
    /// fragment still above `max_chars` with the next finer boundaries.
    fn boundary_spans(&self, text: &str, raw: Vec<Span>, finer: &[&str]) -> Vec<Span> {
        let finer: Vec<String> = finer.iter().map(|s| s.to_string()).collect();
        let merged = split::merge_short_fragments(text, raw, self.config.min_chars);
        let mut out = Vec::new();
        for span in merged {
            if split::char_len(text, span) <= self.config.max_chars {
                out.push(span);
            } else {
                split::recursive_spans(text, span, &finer, self.config.max_chars, &mut out);
            }
        }
        out
    }

    fn render(
        &self,
        text: &str,
        doc_id: &str,
        source_id: &str,
        strategy: ChunkStrategy,
        spans: Vec<Span>,
    ) -> Vec<Chunk> {
        let overlap = match strategy {
            ChunkStrategy::Page | ChunkStrategy::Heading | ChunkStrategy::Fixed => 0,
            _ => self.config.overlap_chars,
        };
        let newlines = newline_positions(text);

        let mut chunks = Vec::with_capacity(spans.len());
        let mut prev_text: Option<String> = None;
        let mut index = 0;
        for (ordinal, span) in spans.into_iter().enumerate() {
            let core = &text[span.start..span.end];
            if core.trim().is_empty() {
                continue;
            }
            let rendered = match (&prev_text, overlap) {
                (Some(prev), o) if o > 0 => {
                    let mut s = suffix_chars(prev, o);
                    s.push_str(core);
                    s
                }
                _ => core.to_string(),
            };

            let chunk = Chunk::new(
                doc_id,
                source_id,
                index,
                rendered,
                ChunkPosition {
                    byte_start: span.start,
                    byte_end: span.end,
                    page: (strategy == ChunkStrategy::Page).then_some(ordinal as u32 + 1),
                    line_start: Some(line_of(&newlines, span.start)),
                    line_end: Some(line_of(&newlines, span.end.saturating_sub(1))),
                    ..ChunkPosition::default()
                },
            );
            prev_text = Some(chunk.text.clone());
            index += 1;
            chunks.push(chunk);
        }
        chunks
    }
}

/// Last `max_chars` chars of `text`, cut on a char boundary.
pub fn suffix_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

fn newline_positions(text: &str) -> Vec<usize> {
    text.bytes()
        .enumerate()
        .filter_map(|(i, b)| (b == b'\n').then_some(i))
        .collect()
}

/// 1-based line number of the byte at `offset`.
fn line_of(newlines: &[usize], offset: usize) -> usize {
    newlines.partition_point(|&pos| pos < offset) + 1
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use idf_core::hash;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn recursive_ids_stable_and_bounded(
            text in "[a-z \n.]{0,400}",
            max in 8usize..64,
            overlap in 0usize..8,
        ) {
            let config = ChunkConfig {
                strategy: ChunkStrategy::Recursive,
                max_chars: max,
                min_chars: 1,
                overlap_chars: overlap,
                ..ChunkConfig::default()
            };
            let chunker = Chunker::new(config).unwrap();
            let doc_id = hash::doc_id(text.as_bytes());

            let a = chunker.chunk(&doc_id, "s", &text).unwrap();
            let b = chunker.chunk(&doc_id, "s", &text).unwrap();
            prop_assert_eq!(
                a.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
                b.iter().map(|c| c.id.clone()).collect::<Vec<_>>()
            );

            for chunk in &a {
                // Rendered length may carry the overlap prefix on top of the core span.
                prop_assert!(chunk.char_count <= max + overlap);
                prop_assert!(chunk.position.byte_end <= text.len());
                prop_assert!(chunk.position.byte_start < chunk.position.byte_end);
            }
        }

        #[test]
        fn fixed_windows_cover_everything(text in "[a-z0-9]{0,300}") {
            let config = ChunkConfig {
                strategy: ChunkStrategy::Fixed,
                max_chars: 16,
                min_chars: 1,
                overlap_chars: 0,
                ..ChunkConfig::default()
            };
            let chunker = Chunker::new(config).unwrap();
            let normalized = normalize(&text);
            let doc_id = hash::doc_id(normalized.as_bytes());
            let chunks = chunker.chunk(&doc_id, "s", &normalized).unwrap();

            if !normalized.trim().is_empty() {
                let rebuilt: String = chunks
                    .iter()
                    .map(|c| &normalized[c.position.byte_start..c.position.byte_end])
                    .collect();
                prop_assert_eq!(rebuilt, normalized);
            }
        }
    }
}
