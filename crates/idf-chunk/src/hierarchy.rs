// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical chunking: one parent chunk per ATX heading, recursively
//! split children linked back by `parent_id`.

use crate::split::{self, Span};
use idf_core::{Chunk, ChunkConfig, ChunkPosition};

/// A heading-scoped section of the document.
#[derive(Debug)]
struct Section {
    /// Full section span: heading line plus immediate content, up to the
    /// next heading of any level.
    span: Span,
    /// Content span: the section minus its heading line (whole span for the
    /// preamble before the first heading).
    content: Span,
    /// Heading level 1..=6, or 0 for the preamble.
    level: u8,
    /// Heading text without the `#` markers.
    heading: Option<String>,
}

fn scan_sections(text: &str) -> Vec<Section> {
    let spans = split::split_headings(text, Span::whole(text));
    spans
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|span| {
            let slice = &text[span.start..span.end];
            match split::atx_level(slice) {
                Some(level) => {
                    let line_end = slice.find('\n').map(|i| i + 1).unwrap_or(slice.len());
                    let heading = slice[..line_end]
                        .trim_start_matches('#')
                        .trim()
                        .to_string();
                    Section {
                        span,
                        content: Span {
                            start: span.start + line_end,
                            end: span.end,
                        },
                        level,
                        heading: Some(heading),
                    }
                }
                None => Section {
                    span,
                    content: span,
                    level: 0,
                    heading: None,
                },
            }
        })
        .collect()
}

/// Emit parent and child chunks for `text` under the hierarchical strategy.
///
/// Every heading becomes a parent chunk covering the heading line and its
/// immediate content; the content is then split recursively into children
/// carrying `parent_id`, a truncated `parent_context`, and the parent's
/// heading level.  Text before the first heading yields flat level-0 chunks.
pub fn chunk_hierarchical(
    text: &str,
    doc_id: &str,
    source_id: &str,
    config: &ChunkConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index = 0;

    for section in scan_sections(text) {
        let parent = if config.create_parent_chunks && section.heading.is_some() {
            let chunk = make_chunk(text, doc_id, source_id, index, section.span, &section);
            index += 1;
            chunks.push(chunk.clone());
            Some(chunk)
        } else {
            None
        };

        if section.content.is_empty() {
            continue;
        }

        let mut child_spans = Vec::new();
        split::recursive_spans(
            text,
            section.content,
            &config.separators,
            config.max_chars,
            &mut child_spans,
        );
        split::merge_short_tail(text, &mut child_spans, config.min_chars, config.max_chars);

        for span in child_spans {
            if text[span.start..span.end].trim().is_empty() {
                continue;
            }
            let mut chunk = make_chunk(text, doc_id, source_id, index, span, &section);
            if let Some(ref parent) = parent {
                chunk.hierarchy.parent_id = Some(parent.id.clone());
                chunk.hierarchy.parent_context =
                    Some(prefix_chars(&parent.text, config.parent_context_chars));
            }
            index += 1;
            chunks.push(chunk);
        }
    }

    chunks
}

fn make_chunk(
    text: &str,
    doc_id: &str,
    source_id: &str,
    index: usize,
    span: Span,
    section: &Section,
) -> Chunk {
    let mut chunk = Chunk::new(
        doc_id,
        source_id,
        index,
        &text[span.start..span.end],
        ChunkPosition {
            byte_start: span.start,
            byte_end: span.end,
            heading: section.heading.clone(),
            ..ChunkPosition::default()
        },
    );
    chunk.hierarchy.level = section.level;
    chunk
}

/// First `max_chars` chars of `text`, cut on a char boundary.
pub fn prefix_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use idf_core::{ChunkStrategy, hash};

    fn config(max_chars: usize) -> ChunkConfig {
        ChunkConfig {
            strategy: ChunkStrategy::Hierarchical,
            max_chars,
            min_chars: 1,
            overlap_chars: 0,
            parent_context_chars: 200,
            ..ChunkConfig::default()
        }
    }

    #[test]
    fn three_headings_yield_three_parents_and_children() {
        let text = "# A\n\naa\n\n## B\n\nbb\n\n## C\n\ncc";
        let doc = hash::doc_id(text.as_bytes());
        let chunks = chunk_hierarchical(text, &doc, "src_t", &config(20));

        let parents: Vec<_> = chunks
            .iter()
            .filter(|c| c.hierarchy.parent_id.is_none() && c.hierarchy.level > 0)
            .collect();
        let children: Vec<_> = chunks
            .iter()
            .filter(|c| c.hierarchy.parent_id.is_some())
            .collect();

        assert_eq!(parents.len(), 3);
        assert_eq!(children.len(), 3);
        assert_eq!(
            parents.iter().map(|p| p.hierarchy.level).collect::<Vec<_>>(),
            vec![1, 2, 2]
        );
    }

    #[test]
    fn child_parent_ids_resolve() {
        let text = "# A\n\naa\n\n## B\n\nbb\n\n## C\n\ncc";
        let doc = hash::doc_id(text.as_bytes());
        let chunks = chunk_hierarchical(text, &doc, "src_t", &config(20));

        for child in chunks.iter().filter(|c| c.hierarchy.parent_id.is_some()) {
            let pid = child.hierarchy.parent_id.as_ref().unwrap();
            let parent = chunks.iter().find(|c| &c.id == pid).expect("parent exists");
            assert!(parent.hierarchy.parent_id.is_none());
            assert!(parent.text.starts_with('#'));
            // The bb child hangs off the B parent, and so on.
            assert!(parent.text.contains(child.text.trim()));
        }
    }

    #[test]
    fn parent_context_is_truncated_parent_prefix() {
        let text = "# Heading\n\nbody text that goes on";
        let doc = hash::doc_id(text.as_bytes());
        let mut cfg = config(100);
        cfg.parent_context_chars = 5;
        let chunks = chunk_hierarchical(text, &doc, "src_t", &cfg);

        let child = chunks
            .iter()
            .find(|c| c.hierarchy.parent_id.is_some())
            .unwrap();
        assert_eq!(child.hierarchy.parent_context.as_deref(), Some("# Hea"));
    }

    #[test]
    fn preamble_without_heading_is_flat() {
        let text = "just prose, no headings at all";
        let doc = hash::doc_id(text.as_bytes());
        let chunks = chunk_hierarchical(text, &doc, "src_t", &config(100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].hierarchy.level, 0);
        assert!(chunks[0].hierarchy.parent_id.is_none());
    }

    #[test]
    fn create_parent_chunks_false_emits_children_only() {
        let text = "# A\n\naa\n\n## B\n\nbb";
        let doc = hash::doc_id(text.as_bytes());
        let mut cfg = config(20);
        cfg.create_parent_chunks = false;
        let chunks = chunk_hierarchical(text, &doc, "src_t", &cfg);
        assert!(chunks.iter().all(|c| c.hierarchy.parent_id.is_none()));
        assert!(chunks.iter().all(|c| !c.text.starts_with('#')));
    }

    #[test]
    fn heading_text_recorded_in_position() {
        let text = "## Setup\n\ninstall things";
        let doc = hash::doc_id(text.as_bytes());
        let chunks = chunk_hierarchical(text, &doc, "src_t", &config(100));
        assert!(chunks.iter().all(|c| c.position.heading.as_deref() == Some("Setup")));
    }
}
