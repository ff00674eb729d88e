// SPDX-License-Identifier: MIT OR Apache-2.0
//! Table and JSON rendering for command output.

use idf_core::{Project, SourceRecord};
use idf_index::SearchResponse;

/// Truncate to `max` chars on a char boundary, appending `…` when cut.
pub fn snippet(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Short id prefix for terminal display.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Render a project summary block.
pub fn project_block(project: &Project) -> String {
    format!(
        "{}\n  model: {}/{} ({} dims)\n  chunking: {:?} max={} min={} overlap={}\n  \
         sources: {}  chunks: {}  vectors: {}  errors: {}\n  config: {}",
        project.id,
        project.model.provider,
        project.model.model_name,
        project
            .model
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".into()),
        project.chunking.strategy,
        project.chunking.max_chars,
        project.chunking.min_chars,
        project.chunking.overlap_chars,
        project.stats.total_sources,
        project.stats.total_chunks,
        project.stats.total_vectors,
        project.stats.total_errors,
        short_id(&project.config_sha256),
    )
}

/// Render the source ledger as aligned rows.
pub fn source_rows(sources: &[SourceRecord]) -> String {
    let mut out = String::new();
    for source in sources {
        out.push_str(&format!(
            "{:<40} {:<8} {:<10} {:>6}  {}\n",
            short_id(&source.id),
            source.kind,
            format!("{:?}", source.status).to_lowercase(),
            source.chunk_count,
            snippet(&source.uri, 60),
        ));
    }
    out
}

/// Wire-form name of the served mode.
pub fn mode_str(mode: idf_index::ResolvedMode) -> &'static str {
    use idf_index::ResolvedMode;
    match mode {
        ResolvedMode::Semantic => "semantic",
        ResolvedMode::Keyword => "keyword",
        ResolvedMode::Hybrid => "hybrid",
        ResolvedMode::KeywordFallback => "keyword_fallback",
    }
}

/// Render search hits as ranked rows.
pub fn search_rows(response: &SearchResponse) -> String {
    let mut out = format!("mode: {}\n", mode_str(response.mode));
    for (rank, hit) in response.hits.iter().enumerate() {
        let marker = if hit.expanded_from.is_some() { "+" } else { " " };
        out.push_str(&format!(
            "{marker}{:>3}. [{:.4}] {}  {}\n",
            rank + 1,
            hit.score,
            short_id(&hit.chunk.id),
            snippet(&hit.chunk.text, 80),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use idf_core::{ChunkConfig, ModelDescriptor, SourceKind};

    #[test]
    fn snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("short", 10), "short");
        let cut = snippet("ααααααααααα", 5);
        assert_eq!(cut.chars().count(), 5);
        assert!(cut.ends_with('…'));
        assert_eq!(snippet("line\nbreak", 20), "line break");
    }

    #[test]
    fn short_id_is_bounded() {
        assert_eq!(short_id("abcdef"), "abcdef");
        assert_eq!(short_id(&"a".repeat(64)).len(), 12);
    }

    #[test]
    fn project_block_mentions_key_facts() {
        let project =
            Project::new("docs", ModelDescriptor::mock(64), ChunkConfig::default()).unwrap();
        let block = project_block(&project);
        assert!(block.starts_with("docs"));
        assert!(block.contains("mock/mock-hash"));
        assert!(block.contains("64 dims"));
    }

    #[test]
    fn source_rows_align() {
        let sources = vec![
            SourceRecord::new(SourceKind::Url, "https://example.com/a", "a"),
            SourceRecord::new(SourceKind::Folder, "./docs", "docs"),
        ];
        let rows = source_rows(&sources);
        assert_eq!(rows.lines().count(), 2);
        assert!(rows.contains("url"));
        assert!(rows.contains("folder"));
        assert!(rows.contains("pending"));
    }
}
