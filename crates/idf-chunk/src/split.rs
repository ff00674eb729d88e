// SPDX-License-Identifier: MIT OR Apache-2.0
//! Span-level splitting primitives.
//!
//! Everything here operates on byte spans into the normalised document so
//! that chunk ids (which hash `doc_id:byte_start:byte_end`) stay stable no
//! matter how the spans were produced.  Separators are attached to the
//! fragment they terminate, so concatenating all spans in order recovers the
//! document exactly.

/// A half-open byte span into the normalised document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start offset, inclusive.
    pub start: usize,
    /// End offset, exclusive.
    pub end: usize,
}

impl Span {
    /// Span covering all of `text` from offset 0.
    pub fn whole(text: &str) -> Self {
        Self {
            start: 0,
            end: text.len(),
        }
    }

    /// Byte length of the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for zero-length spans.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Number of chars in the slice a span covers.
pub fn char_len(text: &str, span: Span) -> usize {
    text[span.start..span.end].chars().count()
}

/// Split `span` on every occurrence of `sep`, attaching the separator to the
/// preceding fragment.  Full coverage: the fragments tile the span.
pub fn split_on(text: &str, span: Span, sep: &str) -> Vec<Span> {
    let slice = &text[span.start..span.end];
    let mut frags = Vec::new();
    let mut pos = 0;
    while let Some(idx) = slice[pos..].find(sep) {
        let end = pos + idx + sep.len();
        frags.push(Span {
            start: span.start + pos,
            end: span.start + end,
        });
        pos = end;
    }
    if pos < slice.len() {
        frags.push(Span {
            start: span.start + pos,
            end: span.end,
        });
    }
    frags
}

/// Split on sentence terminators (`.`, `!`, `?`) followed by whitespace.
/// The terminator and its trailing whitespace stay with the sentence.
pub fn split_sentences(text: &str, span: Span) -> Vec<Span> {
    let slice = &text[span.start..span.end];
    let bytes = slice.as_bytes();
    let mut frags = Vec::new();
    let mut frag_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut end = i + 1;
            let mut saw_ws = false;
            while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\n') {
                saw_ws = true;
                end += 1;
            }
            if saw_ws {
                frags.push(Span {
                    start: span.start + frag_start,
                    end: span.start + end,
                });
                frag_start = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    if frag_start < slice.len() {
        frags.push(Span {
            start: span.start + frag_start,
            end: span.end,
        });
    }
    frags
}

/// Split before every ATX heading line (`#{1..6}` followed by a space).
/// The heading line starts its fragment.
pub fn split_headings(text: &str, span: Span) -> Vec<Span> {
    let slice = &text[span.start..span.end];
    let mut cut_points = Vec::new();
    let mut line_start = 0;
    loop {
        if is_atx_heading(&slice[line_start..]) && line_start > 0 {
            cut_points.push(line_start);
        }
        match slice[line_start..].find('\n') {
            Some(idx) => line_start += idx + 1,
            None => break,
        }
        if line_start >= slice.len() {
            break;
        }
    }

    let mut frags = Vec::new();
    let mut prev = 0;
    for cut in cut_points {
        frags.push(Span {
            start: span.start + prev,
            end: span.start + cut,
        });
        prev = cut;
    }
    if prev < slice.len() {
        frags.push(Span {
            start: span.start + prev,
            end: span.end,
        });
    }
    frags
}

/// Returns the ATX heading level (1..=6) when `line` starts one.
pub fn atx_level(line: &str) -> Option<u8> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) && line.as_bytes().get(hashes) == Some(&b' ') {
        Some(hashes as u8)
    } else {
        None
    }
}

fn is_atx_heading(rest: &str) -> bool {
    atx_level(rest).is_some()
}

/// Recursively split `span` until every produced span fits `max_chars`,
/// walking the separator hierarchy coarsest-first and greedily packing
/// sibling fragments back together.
///
/// When the hierarchy is exhausted and a fragment still exceeds `max_chars`,
/// it is hard-split on char boundaries.
pub fn recursive_spans(
    text: &str,
    span: Span,
    separators: &[String],
    max_chars: usize,
    out: &mut Vec<Span>,
) {
    if span.is_empty() {
        return;
    }
    if char_len(text, span) <= max_chars {
        out.push(span);
        return;
    }
    let Some((sep, finer)) = separators.split_first() else {
        hard_split(text, span, max_chars, out);
        return;
    };

    let frags = split_on(text, span, sep);
    if frags.len() <= 1 {
        // Separator absent at this level; try the next finer one.
        recursive_spans(text, span, finer, max_chars, out);
        return;
    }

    let mut current: Option<Span> = None;
    for frag in frags {
        match current {
            None => current = Some(frag),
            Some(cur) => {
                let merged = Span {
                    start: cur.start,
                    end: frag.end,
                };
                if char_len(text, merged) <= max_chars {
                    current = Some(merged);
                } else {
                    flush(text, cur, finer, max_chars, out);
                    current = Some(frag);
                }
            }
        }
    }
    if let Some(cur) = current {
        flush(text, cur, finer, max_chars, out);
    }
}

fn flush(text: &str, span: Span, finer: &[String], max_chars: usize, out: &mut Vec<Span>) {
    if char_len(text, span) <= max_chars {
        out.push(span);
    } else {
        recursive_spans(text, span, finer, max_chars, out);
    }
}

/// Split `span` into windows of exactly `max_chars` chars (last one short),
/// always cutting on char boundaries.
pub fn hard_split(text: &str, span: Span, max_chars: usize, out: &mut Vec<Span>) {
    debug_assert!(max_chars > 0);
    let slice = &text[span.start..span.end];
    let mut window_start = 0;
    let mut count = 0;
    for (idx, _) in slice.char_indices() {
        if count == max_chars {
            out.push(Span {
                start: span.start + window_start,
                end: span.start + idx,
            });
            window_start = idx;
            count = 0;
        }
        count += 1;
    }
    if window_start < slice.len() {
        out.push(Span {
            start: span.start + window_start,
            end: span.end,
        });
    }
}

/// Merge a trailing span shorter than `min_chars` into its predecessor when
/// the merged result still fits `max_chars`.
pub fn merge_short_tail(text: &str, spans: &mut Vec<Span>, min_chars: usize, max_chars: usize) {
    while spans.len() >= 2 {
        let last = spans[spans.len() - 1];
        if char_len(text, last) >= min_chars {
            break;
        }
        let prev = spans[spans.len() - 2];
        let merged = Span {
            start: prev.start,
            end: last.end,
        };
        if char_len(text, merged) > max_chars {
            break;
        }
        spans.pop();
        *spans.last_mut().expect("len >= 1") = merged;
    }
}

/// Merge every span shorter than `min_chars` into its predecessor.
///
/// Callers re-split any merged span that overflowed `max_chars` with the
/// next finer boundary.
pub fn merge_short_fragments(text: &str, spans: Vec<Span>, min_chars: usize) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(prev) if char_len(text, span) < min_chars => prev.end = span.end,
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str, spans: &[Span]) -> Vec<String> {
        spans.iter().map(|s| text[s.start..s.end].to_string()).collect()
    }

    #[test]
    fn split_on_covers_input() {
        let text = "aa\n\nbb\n\ncc";
        let spans = split_on(text, Span::whole(text), "\n\n");
        assert_eq!(texts(text, &spans), vec!["aa\n\n", "bb\n\n", "cc"]);
        assert_eq!(spans.first().unwrap().start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
    }

    #[test]
    fn split_on_without_separator_is_identity() {
        let text = "no separators here";
        let spans = split_on(text, Span::whole(text), "\n\n");
        assert_eq!(spans, vec![Span::whole(text)]);
    }

    #[test]
    fn sentences_keep_terminators() {
        let text = "One. Two! Three? Four";
        let spans = split_sentences(text, Span::whole(text));
        assert_eq!(texts(text, &spans), vec!["One. ", "Two! ", "Three? ", "Four"]);
    }

    #[test]
    fn abbreviation_without_space_does_not_split() {
        let text = "v1.2 is out. Done";
        let spans = split_sentences(text, Span::whole(text));
        // "1.2" has no space after the dot, so only the real boundary splits.
        assert_eq!(texts(text, &spans), vec!["v1.2 is out. ", "Done"]);
    }

    #[test]
    fn heading_split_cuts_before_each_heading() {
        let text = "intro\n# A\nbody a\n## B\nbody b\n";
        let spans = split_headings(text, Span::whole(text));
        assert_eq!(
            texts(text, &spans),
            vec!["intro\n", "# A\nbody a\n", "## B\nbody b\n"]
        );
    }

    #[test]
    fn atx_levels() {
        assert_eq!(atx_level("# Title"), Some(1));
        assert_eq!(atx_level("###### Deep"), Some(6));
        assert_eq!(atx_level("####### Too deep"), None);
        assert_eq!(atx_level("#NoSpace"), None);
        assert_eq!(atx_level("plain"), None);
    }

    #[test]
    fn recursive_packs_greedily() {
        let text = "aa\n\nbb\n\ncc\n\ndd";
        let seps = vec!["\n\n".to_string(), "\n".to_string(), " ".to_string()];
        let mut out = Vec::new();
        recursive_spans(text, Span::whole(text), &seps, 9, &mut out);
        // Each "xx\n\n" fragment is 4 chars; two pack into 8 <= 9.
        assert_eq!(texts(text, &out), vec!["aa\n\nbb\n\n", "cc\n\ndd"]);
    }

    #[test]
    fn recursive_descends_for_oversize_fragments() {
        let text = "short\n\nthis one long fragment exceeds the cap";
        let seps = vec!["\n\n".to_string(), " ".to_string()];
        let mut out = Vec::new();
        recursive_spans(text, Span::whole(text), &seps, 12, &mut out);
        for span in &out {
            assert!(char_len(text, *span) <= 12, "span over cap: {:?}", span);
        }
        // Coverage: spans tile the document.
        assert_eq!(out.first().unwrap().start, 0);
        assert_eq!(out.last().unwrap().end, text.len());
        for pair in out.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let text = "αβγδεζηθικ"; // 10 two-byte chars
        let mut out = Vec::new();
        hard_split(text, Span::whole(text), 4, &mut out);
        assert_eq!(texts(text, &out), vec!["αβγδ", "εζηθ", "ικ"]);
    }

    #[test]
    fn merge_short_tail_folds_back() {
        let text = "aaaa bb";
        let mut spans = vec![Span { start: 0, end: 5 }, Span { start: 5, end: 7 }];
        merge_short_tail(text, &mut spans, 3, 10);
        assert_eq!(spans, vec![Span { start: 0, end: 7 }]);
    }

    #[test]
    fn merge_short_tail_respects_max() {
        let text = "aaaa bb";
        let mut spans = vec![Span { start: 0, end: 5 }, Span { start: 5, end: 7 }];
        merge_short_tail(text, &mut spans, 3, 6);
        // Merge would be 7 chars > 6: leave the short tail alone.
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn merge_short_fragments_extends_predecessor() {
        let text = "aaaa\nb\ncccc";
        let spans = vec![
            Span { start: 0, end: 5 },
            Span { start: 5, end: 7 },
            Span { start: 7, end: 11 },
        ];
        let merged = merge_short_fragments(text, spans, 3);
        assert_eq!(texts(text, &merged), vec!["aaaa\nb\n", "cccc"]);
    }
}
