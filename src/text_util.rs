//! Case folding, occurrence lookup and context snippets over page text.
//!
//! All matching goes through [`fold_case`] so that the prefilter and the
//! per-page scan agree on what "contains, ignoring case" means.

use std::ops::Range;

/// Default number of characters kept on each side of a match.
pub const DEFAULT_CONTEXT_CHARS: usize = 150;

/// Delimiters wrapped around every highlighted occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub open: &'static str,
    pub close: &'static str,
}

impl Marker {
    pub const HTML: Marker = Marker {
        open: "<mark>",
        close: "</mark>",
    };

    /// Bold black on yellow for terminals.
    pub const ANSI: Marker = Marker {
        open: "\x1b[1;30;43m",
        close: "\x1b[0m",
    };
}

impl Default for Marker {
    fn default() -> Self {
        Self::HTML
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase `text` one character at a time.
pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Folded copy of a text plus, for every folded byte, the byte offset of
/// the original character it came from.
struct Folded {
    text: String,
    origin: Vec<usize>,
    /// True where a folded byte starts an original character.
    boundary: Vec<bool>,
}

impl Folded {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        let mut boundary = Vec::with_capacity(original.len() + 1);

        for (offset, c) in original.char_indices() {
            let first = text.len();
            text.extend(c.to_lowercase());
            for byte in first..text.len() {
                origin.push(offset);
                boundary.push(byte == first);
            }
        }
        origin.push(original.len());
        boundary.push(true);

        Self {
            text,
            origin,
            boundary,
        }
    }
}

/// Byte ranges in `text` of every case-insensitive occurrence of
/// `keyword`, left to right, non-overlapping.
pub fn find_occurrences(text: &str, keyword: &str) -> Vec<Range<usize>> {
    let needle = fold_case(keyword);
    if needle.is_empty() {
        return Vec::new();
    }

    let folded = Folded::new(text);
    folded
        .text
        .match_indices(needle.as_str())
        .filter_map(|(start, m)| {
            let end = start + m.len();
            // Skip matches that begin or end inside an expanded character.
            (folded.boundary[start] && folded.boundary[end])
                .then(|| folded.origin[start]..folded.origin[end])
        })
        .collect()
}

/// Offset `n` characters before `from`, or 0.
fn back_chars(text: &str, from: usize, n: usize) -> usize {
    text[..from]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(from, |(i, _)| i)
}

/// Offset `n` characters after `from`, or the end of `text`.
fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}

/// Window of `radius` characters around `hit`, widened outward to the
/// nearest whitespace on both sides so no word is cut.
pub fn context_window(
    text: &str,
    hit: Range<usize>,
    radius: usize,
) -> Range<usize> {
    let mut start = back_chars(text, hit.start, radius);
    let mut end = forward_chars(text, hit.end, radius);

    while let Some(c) = text[..start].chars().next_back() {
        if text[start..].starts_with(char::is_whitespace) {
            break;
        }
        start -= c.len_utf8();
    }
    while let Some(c) = text[end..].chars().next() {
        if c.is_whitespace() {
            break;
        }
        end += c.len_utf8();
    }

    start..end
}

/// Wrap every case-insensitive occurrence of `keyword` in `marker`,
/// keeping the original casing of the matched text.
pub fn highlight(context: &str, keyword: &str, marker: Marker) -> String {
    let mut out = String::with_capacity(context.len() + 16);
    let mut last = 0;
    for hit in find_occurrences(context, keyword) {
        out.push_str(&context[last..hit.start]);
        out.push_str(marker.open);
        out.push_str(&context[hit.clone()]);
        out.push_str(marker.close);
        last = hit.end;
    }
    out.push_str(&context[last..]);
    out
}

/// Trimmed, highlighted snippet around one occurrence.
pub fn snippet(
    text: &str,
    hit: Range<usize>,
    keyword: &str,
    radius: usize,
    marker: Marker,
) -> String {
    let window = context_window(text, hit, radius);
    highlight(text[window].trim(), keyword, marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(marked: &str) -> String {
        marked
            .replace(Marker::HTML.open, "")
            .replace(Marker::HTML.close, "")
    }

    #[test]
    fn fold_case_lowercases_everything() {
        assert_eq!(fold_case("Straße ÄÖÜ FOX"), "straße äöü fox");
    }

    #[test]
    fn finds_every_occurrence_in_order() {
        let text = "Fox, fox and FOX.";
        assert_eq!(find_occurrences(text, "fox"), vec![0..3, 5..8, 13..16]);
    }

    #[test]
    fn occurrences_do_not_overlap() {
        assert_eq!(find_occurrences("aaaa", "aa"), vec![0..2, 2..4]);
    }

    #[test]
    fn empty_keyword_finds_nothing() {
        assert!(find_occurrences("anything", "").is_empty());
    }

    #[test]
    fn offsets_map_back_through_multibyte_text() {
        let text = "Éclair CAFÉ crème";
        let hits = find_occurrences(text, "café");
        assert_eq!(hits.len(), 1);
        assert_eq!(&text[hits[0].clone()], "CAFÉ");
    }

    #[test]
    fn offsets_survive_length_changing_fold() {
        // 'İ' lowercases to two characters.
        let text = "İstanbul fox";
        let hits = find_occurrences(text, "FOX");
        assert_eq!(hits.len(), 1);
        assert_eq!(&text[hits[0].clone()], "fox");
    }

    #[test]
    fn window_covers_short_text_entirely() {
        let text = "the quick brown FOX jumps over";
        let hit = find_occurrences(text, "fox")[0].clone();
        assert_eq!(context_window(text, hit, 150), 0..text.len());
    }

    #[test]
    fn window_snaps_to_whitespace() {
        let text = "alpha bravo charlie delta echo";
        let hit = find_occurrences(text, "charlie")[0].clone();
        // Two characters each way lands inside "bravo" and "delta".
        let window = context_window(text, hit, 2);
        assert_eq!(text[window].trim(), "bravo charlie delta");
    }

    #[test]
    fn window_with_zero_radius_keeps_the_word() {
        let text = "say foxtrot now";
        let hit = find_occurrences(text, "fox")[0].clone();
        let window = context_window(text, hit, 0);
        assert_eq!(text[window].trim(), "foxtrot");
    }

    #[test]
    fn highlight_preserves_original_case() {
        assert_eq!(
            highlight("the quick brown FOX jumps", "fox", Marker::HTML),
            "the quick brown <mark>FOX</mark> jumps"
        );
        assert_eq!(
            highlight("Fox and fox", "FOX", Marker { open: "[", close: "]" }),
            "[Fox] and [fox]"
        );
        assert_eq!(highlight("nothing here", "fox", Marker::HTML), "nothing here");
    }

    #[test]
    fn snippet_never_cuts_words() {
        let words: Vec<String> = (0..200).map(|i| format!("word{i:03}")).collect();
        let mut text = words[..100].join(" ");
        text.push_str(" the quick brown FOX jumps over ");
        text.push_str(&words[100..].join(" "));

        let hit = find_occurrences(&text, "fox")[0].clone();
        let snip = snippet(&text, hit, "fox", 150, Marker::HTML);

        assert!(snip.contains("<mark>FOX</mark>"));
        let plain = strip(&snip);
        let original: Vec<&str> = text.split(' ').collect();
        for token in plain.split(' ') {
            assert!(original.contains(&token), "cut word {token:?}");
        }
        assert!(plain.chars().count() >= 300);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_whitespace("  the\tquick \n\n brown   fox "),
            "the quick brown fox"
        );
        assert_eq!(normalize_whitespace(" \n\t"), "");
    }
}
