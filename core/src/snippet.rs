use crate::{Error, Result, SnippetConfig, Term};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetToken {
    pub text: String,
    pub is_match: bool,
}

impl SnippetToken {
    fn ellipsis() -> Self { Self { text: "...".to_string(), is_match: false } }
}

pub fn snippet(query_terms: &[Term], text: &[Term]) -> Result<Vec<SnippetToken>> {
    snippet_with(query_terms, text, SnippetConfig::default())
}

/// Excerpt around the window that covers the most distinct query terms,
/// preferring the shortest such window. Fails with [`Error::NoMatch`] when no
/// query term occurs in `text`.
pub fn snippet_with(query_terms: &[Term], text: &[Term], config: SnippetConfig) -> Result<Vec<SnippetToken>> {
    let query: HashSet<&str> = query_terms.iter().map(Term::stem).collect();

    // Latest occurrence of each query term seen so far, oldest first.
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut best: Option<(usize, usize, usize)> = None; // (distinct, start, end)
    for (pos, term) in text.iter().enumerate() {
        let stem = term.stem();
        if !query.contains(stem) {
            continue;
        }
        if let Some(i) = window.iter().position(|(s, _)| *s == stem) {
            window.remove(i);
        }
        window.push_back((stem, pos));

        let start = window.front().map_or(pos, |(_, p)| *p);
        let distinct = window.len();
        let better = match best {
            None => true,
            Some((d, s, e)) => distinct > d || (distinct == d && pos - start < e - s),
        };
        if better {
            best = Some((distinct, start, pos));
        }
    }
    let (_, start, end) = best.ok_or(Error::NoMatch)?;

    let from = start.saturating_sub(config.margin);
    let to = (end + 1 + config.margin).min(text.len());
    let mut tokens: Vec<SnippetToken> = text[from..to]
        .iter()
        .map(|t| SnippetToken { text: t.surface().to_string(), is_match: query.contains(t.stem()) })
        .collect();

    // Drop the excess around the middle; an odd length keeps one more token
    // in the tail than in the head.
    if tokens.len() > config.max_len {
        let half = tokens.len() / 2;
        let excess = (tokens.len() - config.max_len) / 2;
        let rest = tokens.split_off(half + excess);
        tokens.truncate(half - excess);
        tokens.push(SnippetToken::ellipsis());
        tokens.extend(rest);
    }
    Ok(tokens)
}

/// Joins snippet tokens for display, reattaching split clitics.
pub fn render_plain(tokens: &[SnippetToken]) -> String {
    let mut out = String::new();
    for t in tokens {
        let attach = t.text.starts_with('\'') || t.text.eq_ignore_ascii_case("n't");
        if !out.is_empty() && !attach {
            out.push(' ');
        }
        out.push_str(&t.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &str) -> Vec<Term> { words.split_whitespace().map(Term::new).collect() }

    /// `w0 w1 ...` with "apple" and "banana" at the given positions.
    fn numbered(n: usize, apple: usize, banana: usize) -> String {
        let words: Vec<String> = (0..n)
            .map(|i| match i {
                i if i == apple => "apple".to_string(),
                i if i == banana => "banana".to_string(),
                _ => format!("w{i}"),
            })
            .collect();
        words.join(" ")
    }

    fn texts(tokens: &[SnippetToken]) -> Vec<&str> { tokens.iter().map(|t| t.text.as_str()).collect() }

    const TIGHT: SnippetConfig = SnippetConfig { margin: 0, max_len: 50 };

    #[test]
    fn picks_shortest_full_cover() {
        let text = terms("apple pear pear banana pear apple banana");
        let s = snippet_with(&terms("apple banana"), &text, TIGHT).unwrap();
        assert_eq!(texts(&s), vec!["apple", "banana"]);
        assert!(s.iter().all(|t| t.is_match));
    }

    #[test]
    fn more_terms_beat_shorter_window() {
        let text = terms("apple banana pear pear cherry");
        let s = snippet_with(&terms("apple banana cherry"), &text, TIGHT).unwrap();
        assert_eq!(texts(&s), vec!["apple", "banana", "pear", "pear", "cherry"]);
        assert_eq!(s.iter().filter(|t| t.is_match).count(), 3);
    }

    #[test]
    fn matches_by_stem_and_keeps_surface() {
        let text = terms("The Cats slept");
        let s = snippet_with(&terms("cat"), &text, SnippetConfig { margin: 1, max_len: 50 }).unwrap();
        assert_eq!(texts(&s), vec!["The", "Cats", "slept"]);
        assert_eq!(s.iter().map(|t| t.is_match).collect::<Vec<_>>(), vec![false, true, false]);
    }

    #[test]
    fn margin_is_clamped_to_document() {
        let words: Vec<String> = (0..100).map(|i| if i == 50 { "apple".to_string() } else { format!("w{i}") }).collect();
        let text = terms(&words.join(" "));
        let s = snippet(&terms("apple"), &text).unwrap();
        assert_eq!(s.len(), 21);
        assert_eq!(s[0].text, "w40");
        assert_eq!(s[10].text, "apple");

        let s = snippet(&terms("w1"), &text).unwrap();
        assert_eq!(s[0].text, "w0");
        assert_eq!(s.len(), 12);
    }

    #[test]
    fn long_snippets_collapse_in_the_middle() {
        let text = terms(&numbered(100, 10, 80));
        let s = snippet(&terms("apple banana"), &text).unwrap();
        // 91 tokens: keep [0, 25) and [65, 91)
        assert_eq!(s.len(), 52);
        assert_eq!(s[0].text, "w0");
        assert_eq!(s[24].text, "w24");
        assert_eq!(s[25], SnippetToken::ellipsis());
        assert_eq!(s[26].text, "w65");
        assert_eq!(s[51].text, "w90");
    }

    #[test]
    fn one_token_over_the_limit_only_gains_an_ellipsis() {
        let text = terms(&numbered(100, 10, 40));
        let s = snippet(&terms("apple banana"), &text).unwrap();
        assert_eq!(s.len(), 52);
        assert_eq!(s[24].text, "w24");
        assert_eq!(s[25], SnippetToken::ellipsis());
        assert_eq!(s[26].text, "w25");
        assert_eq!(s[51].text, "w50");
        assert_eq!(s.iter().filter(|t| t.is_match).count(), 2);
    }

    #[test]
    fn windows_at_the_limit_are_not_collapsed() {
        let text = terms(&numbered(100, 10, 39));
        let s = snippet(&terms("apple banana"), &text).unwrap();
        assert_eq!(s.len(), 50);
        assert!(!s.contains(&SnippetToken::ellipsis()));
    }

    #[test]
    fn no_match_is_an_error() {
        let err = snippet(&terms("zebra"), &terms("no stripes here")).unwrap_err();
        assert!(matches!(err, Error::NoMatch));
    }

    #[test]
    fn render_reattaches_clitics() {
        let tokens = vec![
            SnippetToken { text: "I".into(), is_match: false },
            SnippetToken { text: "do".into(), is_match: false },
            SnippetToken { text: "n't".into(), is_match: false },
            SnippetToken { text: "cat".into(), is_match: true },
            SnippetToken { text: "'s".into(), is_match: false },
        ];
        assert_eq!(render_plain(&tokens), "I don't cat's");
    }
}
