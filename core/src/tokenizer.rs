use crate::Term;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r#"[.!?]+["')\]]*\s+|\n\s*"#).expect("valid regex");
    static ref ELLIPSIS: Regex = Regex::new(r"\.\.\.").expect("valid regex");
    static ref PUNCT: Regex = Regex::new(r#"([,;:@#$%&?!\[\](){}<>"`*/\\|=+~^])"#).expect("valid regex");
    static ref DASHES: Regex = Regex::new(r"--+").expect("valid regex");
    static ref FINAL_PERIOD: Regex = Regex::new(r#"([^.])(\.)([\])}>"']*)\s*$"#).expect("valid regex");
    static ref CLITIC_SHORT: Regex = Regex::new(r"(?i)([^' ])('s|'m|'d|')\s").expect("valid regex");
    static ref CLITIC_LONG: Regex = Regex::new(r"(?i)([^' ])('ll|'re|'ve|n't)\s").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "i","me","my","myself","we","our","ours","ourselves","you","you're","you've","you'll","you'd",
            "your","yours","yourself","yourselves","he","him","his","himself","she","she's","her","hers",
            "herself","it","it's","its","itself","they","them","their","theirs","themselves","what","which",
            "who","whom","this","that","that'll","these","those","am","is","are","was","were","be","been",
            "being","have","has","had","having","do","does","did","doing","a","an","the","and","but","if",
            "or","because","as","until","while","of","at","by","for","with","about","against","between",
            "into","through","during","before","after","above","below","to","from","up","down","in","out",
            "on","off","over","under","again","further","then","once","here","there","when","where","why",
            "how","all","any","both","each","few","more","most","other","some","such","no","nor","not",
            "only","own","same","so","than","too","very","s","t","can","will","just","don","don't","should",
            "should've","now","d","ll","m","o","re","ve","y","ain","aren","aren't","couldn","couldn't",
            "didn","didn't","doesn","doesn't","hadn","hadn't","hasn","hasn't","haven","haven't","isn",
            "isn't","ma","mightn","mightn't","mustn","mustn't","needn","needn't","shan","shan't",
            "shouldn","shouldn't","wasn","wasn't","weren","weren't","won","won't","wouldn","wouldn't",
            // clitics produced by contraction splitting
            "n't","'s","'m","'d","'ll","'re","'ve",
        ];
        words.iter().copied().collect()
    };
}

pub(crate) fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

pub(crate) fn is_punctuation(s: &str) -> bool { s.chars().all(|c| !c.is_alphanumeric()) }

/// Lowercased English stem of a single token.
pub fn stem(token: &str) -> String {
    STEMMER.stem(&token.to_lowercase()).to_lowercase()
}

/// Normalize raw text into terms, in input order. Punctuation-only tokens are
/// dropped; stop words are kept and only flagged on the term.
pub fn normalize(text: &str) -> Vec<Term> {
    let text = text.nfkc().collect::<String>();
    sentences(&text)
        .flat_map(word_tokenize)
        .map(Term::new)
        .filter(|t| !t.is_punctuation())
        .collect()
}

/// Terms used to query the index: stop words are dropped unless nothing else
/// is left, and repeated stems are collapsed to their first occurrence.
pub fn query_terms(text: &str) -> Vec<Term> {
    let all = normalize(text);
    let content: Vec<Term> = all.iter().filter(|t| !t.is_stop_word()).cloned().collect();
    let terms = if content.is_empty() { all } else { content };
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.stem().to_string())).collect()
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        out.push(&text[start..m.end()]);
        start = m.end();
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out.into_iter().filter(|s| !s.trim().is_empty())
}

/// Treebank-style tokenization of one sentence: punctuation is split off,
/// contractions are split into stem and clitic.
fn word_tokenize(sentence: &str) -> Vec<String> {
    let s = ELLIPSIS.replace_all(sentence, " ... ");
    let s = PUNCT.replace_all(&s, " $1 ");
    let s = DASHES.replace_all(&s, " -- ");
    let s = FINAL_PERIOD.replace(s.trim_end(), "$1 $2$3");
    let padded = format!(" {s} ");
    let s = CLITIC_SHORT.replace_all(&padded, "$1 $2 ");
    let s = CLITIC_LONG.replace_all(&s, "$1 $2 ");
    s.split_whitespace().map(str::to_string).collect()
}
