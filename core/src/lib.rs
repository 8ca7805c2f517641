use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

pub mod builder;
pub mod config;
pub mod error;
pub mod paginate;
pub mod persist;
pub mod ranker;
pub mod snippet;
pub mod store;
pub mod tokenizer;

pub use builder::{build_from_corpus, BuildSummary, IndexBuilder};
pub use config::{Bm25Params, IndexConfig, SnippetConfig};
pub use error::{Error, Result};
pub use store::{CorpusStats, IndexStore};

pub type DocId = u32;

/// A normalized token. Two terms are equal when their stems are equal; the
/// surface form is only kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    surface: String,
    stem: String,
}

impl Term {
    pub fn new(surface: impl Into<String>) -> Self {
        let surface = surface.into();
        let stem = tokenizer::stem(&surface);
        Self { surface, stem }
    }

    pub fn surface(&self) -> &str { &self.surface }
    pub fn stem(&self) -> &str { &self.stem }

    pub fn is_stop_word(&self) -> bool { tokenizer::is_stopword(&self.surface.to_lowercase()) }

    pub fn is_punctuation(&self) -> bool { tokenizer::is_punctuation(&self.stem) }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool { self.stem == other.stem }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) { self.stem.hash(state) }
}

/// One occurrence of a stem: 0-based position in the document's term sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub position: u32,
    pub doc_id: DocId,
}

/// A document as handed to the builder. The id is assigned on insertion.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    pub terms: Vec<Term>,
    pub url: String,
    pub score: Option<i64>,
}

impl Document {
    pub fn new(title: impl Into<String>, terms: Vec<Term>, url: impl Into<String>, score: Option<i64>) -> Self {
        Self { title: title.into(), terms, url: url.into(), score }
    }
}

/// A crawled post before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub title: String,
    #[serde(alias = "text")]
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub score: Option<i64>,
}

impl RawDocument {
    /// Normalizes title then body into a single term sequence.
    pub fn into_document(self) -> Document {
        let mut terms = tokenizer::normalize(&self.title);
        terms.extend(tokenizer::normalize(&self.body));
        Document { title: self.title, terms, url: self.url, score: self.score }
    }
}

/// Per-document record stored in the forward index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub title: String,
    pub url: String,
    pub terms: Vec<Term>,
    pub score: Option<i64>,
}
