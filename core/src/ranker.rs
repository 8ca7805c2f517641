//! BM25 ranking over the persisted index.
//!
//! Term frequency is the fraction of the document's terms that match the query
//! term, not the raw occurrence count. Scores therefore differ from textbook
//! BM25 while keeping the same saturation and length-normalization shape.

use crate::{Bm25Params, DocId, IndexStore, Result, Term};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Rank every document containing at least one query term, best first.
pub fn rank(query_terms: &[Term], store: &IndexStore) -> Result<Vec<ScoredDoc>> {
    rank_with(query_terms, store, Bm25Params::default())
}

pub fn rank_with(query_terms: &[Term], store: &IndexStore, params: Bm25Params) -> Result<Vec<ScoredDoc>> {
    let terms = distinct(query_terms);
    let mut doc_freqs = Vec::with_capacity(terms.len());
    let mut candidates = BTreeSet::new();
    for term in &terms {
        let docs: BTreeSet<DocId> = store.postings(term)?.iter().map(|p| p.doc_id).collect();
        doc_freqs.push(docs.len());
        candidates.extend(docs);
    }

    let n = store.total_doc_count() as f64;
    let avgdl = store.average_doc_length();
    let mut scored = Vec::with_capacity(candidates.len());
    for doc_id in candidates {
        let text = store.forward_text(doc_id)?;
        let doc_len = text.len() as f64;
        let mut score = 0.0;
        for (term, &df) in terms.iter().zip(&doc_freqs) {
            let count = text.iter().filter(|t| *t == term).count();
            let tf = count as f64 / doc_len;
            score += idf(n, df as f64) * saturate(tf, doc_len, avgdl, params);
        }
        scored.push(ScoredDoc { doc_id, score });
    }
    sort_ranked(&mut scored);
    tracing::debug!(terms = terms.len(), hits = scored.len(), "ranked query");
    Ok(scored)
}

/// `ln((N - df + 0.5) / (df + 0.5))`. Negative for terms in more than half the
/// corpus.
pub fn idf(n: f64, df: f64) -> f64 { ((n - df + 0.5) / (df + 0.5)).ln() }

fn saturate(tf: f64, doc_len: f64, avgdl: f64, p: Bm25Params) -> f64 {
    tf * (p.k1 + 1.0) / (tf + p.k1 * (1.0 - p.b + p.b * doc_len / avgdl))
}

/// Score descending, then doc id ascending.
pub fn sort_ranked(scored: &mut [ScoredDoc]) {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
}

/// Documents containing any of the query terms.
pub fn candidates(query_terms: &[Term], store: &IndexStore) -> Result<BTreeSet<DocId>> {
    let mut out = BTreeSet::new();
    for term in distinct(query_terms) {
        out.extend(store.postings(&term)?.iter().map(|p| p.doc_id));
    }
    Ok(out)
}

/// Documents containing every query term.
pub fn matching_all(query_terms: &[Term], store: &IndexStore) -> Result<BTreeSet<DocId>> {
    let mut out: Option<BTreeSet<DocId>> = None;
    for term in distinct(query_terms) {
        let docs: BTreeSet<DocId> = store.postings(&term)?.iter().map(|p| p.doc_id).collect();
        out = Some(match out {
            Some(acc) => acc.intersection(&docs).copied().collect(),
            None => docs,
        });
    }
    Ok(out.unwrap_or_default())
}

fn distinct(terms: &[Term]) -> Vec<Term> {
    let mut seen = HashSet::new();
    terms.iter().filter(|t| seen.insert(*t)).cloned().collect()
}
