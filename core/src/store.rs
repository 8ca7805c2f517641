use crate::persist::{load_bin, load_meta, read_record, IndexPaths, Lexicon, MetaFile, Span, FORMAT_VERSION};
use crate::{DocId, Error, ForwardEntry, Posting, Result, Term};
use std::collections::HashMap;
use std::path::Path;

/// Corpus statistics used by the ranker, computed once when a store is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStats {
    pub total_doc_count: u32,
    pub average_doc_length: f64,
}

impl CorpusStats {
    /// Statistics over a sequence of document lengths. Undefined for an empty
    /// corpus.
    pub fn from_lengths<I: IntoIterator<Item = usize>>(lengths: I) -> Result<Self> {
        let (count, total) = lengths.into_iter().fold((0u64, 0u64), |(c, t), len| (c + 1, t + len as u64));
        if count == 0 {
            return Err(Error::EmptyIndex);
        }
        Ok(Self { total_doc_count: count as u32, average_doc_length: total as f64 / count as f64 })
    }
}

/// Read side of a built index. Holds no mutating operations and no lock on
/// the index directory: any number of stores, in one process or many, can be
/// open on the same index. Share one behind an `Arc` across query threads.
pub struct IndexStore {
    paths: IndexPaths,
    lexicon: Lexicon,
    docs: Vec<Span>,
    url_to_id: HashMap<String, DocId>,
    stats: CorpusStats,
    meta: MetaFile,
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let paths = IndexPaths::new(path);
        if !paths.root.is_dir() {
            return Err(Error::IndexIo(format!("no index at {}", paths.root.display())));
        }
        // meta.json is written last, a build without it never completed.
        let meta = load_meta(&paths)
            .map_err(|e| Error::IndexIo(format!("incomplete index at {}: {e}", paths.root.display())))?;
        if meta.version != FORMAT_VERSION {
            return Err(Error::IndexIo(format!(
                "index at {} has format {}, expected {}",
                paths.root.display(),
                meta.version,
                FORMAT_VERSION
            )));
        }
        let lexicon: Lexicon = load_bin(&paths.lexicon())?;
        let docs: Vec<Span> = load_bin(&paths.docs())?;
        let url_to_id: HashMap<String, DocId> = load_bin(&paths.url_ids())?;

        let mut lengths = Vec::with_capacity(docs.len());
        for span in &docs {
            let entry: ForwardEntry = read_record(&paths.forward(), *span)?;
            lengths.push(entry.terms.len());
        }
        let stats = CorpusStats::from_lengths(lengths)?;
        tracing::info!(
            root = %paths.root.display(),
            num_docs = stats.total_doc_count,
            num_terms = lexicon.len(),
            avgdl = stats.average_doc_length,
            "opened index"
        );
        Ok(Self { paths, lexicon, docs, url_to_id, stats, meta })
    }

    /// Postings for the term's stem; empty when the stem was never indexed.
    pub fn postings(&self, term: &Term) -> Result<Vec<Posting>> {
        match self.lexicon.get(term.stem()) {
            Some(span) => read_record(&self.paths.postings(), *span),
            None => Ok(Vec::new()),
        }
    }

    pub fn entry(&self, id: DocId) -> Result<ForwardEntry> {
        let span = id
            .checked_sub(1)
            .and_then(|i| self.docs.get(i as usize))
            .ok_or(Error::UnknownDocument(id))?;
        read_record(&self.paths.forward(), *span)
    }

    pub fn forward_text(&self, id: DocId) -> Result<Vec<Term>> { Ok(self.entry(id)?.terms) }

    pub fn url(&self, id: DocId) -> Result<String> { Ok(self.entry(id)?.url) }

    pub fn title(&self, id: DocId) -> Result<String> { Ok(self.entry(id)?.title) }

    /// Legacy popularity score carried over from the crawl, if any.
    pub fn score(&self, id: DocId) -> Result<Option<i64>> { Ok(self.entry(id)?.score) }

    pub fn doc_id(&self, url: &str) -> Result<Option<DocId>> { Ok(self.url_to_id.get(url).copied()) }

    pub fn total_doc_count(&self) -> u32 { self.stats.total_doc_count }

    pub fn average_doc_length(&self) -> f64 { self.stats.average_doc_length }

    /// Snapshot of the ranking statistics, as reported by `/stats` and `inspect`.
    pub fn stats(&self) -> CorpusStats { self.stats }

    pub fn meta(&self) -> &MetaFile { &self.meta }
}
