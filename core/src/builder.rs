use crate::persist::{
    block_tree_name, decode, decode_doc_id, encode, encode_doc_id, is_block_tree, now_rfc3339, open_db, save_bin,
    save_meta, IndexPaths, Lexicon, MetaFile, SegmentWriter, Span, FORMAT_VERSION, FORWARD_TREE, POSTINGS_TREE,
    URL_TREE,
};
use crate::store::IndexStore;
use crate::{DocId, Document, Error, ForwardEntry, IndexConfig, Posting, Result};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub num_docs: u32,
    pub num_terms: u64,
    pub num_blocks: u32,
}

/// Write side of an index. Postings are accumulated in a bounded in-memory
/// block that is flushed to its own tree every `block_size` documents; the
/// blocks are merged into the final postings tree by [`IndexBuilder::finish`].
pub struct IndexBuilder {
    paths: IndexPaths,
    db: sled::Db,
    forward: sled::Tree,
    url_to_id: sled::Tree,
    config: IndexConfig,
    block: BTreeMap<String, Vec<Posting>>,
    docs_in_block: usize,
    num_blocks: u32,
    num_docs: u32,
}

impl IndexBuilder {
    /// Opens a fresh index at `path`. Anything already stored there, including
    /// block segments left by an interrupted build, is discarded.
    pub fn create<P: AsRef<Path>>(path: P, config: IndexConfig) -> Result<Self> {
        let paths = IndexPaths::new(path);
        let meta = paths.meta();
        if meta.exists() {
            fs::remove_file(&meta)?;
        }
        for stale in paths.exported() {
            if stale.exists() {
                fs::remove_file(&stale)?;
            }
        }
        let db = open_db(&paths)?;
        for name in db.tree_names() {
            if &*name == b"__sled__default" {
                continue;
            }
            if is_block_tree(&name) {
                tracing::warn!(block = %String::from_utf8_lossy(&name), "purging stale block");
            }
            db.drop_tree(&name)?;
        }
        let forward = db.open_tree(FORWARD_TREE)?;
        let url_to_id = db.open_tree(URL_TREE)?;
        tracing::info!(root = %paths.root.display(), block_size = config.block_size, "started index build");
        Ok(Self {
            paths,
            db,
            forward,
            url_to_id,
            config,
            block: BTreeMap::new(),
            docs_in_block: 0,
            num_blocks: 0,
            num_docs: 0,
        })
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }

    /// Adds a document and returns its id. A url that was already added is
    /// rejected before anything is written.
    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        if self.url_to_id.contains_key(doc.url.as_bytes())? {
            return Err(Error::DuplicateDocument { url: doc.url });
        }
        let doc_id = self.num_docs + 1;
        let key = encode_doc_id(doc_id);

        let Document { title, terms, url, score } = doc;
        let entry = ForwardEntry { title, url, terms, score };
        self.forward.insert(key, encode(&entry)?)?;
        self.url_to_id.insert(entry.url.as_bytes(), &key[..])?;

        for (position, term) in entry.terms.iter().enumerate() {
            if term.is_stop_word() {
                continue;
            }
            self.block
                .entry(term.stem().to_string())
                .or_default()
                .push(Posting { position: position as u32, doc_id });
        }

        self.num_docs = doc_id;
        self.docs_in_block += 1;
        if self.docs_in_block >= self.config.block_size.max(1) {
            self.flush_block()?;
        }
        if self.config.sync_interval > 0 && self.num_docs as usize % self.config.sync_interval == 0 {
            self.sync()?;
        }
        Ok(doc_id)
    }

    /// Durability checkpoint for everything written so far.
    pub fn sync(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        tracing::debug!(num_docs = self.num_docs, bytes, "synced index");
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        let name = block_tree_name(self.num_blocks);
        let tree = self.db.open_tree(&name)?;
        let mut batch = sled::Batch::default();
        let num_terms = self.block.len();
        for (stem, postings) in std::mem::take(&mut self.block) {
            batch.insert(stem.as_bytes(), encode(&postings)?);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        tracing::info!(block = %name, docs = self.docs_in_block, terms = num_terms, "flushed block");
        self.num_blocks += 1;
        self.docs_in_block = 0;
        Ok(())
    }

    /// Flushes the last block, merges every block into the final postings
    /// tree, drops the blocks, exports the read-side segments and writes the
    /// meta file.
    pub fn finish(mut self) -> Result<BuildSummary> {
        if self.docs_in_block > 0 {
            self.flush_block()?;
        }
        let names: Vec<String> = (0..self.num_blocks).map(block_tree_name).collect();
        let postings = self.db.open_tree(POSTINGS_TREE)?;
        tracing::info!(blocks = names.len(), "merging blocks");
        let num_terms = merge_blocks(&self.db, &names, &postings)?;
        for name in &names {
            self.db.drop_tree(name.as_bytes())?;
        }
        self.db.flush()?;
        export(&self.paths, &postings, &self.forward, &self.url_to_id)?;

        let meta = MetaFile {
            num_docs: self.num_docs,
            num_terms,
            num_blocks: self.num_blocks,
            created_at: now_rfc3339(),
            version: FORMAT_VERSION,
        };
        save_meta(&self.paths, &meta)?;
        tracing::info!(num_docs = self.num_docs, num_terms, "index build complete");
        Ok(BuildSummary { num_docs: self.num_docs, num_terms, num_blocks: self.num_blocks })
    }
}

/// Merges block trees into `target`. Stems are visited in sorted order and
/// each stem's postings are the concatenation of its block lists in the order
/// the blocks are given. Returns the number of distinct stems written.
pub fn merge_blocks(db: &sled::Db, block_names: &[String], target: &sled::Tree) -> Result<u64> {
    target.clear()?;
    let blocks = block_names.iter().map(|n| db.open_tree(n)).collect::<std::result::Result<Vec<_>, _>>()?;
    let mut iters: Vec<sled::Iter> = blocks.iter().map(|t| t.iter()).collect();

    // Min-heap on (stem, block index): equal stems pop in block order.
    let mut heap: BinaryHeap<Reverse<(Vec<u8>, usize, Vec<u8>)>> = BinaryHeap::new();
    for i in 0..iters.len() {
        advance(&mut iters, i, &mut heap)?;
    }

    let mut num_terms = 0u64;
    while let Some(Reverse((stem, block, value))) = heap.pop() {
        let mut merged: Vec<Posting> = decode(&value)?;
        advance(&mut iters, block, &mut heap)?;
        while let Some(Reverse((next, _, _))) = heap.peek() {
            if *next != stem {
                break;
            }
            if let Some(Reverse((_, block, value))) = heap.pop() {
                merged.extend(decode::<Vec<Posting>>(&value)?);
                advance(&mut iters, block, &mut heap)?;
            }
        }
        target.insert(stem, encode(&merged)?)?;
        num_terms += 1;
    }
    target.flush()?;
    Ok(num_terms)
}

/// Writes the final trees out as immutable files: a stem lexicon over
/// `postings.dat`, a per-document span table over `forward.dat` and the url
/// map. Readers open these without touching the build store.
fn export(paths: &IndexPaths, postings: &sled::Tree, forward: &sled::Tree, url_to_id: &sled::Tree) -> Result<()> {
    let mut lexicon = Lexicon::new();
    let mut data = SegmentWriter::create(&paths.postings())?;
    for kv in postings.iter() {
        let (k, v) = kv?;
        let stem = String::from_utf8(k.to_vec()).map_err(|e| Error::IndexIo(format!("bad stem key: {e}")))?;
        lexicon.insert(stem, data.append(&v)?);
    }
    data.finish()?;
    save_bin(&paths.lexicon(), &lexicon)?;

    // Forward keys are big-endian ids, so tree order is id order.
    let mut docs: Vec<Span> = Vec::with_capacity(forward.len());
    let mut data = SegmentWriter::create(&paths.forward())?;
    for kv in forward.iter() {
        let (k, v) = kv?;
        let id = decode_doc_id(&k)?;
        if id as usize != docs.len() + 1 {
            return Err(Error::IndexIo(format!("forward index skips to doc {id}")));
        }
        docs.push(data.append(&v)?);
    }
    data.finish()?;
    save_bin(&paths.docs(), &docs)?;

    let mut urls: HashMap<String, DocId> = HashMap::with_capacity(url_to_id.len());
    for kv in url_to_id.iter() {
        let (k, v) = kv?;
        urls.insert(String::from_utf8_lossy(&k).into_owned(), decode_doc_id(&v)?);
    }
    save_bin(&paths.url_ids(), &urls)?;
    tracing::debug!(terms = lexicon.len(), docs = docs.len(), "exported index segments");
    Ok(())
}

fn advance(
    iters: &mut [sled::Iter],
    block: usize,
    heap: &mut BinaryHeap<Reverse<(Vec<u8>, usize, Vec<u8>)>>,
) -> Result<()> {
    if let Some(kv) = iters[block].next() {
        let (k, v) = kv?;
        heap.push(Reverse((k.to_vec(), block, v.to_vec())));
    }
    Ok(())
}

/// Builds an index at `path` from `docs` and opens it for querying. The
/// returned store reads the exported segments, not the build store.
pub fn build_from_corpus<P, I>(path: P, docs: I, config: IndexConfig) -> Result<IndexStore>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Document>,
{
    let mut builder = IndexBuilder::create(path.as_ref(), config)?;
    for doc in docs {
        builder.add_document(doc)?;
    }
    builder.finish()?;
    IndexStore::open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::normalize;
    use crate::Term;
    use tempfile::tempdir;

    fn doc(url: &str, text: &str) -> Document {
        Document::new(url, normalize(text), url, None)
    }

    fn ids(postings: &[Posting]) -> Vec<DocId> { postings.iter().map(|p| p.doc_id).collect() }

    #[test]
    fn assigns_sequential_ids_from_one() {
        let dir = tempdir().unwrap();
        let mut b = IndexBuilder::create(dir.path(), IndexConfig::default()).unwrap();
        assert_eq!(b.add_document(doc("a", "one")).unwrap(), 1);
        assert_eq!(b.add_document(doc("b", "two")).unwrap(), 2);
        assert_eq!(b.add_document(doc("c", "three")).unwrap(), 3);
        let summary = b.finish().unwrap();
        assert_eq!(summary.num_docs, 3);
        assert_eq!(summary.num_blocks, 1);
    }

    #[test]
    fn duplicate_url_is_rejected_without_side_effects() {
        let dir = tempdir().unwrap();
        let mut b = IndexBuilder::create(dir.path(), IndexConfig::default()).unwrap();
        b.add_document(doc("same", "cats purr")).unwrap();
        let before = b.block.clone();

        let err = b.add_document(doc("same", "zebras gallop")).unwrap_err();
        assert!(matches!(err, Error::DuplicateDocument { ref url } if url == "same"));
        assert_eq!(b.num_docs(), 1);
        assert_eq!(b.block, before);

        b.finish().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        assert_eq!(store.total_doc_count(), 1);
        assert!(store.postings(&Term::new("zebras")).unwrap().is_empty());
        assert_eq!(store.title(1).unwrap(), "same");
    }

    #[test]
    fn blocks_merge_in_flush_order() {
        let dir = tempdir().unwrap();
        let config = IndexConfig { block_size: 2, sync_interval: 3 };
        let mut b = IndexBuilder::create(dir.path(), config).unwrap();
        for i in 0..5 {
            b.add_document(doc(&format!("u{i}"), &format!("cat number{i} cat"))).unwrap();
        }
        let summary = b.finish().unwrap();
        assert_eq!(summary.num_blocks, 3);

        let store = IndexStore::open(dir.path()).unwrap();
        let cat = store.postings(&Term::new("cat")).unwrap();
        assert_eq!(ids(&cat), vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
        let positions: Vec<u32> = cat.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 2, 0, 2, 0, 2, 0, 2, 0, 2]);
        assert_eq!(ids(&store.postings(&Term::new("number3")).unwrap()), vec![4]);
    }

    #[test]
    fn blocks_are_dropped_after_merge() {
        let dir = tempdir().unwrap();
        let config = IndexConfig { block_size: 1, sync_interval: 100 };
        let mut b = IndexBuilder::create(dir.path(), config).unwrap();
        b.add_document(doc("a", "alpha")).unwrap();
        b.add_document(doc("b", "beta")).unwrap();
        b.finish().unwrap();

        let db = open_db(&IndexPaths::new(dir.path())).unwrap();
        assert!(db.tree_names().iter().all(|n| !is_block_tree(n)));
    }

    #[test]
    fn rebuilding_in_place_replaces_the_previous_index() {
        let dir = tempdir().unwrap();
        for round in 0..10 {
            let docs = vec![doc("a", &format!("round{round} shared")), doc("b", "shared")];
            let store = build_from_corpus(dir.path(), docs, IndexConfig::default()).unwrap();
            assert_eq!(store.total_doc_count(), 2);
            assert_eq!(ids(&store.postings(&Term::new(&format!("round{round}"))).unwrap()), vec![1]);
            if round > 0 {
                let previous = format!("round{}", round - 1);
                assert!(store.postings(&Term::new(previous)).unwrap().is_empty());
            }
        }
    }

    #[test]
    fn build_then_open_never_races_the_build_store() {
        for i in 0..25 {
            let dir = tempdir().unwrap();
            let docs = vec![doc("a", "cats purr"), doc("b", &format!("dogs bark {i}"))];
            let built = build_from_corpus(dir.path(), docs, IndexConfig::default()).unwrap();
            let reopened = IndexStore::open(dir.path()).unwrap();
            assert_eq!(built.total_doc_count(), reopened.total_doc_count());
            assert_eq!(ids(&reopened.postings(&Term::new("dogs")).unwrap()), vec![2]);
        }
    }

    #[test]
    fn stale_blocks_are_purged_on_create() {
        let dir = tempdir().unwrap();
        {
            let db = open_db(&IndexPaths::new(dir.path())).unwrap();
            let stale = db.open_tree(block_tree_name(9)).unwrap();
            stale.insert(b"ghost", encode(&vec![Posting { position: 0, doc_id: 42 }]).unwrap()).unwrap();
            db.flush().unwrap();
        }
        let mut b = IndexBuilder::create(dir.path(), IndexConfig::default()).unwrap();
        b.add_document(doc("a", "real words")).unwrap();
        b.finish().unwrap();

        let store = IndexStore::open(dir.path()).unwrap();
        assert!(store.postings(&Term::new("ghost")).unwrap().is_empty());
        assert_eq!(ids(&store.postings(&Term::new("words")).unwrap()), vec![1]);
    }

    #[test]
    fn stop_words_stay_in_forward_text_only() {
        let dir = tempdir().unwrap();
        let store = build_from_corpus(dir.path(), vec![doc("a", "the cats are here")], IndexConfig::default()).unwrap();
        assert!(store.postings(&Term::new("the")).unwrap().is_empty());
        let cat = store.postings(&Term::new("cats")).unwrap();
        assert_eq!(cat, vec![Posting { position: 1, doc_id: 1 }]);
        assert_eq!(store.forward_text(1).unwrap().len(), 4);
    }

    #[test]
    fn merge_visits_stems_in_sorted_order() {
        let dir = tempdir().unwrap();
        let db = open_db(&IndexPaths::new(dir.path())).unwrap();
        let names = vec![block_tree_name(0), block_tree_name(1)];
        let b0 = db.open_tree(&names[0]).unwrap();
        let b1 = db.open_tree(&names[1]).unwrap();
        b0.insert("pear", encode(&vec![Posting { position: 0, doc_id: 1 }]).unwrap()).unwrap();
        b0.insert("apple", encode(&vec![Posting { position: 1, doc_id: 1 }]).unwrap()).unwrap();
        b1.insert("pear", encode(&vec![Posting { position: 5, doc_id: 2 }]).unwrap()).unwrap();
        b1.insert("fig", encode(&vec![Posting { position: 2, doc_id: 2 }]).unwrap()).unwrap();

        let target = db.open_tree(POSTINGS_TREE).unwrap();
        assert_eq!(merge_blocks(&db, &names, &target).unwrap(), 3);

        let keys: Vec<Vec<u8>> = target.iter().keys().map(|k| k.unwrap().to_vec()).collect();
        assert_eq!(keys, vec![b"apple".to_vec(), b"fig".to_vec(), b"pear".to_vec()]);
        let pear: Vec<Posting> = decode(&target.get("pear").unwrap().unwrap()).unwrap();
        assert_eq!(ids(&pear), vec![1, 2]);
    }
}
