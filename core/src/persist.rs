use crate::{DocId, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub const POSTINGS_TREE: &str = "postings";
pub const FORWARD_TREE: &str = "forward";
pub const URL_TREE: &str = "url_to_id";
const BLOCK_PREFIX: &str = "block-";

pub const FORMAT_VERSION: u32 = 2;

/// Attempts at acquiring the sled directory lock before giving up.
const OPEN_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u64,
    pub num_blocks: u32,
    pub created_at: String,
    pub version: u32,
}

/// Layout of an index directory.
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    /// Build-time key-value store. Readers never open it.
    pub fn db(&self) -> PathBuf { self.root.join("db") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn lexicon(&self) -> PathBuf { self.root.join("lexicon.bin") }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.dat") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn forward(&self) -> PathBuf { self.root.join("forward.dat") }
    pub fn url_ids(&self) -> PathBuf { self.root.join("url_ids.bin") }

    /// Everything a finished build exports, `meta.json` excluded.
    pub fn exported(&self) -> [PathBuf; 5] {
        [self.lexicon(), self.postings(), self.docs(), self.forward(), self.url_ids()]
    }
}

/// Location of one bincode record inside a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub offset: u64,
    pub len: u32,
}

/// Stem to postings record in `postings.dat`.
pub type Lexicon = BTreeMap<String, Span>;

/// Append-only writer for a segment file of concatenated bincode records.
pub struct SegmentWriter {
    out: BufWriter<File>,
    offset: u64,
}

impl SegmentWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self { out: BufWriter::new(File::create(path)?), offset: 0 })
    }

    /// Appends an already encoded record.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Span> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::IndexIo(format!("record of {} bytes is too large", bytes.len())))?;
        self.out.write_all(bytes)?;
        let span = Span { offset: self.offset, len };
        self.offset += u64::from(len);
        Ok(span)
    }

    pub fn finish(self) -> Result<()> {
        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

/// Reads one record from a segment. Every call opens its own handle, so
/// readers never contend with each other.
pub fn read_record<T: DeserializeOwned>(path: &Path, span: Span) -> Result<T> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(span.offset))?;
    let mut buf = vec![0u8; span.len as usize];
    f.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::IndexIo(format!("truncated segment {}", path.display())),
        _ => Error::from(e),
    })?;
    decode(&buf)
}

pub fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    Ok(())
}

pub fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    decode(&buf)
}

pub fn block_tree_name(block: u32) -> String { format!("{BLOCK_PREFIX}{block:06}") }

pub fn is_block_tree(name: &[u8]) -> bool { name.starts_with(BLOCK_PREFIX.as_bytes()) }

/// Doc ids are stored big-endian so tree order matches id order.
pub fn encode_doc_id(id: DocId) -> [u8; 4] { id.to_be_bytes() }

pub fn decode_doc_id(bytes: &[u8]) -> Result<DocId> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::IndexIo(format!("bad doc id key of {} bytes", bytes.len())))?;
    Ok(DocId::from_be_bytes(arr))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> { Ok(bincode::serialize(value)?) }

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> { Ok(bincode::deserialize(bytes)?) }

/// Opens the build-time store. A handle that was just dropped can keep the
/// directory lock until its background flusher exits, so a lock conflict is
/// retried with a growing backoff.
pub fn open_db(paths: &IndexPaths) -> Result<sled::Db> {
    create_dir_all(&paths.root)?;
    let mut attempt = 1;
    loop {
        match sled::open(paths.db()) {
            Ok(db) => return Ok(db),
            Err(sled::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock && attempt < OPEN_ATTEMPTS => {
                let wait = Duration::from_millis(10 << attempt);
                tracing::debug!(attempt, ?wait, "index store is locked, retrying");
                thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
