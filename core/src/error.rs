use crate::DocId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A document with this url was already added to the build.
    #[error("duplicate document: {url}")]
    DuplicateDocument { url: String },
    /// Corpus statistics are undefined for a store with no documents.
    #[error("index contains no documents")]
    EmptyIndex,
    #[error("page {page} out of range ({total_pages} pages)")]
    PageOutOfRange { page: usize, total_pages: usize },
    #[error("page size must be positive")]
    InvalidPageSize,
    /// Snippet requested for a text that contains none of the query terms.
    #[error("no query term occurs in the document")]
    NoMatch,
    #[error("unknown document id {0}")]
    UnknownDocument(DocId),
    #[error("index i/o: {0}")]
    IndexIo(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::IndexIo(e.to_string()) }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self { Error::IndexIo(e.to_string()) }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self { Error::IndexIo(format!("decode: {e}")) }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::IndexIo(format!("meta: {e}")) }
}
