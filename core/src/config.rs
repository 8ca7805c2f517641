/// Build-time parameters.
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    /// Documents per in-memory postings block before it is flushed to disk.
    pub block_size: usize,
    /// Documents between durability checkpoints.
    pub sync_interval: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { block_size: 200, sync_interval: 100 }
    }
}

/// BM25 saturation and length-normalization parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SnippetConfig {
    /// Extra terms shown on each side of the best window.
    pub margin: usize,
    /// Longer snippets get their middle collapsed.
    pub max_len: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self { margin: 10, max_len: 50 }
    }
}
