use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use redsift_core::{BuildSummary, IndexBuilder, IndexConfig, IndexStore, RawDocument};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "redsift-indexer")]
#[command(about = "Build and inspect a BM25 search index over crawled posts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a JSON/JSONL file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Documents per postings block
        #[arg(long, default_value_t = 200)]
        block_size: usize,
        /// Documents between durability checkpoints
        #[arg(long, default_value_t = 100)]
        sync_interval: usize,
        /// Overwrite an existing index directory
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print corpus statistics of a built index
    Inspect {
        #[arg(long, default_value = "./index")]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, block_size, sync_interval, force } => {
            let config = IndexConfig { block_size, sync_interval };
            let summary = build_index(Path::new(&input), Path::new(&output), config, force)?;
            println!("{}", serde_json::json!({
                "num_docs": summary.num_docs,
                "num_terms": summary.num_terms,
                "num_blocks": summary.num_blocks,
            }));
            Ok(())
        }
        Commands::Inspect { index } => {
            let store = IndexStore::open(&index)?;
            let stats = store.stats();
            let meta = store.meta();
            println!("{}", serde_json::json!({
                "num_docs": stats.total_doc_count,
                "average_doc_length": stats.average_doc_length,
                "num_terms": meta.num_terms,
                "created_at": meta.created_at,
                "version": meta.version,
            }));
            Ok(())
        }
    }
}

fn build_index(input: &Path, output: &Path, config: IndexConfig, force: bool) -> Result<BuildSummary> {
    if output.exists() && fs::read_dir(output)?.next().is_some() && !force {
        bail!("index directory {} already exists (use --force to rebuild)", output.display());
    }
    let files = collect_inputs(input)?;
    if files.is_empty() {
        bail!("no .json or .jsonl files under {}", input.display());
    }

    let mut builder = IndexBuilder::create(output, config)?;
    for file in files {
        let added = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            index_jsonl(&file, &mut builder)?
        } else {
            index_json(&file, &mut builder)?
        };
        tracing::debug!(file = %file.display(), added, "indexed file");
    }
    tracing::info!(num_docs = builder.num_docs(), "ingested documents");
    let summary = builder.finish()?;
    tracing::info!(output = %output.display(), "index build complete");
    Ok(summary)
}

/// Input files in sorted order so document ids are reproducible.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry?;
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn index_jsonl(file: &Path, builder: &mut IndexBuilder) -> Result<usize> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let mut added = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: RawDocument = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        builder.add_document(doc.into_document())?;
        added += 1;
    }
    Ok(added)
}

fn index_json(file: &Path, builder: &mut IndexBuilder) -> Result<usize> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("{}", file.display()))?;
    let docs: Vec<RawDocument> = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .with_context(|| format!("{}", file.display()))?,
        serde_json::Value::Object(_) => {
            vec![serde_json::from_value(json).with_context(|| format!("{}", file.display()))?]
        }
        _ => bail!("{}: expected a JSON object or array", file.display()),
    };
    let added = docs.len();
    for doc in docs {
        builder.add_document(doc.into_document())?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redsift_core::Term;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn builds_from_mixed_inputs_in_name_order() {
        let input = tempdir().unwrap();
        write(input.path(), "b.jsonl", "{\"title\":\"Two\",\"text\":\"second crab\",\"url\":\"u2\",\"score\":4}\n\n{\"title\":\"Three\",\"text\":\"third crab\",\"url\":\"u3\"}\n");
        write(input.path(), "a.json", r#"{"title":"One","text":"first crab","url":"u1","score":1}"#);
        write(input.path(), "c.json", r#"[{"title":"Four","body":"fourth","url":"u4"}]"#);
        write(input.path(), "notes.txt", "ignored");

        let out = tempdir().unwrap();
        let index = out.path().join("index");
        let summary = build_index(input.path(), &index, IndexConfig::default(), false).unwrap();
        assert_eq!(summary.num_docs, 4);

        let store = IndexStore::open(&index).unwrap();
        assert_eq!(store.url(1).unwrap(), "u1");
        assert_eq!(store.url(2).unwrap(), "u2");
        assert_eq!(store.score(2).unwrap(), Some(4));
        let crab: Vec<u32> = store.postings(&Term::new("crab")).unwrap().iter().map(|p| p.doc_id).collect();
        assert_eq!(crab, vec![1, 2, 3]);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let input = tempdir().unwrap();
        write(input.path(), "a.json", r#"{"title":"One","text":"words","url":"u1"}"#);
        let out = tempdir().unwrap();
        write(out.path(), "keep.txt", "x");

        assert!(build_index(input.path(), out.path(), IndexConfig::default(), false).is_err());
        assert!(build_index(input.path(), out.path(), IndexConfig::default(), true).is_ok());
    }

    #[test]
    fn reports_malformed_documents() {
        let input = tempdir().unwrap();
        write(input.path(), "a.jsonl", "{\"title\":\"One\",\"url\":\"u1\"}\n");
        let out = tempdir().unwrap();
        let err = build_index(input.path(), &out.path().join("i"), IndexConfig::default(), false).unwrap_err();
        assert!(format!("{err:#}").contains("a.jsonl:1"));
    }
}
