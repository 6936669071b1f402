use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use ragpdf_chain::Retriever;
use ragpdf_core::config::resolve_with_base;
use ragpdf_core::traits::{Embedder, VectorStore};
use ragpdf_cli::{init_tracing, load_settings};
use ragpdf_embed::get_default_embedder;
use ragpdf_vector::{LanceStore, VectorIndex};

/// Retrieval only: show the passages a question would be answered from.
#[derive(Parser, Debug)]
#[command(name = "ragpdf-search", version, about)]
struct Cli {
    query: String,

    #[arg(long, short, env = "RAGPDF_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Collection to search (defaults to the only one stored)
    #[arg(long)]
    collection: Option<String>,

    #[arg(long, short = 'k')]
    limit: Option<usize>,

    #[arg(long)]
    threshold: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let (settings, base) = load_settings(&cli.config)?;

    let dir = resolve_with_base(&base, &settings.vector_db.persist_directory);
    let store = LanceStore::open(&dir).with_context(|| format!("opening vector store at {}", dir.display()))?;
    let collection = match cli.collection {
        Some(c) => c,
        None => {
            let mut all = store.collections()?;
            match all.len() {
                0 => bail!("no collections in {}; load a PDF first", dir.display()),
                1 => all.remove(0).name,
                _ => {
                    let names: Vec<String> = all.into_iter().map(|c| c.name).collect();
                    bail!("several collections stored, pick one with --collection: {}", names.join(", "))
                }
            }
        }
    };

    let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder(&settings.embedding)?);
    let index = VectorIndex::load(&store, &collection, Some(embedder.dim()))?;
    let k = cli.limit.unwrap_or(settings.rag.top_k);
    let threshold = cli.threshold.unwrap_or(settings.rag.similarity_threshold);

    println!("🔍 '{}' in {} ({} chunks)\n", cli.query, collection, index.len());
    let hits = Retriever::new(embedder).retrieve(&index, &cli.query, k, threshold)?;
    if hits.is_empty() {
        println!("No passage scored at least {threshold}.");
    }
    for h in hits {
        println!("{}. {} p.{}  score {:.4}", h.rank, h.chunk.id, h.chunk.page_label(), h.score);
        let preview: String = h.chunk.text.chars().take(300).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }
    Ok(())
}
