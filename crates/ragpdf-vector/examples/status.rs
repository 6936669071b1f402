use std::path::Path;

use ragpdf_core::config::{resolve_with_base, Config};
use ragpdf_core::traits::VectorStore;
use ragpdf_vector::LanceStore;

fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let db_path = resolve_with_base(Path::new("."), &settings.vector_db.persist_directory);
    let store = LanceStore::open(&db_path)?;
    let collections = store.collections()?;
    println!("{}: {} collection(s)", db_path.display(), collections.len());
    for c in collections {
        let dim = store.load(&c.name)?.map(|s| s.dim).unwrap_or(0);
        println!("  {:<40} entries={:<6} dim={}", c.name, c.entries, dim);
    }
    Ok(())
}
