//! Write the demo catalog into a `SQLite` database.
//!
//! Usage: `seed [sqlite_url]`. The URL falls back to `LINGUA_DB_URL`, then to
//! a `lingua.sqlite3` file in the working directory.

use storage::Storage;
use storage::seed::seed_demo_catalog;

const DEFAULT_DB_URL: &str = "sqlite://lingua.sqlite3?mode=rwc";

fn db_url_from(mut args: impl Iterator<Item = String>) -> Result<String, String> {
    let url = match args.next() {
        Some(flag) if flag == "-h" || flag == "--help" => {
            return Err("usage: seed [sqlite_url]".into());
        }
        Some(url) if url.trim().is_empty() => return Err("empty database url".into()),
        Some(url) => url,
        None => std::env::var("LINGUA_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.into()),
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {extra}"));
    }
    Ok(url)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db_url = db_url_from(std::env::args().skip(1))?;
    let storage = Storage::sqlite(&db_url).await?;
    let written = seed_demo_catalog(storage.catalog.as_ref()).await?;
    println!("Seeded {written} cards into {db_url}");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
