use anyhow::{Context, Result};
use clap::Parser;
use relabs::rewrite_relative_urls;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Rewrite relative URLs in an HTML fragment to absolute ones.
#[derive(Parser)]
#[command(name = "relabs", version)]
struct Args {
    /// HTML file to rewrite; reads stdin when omitted
    input: Option<PathBuf>,

    /// Base URL the fragment was fetched from
    #[arg(short, long)]
    base_url: String,

    /// Output file; writes stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let html = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let rewritten = rewrite_relative_urls(&html, &args.base_url);

    match &args.output {
        Some(path) => fs::write(path, &rewritten)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout()
            .write_all(rewritten.as_bytes())
            .context("Failed to write output")?,
    }

    Ok(())
}
