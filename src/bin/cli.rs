//! evidence-miner CLI
//!
//! Usage: evidence-miner [OPTIONS] <COMMAND>
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG` overrides
//! the level).

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use evidence_miner_lib::pages::{JsonPages, PageParser};
use evidence_miner_lib::papers::article::ParsedArticle;
use evidence_miner_lib::papers::locator::SourceQuery;
use evidence_miner_lib::papers::supplements::supplementary_links;
use evidence_miner_lib::pipeline::{load_manifest, Miner, RecordWriter};
use evidence_miner_lib::settings::{self, Settings};
use evidence_miner_lib::{MinerError, Result};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evidence-miner")]
#[command(version, about = "Mine supplement tables and included-study sources from meta-analyses", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (default: <config dir>/evidence-miner/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a manifest of documents
    Mine {
        /// JSON array of {id, pmid?, pmcid?, pages?, article_html?}
        #[arg(long)]
        manifest: PathBuf,
        /// JSON Lines output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Mine logical tables from pre-extracted supplement pages
    Tables {
        #[arg(long)]
        pages: PathBuf,
        /// Document id stamped on each table
        #[arg(long)]
        id: Option<String>,
    },
    /// List an article's included-study citations
    Citations {
        /// Saved article HTML
        #[arg(long, conflicts_with = "pmcid", required_unless_present = "pmcid")]
        html: Option<PathBuf>,
        /// Fetch the article from the repository
        #[arg(long)]
        pmcid: Option<String>,
    },
    /// Resolve one study to a full-text source
    Locate {
        #[arg(long)]
        pmcid: Option<String>,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        pmid: Option<String>,
    },
    /// List supplementary files worth mining
    Supplements {
        #[arg(long)]
        pmcid: String,
    },
    /// Print the effective settings
    Config {
        /// Write the stored settings back with every default filled in
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run_cli(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn settings_path(path: Option<&Path>) -> Option<PathBuf> {
    path.map(PathBuf::from).or_else(settings::default_path)
}

fn load_settings(path: Option<&Path>) -> Settings {
    let settings = match settings_path(path) {
        Some(path) => Settings::load(&path),
        None => Settings::default(),
    };
    settings.with_env_overrides()
}

/// Save the file's settings (not the environment overrides) with defaults filled in
fn write_settings(path: Option<&Path>) -> Result<()> {
    let path = settings_path(path)
        .ok_or_else(|| MinerError::Config("no config directory; pass --config".to_string()))?;
    Settings::load(&path).save(&path)?;
    info!(path = %path.display(), "settings written");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref());

    if let Commands::Config { write } = cli.command {
        if write {
            write_settings(cli.config.as_deref())?;
        }
        let mut shown = settings.clone();
        shown.llm.api_key = settings.masked_llm_api_key();
        return print_json(&shown);
    }

    let miner = Miner::from_settings(&settings)?;

    match cli.command {
        Commands::Mine { manifest, output } => handle_mine(&miner, &manifest, output.as_deref()).await,
        Commands::Tables { pages, id } => {
            let id = id.unwrap_or_else(|| pages.display().to_string());
            let pages = JsonPages.parse(&pages)?;
            let tables = miner.extract_tables(&id, pages).await;
            print_json(&tables)
        }
        Commands::Citations { html, pmcid } => {
            let html = match (html, pmcid) {
                (Some(path), _) => std::fs::read_to_string(path)?,
                (None, Some(pmcid)) => repository(&miner)?.fetch_article_html(&pmcid).await?,
                (None, None) => return Err(MinerError::Config("--html or --pmcid is required".to_string())),
            };
            let citations = miner.extract_citations("cli", ParsedArticle::parse(&html)).await;
            print_json(&citations)
        }
        Commands::Locate { pmcid, doi, pmid } => {
            let query = SourceQuery {
                repository_id: pmcid,
                doi,
                pmid,
            };
            if query.is_empty() {
                return Err(MinerError::Config("give at least one of --pmcid, --doi, --pmid".to_string()));
            }
            match miner.locator().locate(query).await {
                Some(source) => print_json(&source),
                None => {
                    println!("not found");
                    Ok(())
                }
            }
        }
        Commands::Supplements { pmcid } => {
            let repository = repository(&miner)?;
            let page_url = repository.article_url(&pmcid)?;
            let html = repository.fetch_article_html(&pmcid).await?;
            print_json(&supplementary_links(&html, &page_url))
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn repository(miner: &Miner) -> Result<&evidence_miner_lib::papers::pmc::PmcClient> {
    miner
        .repository()
        .ok_or_else(|| MinerError::Config("no repository configured".to_string()))
}

async fn handle_mine(miner: &Miner, manifest: &Path, output: Option<&Path>) -> Result<()> {
    let entries = load_manifest(manifest)?;
    info!(documents = entries.len(), manifest = %manifest.display(), "loaded manifest");

    let mut inputs = Vec::with_capacity(entries.len());
    for entry in &entries {
        inputs.push(miner.prepare(entry, &JsonPages).await);
    }

    let summary = match output {
        Some(path) => {
            let mut writer = RecordWriter::new(BufWriter::new(File::create(path)?));
            miner.mine_batch(inputs, &mut writer).await?
        }
        None => {
            let mut writer = RecordWriter::new(io::stdout().lock());
            miner.mine_batch(inputs, &mut writer).await?
        }
    };

    eprintln!(
        "Mined {} documents: {} tables, {} citations, {} sources",
        summary.documents, summary.tables, summary.citations, summary.resolved_sources
    );
    miner.locator().print_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_write_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"caption_marker": "Table"}"#).unwrap();

        let cli = Cli::try_parse_from(["evidence-miner", "--config", path.to_str().unwrap(), "config", "--write"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { write: true }));
        write_settings(cli.config.as_deref()).unwrap();

        let written = Settings::read(&path).unwrap();
        assert_eq!(written.caption_marker, "Table");
        assert_eq!(written.document_concurrency, Settings::default().document_concurrency);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"doi_resolver_base_url\""));
    }
}
