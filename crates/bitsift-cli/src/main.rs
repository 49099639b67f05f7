//! Bitsift CLI - binary-quantized retrieval from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Answer a question, acquiring live documents if local ones fall short
//! bitsift ask "when does the museum open"
//! bitsift ask "query" --json
//!
//! # Inspect a single space
//! bitsift search text "rust embeddings" -n 5
//!
//! # Print the full document behind a hit
//! bitsift show doc1_text_3
//!
//! # Index local files or directories (.txt, .md)
//! bitsift ingest notes/ todo.md
//!
//! # Run the query-session server
//! bitsift serve --port 8000
//! ```

mod config;
mod inbox;
mod openai;
mod output;
mod server;
#[cfg(test)]
mod test_support;

use anyhow::{anyhow, Context, Result};
use bitsift_core::codec::quantize;
use bitsift_core::collaborators::TextEmbedder;
use bitsift_core::conversion::TextFileConverter;
use bitsift_core::space::SpaceKind;
use bitsift_core::{AppContext, Collaborators};
use clap::{Parser, Subcommand};
use config::Settings;
use inbox::InboxCrawler;
use openai::{OpenAiClient, OpenAiEmbedder, OpenAiGenerator, OpenAiQueryRewriter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Bitsift retrieval CLI.
///
/// Searches locally indexed documents across text, metadata and image
/// spaces, and falls back to live sources when they cannot answer.
#[derive(Parser)]
#[command(name = "bitsift", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings file (default: bitsift.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a query through the retrieval cascade
    Ask {
        query: String,
        /// Output the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search one space (text, metadata or image)
    Search {
        space: String,
        query: String,
        /// Maximum number of hits
        #[arg(short = 'n', long, default_value = "8")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Print the full text of the document owning a point id
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Index local files or directories
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Serve the query-session WebSocket API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    /// Suggest alternative phrasings of a query
    Suggest {
        query: String,
        #[arg(short, default_value = "3")]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = config::load_settings(cli.data_dir.as_ref(), cli.config.as_ref())?;
    let ctx = open_engine(settings).await?;

    match cli.command {
        Command::Ask { query, json } => {
            let outcome = ctx.cascade.run(&query).await.context("Query failed")?;
            let rendered = if json {
                output::format_outcome_json(&outcome)
            } else {
                output::format_outcome_human(&query, &outcome)
            };
            println!("{}", rendered);
        }
        Command::Search {
            space,
            query,
            limit,
            json,
        } => {
            let kind: SpaceKind = space.parse()?;
            let embedding = ctx
                .cascade
                .embedder()
                .embed_query(&query)
                .await
                .context("Failed to embed query")?;
            let hits = match kind {
                SpaceKind::Text => {
                    ctx.retriever
                        .search_text_space(&quantize(&embedding)?, limit)
                        .await?
                }
                SpaceKind::Metadata => {
                    ctx.retriever
                        .search_metadata_space(&quantize(&embedding)?, limit)
                        .await?
                }
                SpaceKind::Image => ctx.retriever.search_image_space(&embedding, limit).await?,
            };
            let rendered = if json {
                output::format_hits_json(&query, kind, &hits)
            } else {
                output::format_hits_human(&query, kind, &hits)
            };
            println!("{}", rendered);
        }
        Command::Show { id, json } => {
            let text = ctx
                .retriever
                .resolve_full_document_text(&id)
                .await
                .with_context(|| format!("Failed to load {id}"))?;
            let rendered = if json {
                output::format_document_json(&id, &text)
            } else {
                output::format_document_human(&id, &text)
            };
            println!("{}", rendered);
        }
        Command::Ingest { paths } => {
            let files = expand_paths(&paths)?;
            let mut failed = 0;
            for file in &files {
                let result = ctx
                    .indexer
                    .ingest_file(file)
                    .await
                    .map_err(|e| e.to_string());
                if result.is_err() {
                    failed += 1;
                }
                println!("{}", output::format_ingest(&file.display().to_string(), &result));
            }
            if failed > 0 {
                return Err(anyhow!("{} of {} files failed", failed, files.len()));
            }
        }
        Command::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("Invalid address {host}:{port}"))?;
            server::serve(ctx, addr).await?;
        }
        Command::Suggest { query, k } => {
            for suggestion in ctx.cascade.suggest(&query, k).await? {
                println!("{}", suggestion);
            }
        }
    }

    Ok(())
}

/// Wires the HTTP-backed collaborators and bootstraps the engine.
async fn open_engine(settings: Settings) -> Result<Arc<AppContext>> {
    let client = OpenAiClient::new(settings.openai.clone());
    let embedder = Arc::new(OpenAiEmbedder::new(client.clone(), settings.engine.dimension));
    let image_embedder = Arc::new(OpenAiEmbedder::new(
        client.clone(),
        settings.engine.image_dimension,
    ));
    let crawler = InboxCrawler::new(settings.inbox_dir()).with_image_embedder(image_embedder);
    info!("Inbox: {}", crawler.dir().display());

    let collaborators = Collaborators {
        embedder,
        generator: Arc::new(OpenAiGenerator::new(client.clone())),
        rewriter: Arc::new(OpenAiQueryRewriter::new(client)),
        crawler: Arc::new(crawler),
    };

    info!("Opening database: {}", settings.engine.database_path.display());
    let ctx = AppContext::bootstrap(settings.engine, collaborators)
        .await
        .context("Failed to start engine")?;
    Ok(Arc::new(ctx))
}

/// Expands directories one level into their supported files.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(absolute(path))
                .with_context(|| format!("Failed to read directory: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && TextFileConverter::supports(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(absolute(path));
        }
    }
    Ok(files)
}

/// Upload ids hash the path, so the same file must always be named the same way.
fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["bitsift", "search", "text", "hello", "-n", "3", "-v"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Search {
                space,
                query,
                limit,
                json,
            } => {
                assert_eq!(space, "text");
                assert_eq!(query, "hello");
                assert_eq!(limit, 3);
                assert!(!json);
            }
            _ => panic!("expected search"),
        }

        assert!(Cli::try_parse_from(["bitsift", "ingest"]).is_err());

        let cli = Cli::try_parse_from(["bitsift", "show", "doc1_text_2", "--json"]).unwrap();
        match cli.command {
            Command::Show { id, json } => {
                assert_eq!(id, "doc1_text_2");
                assert!(json);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_expand_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "c").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = expand_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }
}
