//! # suitegen CLI
//!
//! The `suitegen` binary drives the generation pipeline from the shell and
//! starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! suitegen --config ./config/suitegen.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `suitegen init` | Create the SQLite database and schema |
//! | `suitegen digest <file>` | Print the digest of an API description (no backend needed) |
//! | `suitegen generate <file>` | Generate a test suite and store it |
//! | `suitegen regenerate <key> -f "<feedback>"` | Refine a stored suite under a new key |
//! | `suitegen download <key>` | Write a stored suite to disk |
//! | `suitegen list` | List stored suites |
//! | `suitegen lineage <key>` | Show the refinement chain of a suite |
//! | `suitegen serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `suitegen=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use suitegen::backend::create_generator;
use suitegen::config::{self, Config};
use suitegen::controller::{GenerateRequest, RegenerateRequest, RetryPolicy, SessionController};
use suitegen::{migrate, server};
use suitegen_core::digest::{digest, DigestPolicy};
use suitegen_core::error::PipelineError;
use suitegen_core::models::{GenerationResponse, GenerationResult, SpecFormat};

/// suitegen — generate API test suites from OpenAPI descriptions and refine
/// them with feedback.
#[derive(Parser)]
#[command(
    name = "suitegen",
    about = "Generate API test suites from OpenAPI descriptions and refine them with feedback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/suitegen.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Print the digest (title, endpoints, models) of an API description.
    ///
    /// Does not read the config file or contact a backend.
    Digest {
        /// OpenAPI / Swagger file (`.json`, `.yaml`, `.yml`).
        file: PathBuf,

        /// Override the format implied by the extension (`json` or `yaml`).
        #[arg(long)]
        format: Option<SpecFormat>,

        /// Accept descriptions that declare no endpoints.
        #[arg(long)]
        allow_empty: bool,

        /// Print the digest as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate a test suite from an API description.
    Generate {
        /// OpenAPI / Swagger file (`.json`, `.yaml`, `.yml`).
        file: PathBuf,

        /// Override the format implied by the extension (`json` or `yaml`).
        #[arg(long)]
        format: Option<SpecFormat>,

        /// Re-run the whole pipeline up to N times after backend failures.
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Also write the generated source to this path.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Refine a stored test suite with feedback; stores it under a new key.
    Regenerate {
        /// Key of the suite to refine.
        key: String,

        /// What to change, passed to the backend verbatim.
        #[arg(long, short = 'f')]
        feedback: String,

        /// Also write the refined source to this path.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a stored test suite to disk.
    Download {
        /// Key of the suite.
        key: String,

        /// Output path. Defaults to `<Title>_Tests.java` in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the source to stdout instead of writing a file.
        #[arg(long, conflicts_with = "out")]
        stdout: bool,
    },

    /// List stored test suites, oldest first.
    List,

    /// Show the refinement chain of a suite, newest first.
    Lineage {
        /// Key of the suite.
        key: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("suitegen=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_upload(file: &Path, format: Option<SpecFormat>) -> Result<GenerateRequest> {
    let content =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(GenerateRequest {
        filename: file.file_name().map(|n| n.to_string_lossy().into_owned()),
        format,
        content,
    })
}

/// Print a pipeline outcome and turn failures into a non-zero exit.
fn report(
    outcome: std::result::Result<GenerationResult, PipelineError>,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let result = match outcome {
        Ok(result) => result,
        Err(err) if json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&GenerationResponse::from(&err))?
            );
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(path) = out {
        std::fs::write(path, &result.source_text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&GenerationResponse::from(result))?
        );
        return Ok(());
    }

    println!("key:       {}", result.key);
    println!("api:       {}", result.api_title);
    println!("endpoints: {}", result.endpoints_count);
    if let Some(parent) = &result.parent_key {
        println!("parent:    {}", parent);
    }
    match out {
        Some(path) => println!("written:   {}", path.display()),
        None => {
            println!();
            println!("{}", result.source_text);
        }
    }
    Ok(())
}

async fn open_controller(cfg: &Config) -> Result<SessionController> {
    let generator = create_generator(&cfg.generation)?;
    SessionController::from_config(cfg, generator).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Digest {
        file,
        format,
        allow_empty,
        json,
    } = &cli.command
    {
        let description = read_upload(file, *format)?.into_description()?;
        let policy = DigestPolicy {
            require_non_empty: !allow_empty,
        };
        let d = digest(&description, policy)?;
        if *json {
            println!("{}", serde_json::to_string_pretty(&d)?);
        } else {
            println!("title:     {}", d.title());
            println!("endpoints: {}", d.endpoint_count());
            for e in d.endpoints() {
                println!("  {:<7} {}", e.method, e.path);
            }
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Generate {
            file,
            format,
            retries,
            out,
            json,
        } => {
            let controller = open_controller(&cfg).await?;
            let request = read_upload(&file, format)?;
            let outcome = RetryPolicy::new(retries)
                .run(|| {
                    let request = request.clone();
                    let controller = &controller;
                    async move {
                        controller
                            .handle_generate(request.into_description()?)
                            .await
                    }
                })
                .await;
            report(outcome, out.as_deref(), json)?;
        }
        Commands::Regenerate {
            key,
            feedback,
            out,
            json,
        } => {
            let controller = open_controller(&cfg).await?;
            let outcome = controller
                .handle_regenerate(RegenerateRequest::new(key, feedback))
                .await;
            report(outcome, out.as_deref(), json)?;
        }
        Commands::Download { key, out, stdout } => {
            let controller = open_controller(&cfg).await?;
            let artifact = controller.handle_download(&key).await?;
            if stdout {
                print!("{}", artifact.source_text);
            } else {
                let path = out.unwrap_or_else(|| {
                    PathBuf::from(artifact.provenance.digest.download_filename())
                });
                std::fs::write(&path, &artifact.source_text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
        }
        Commands::List => {
            let controller = open_controller(&cfg).await?;
            let artifacts = controller.store().list().await?;
            if artifacts.is_empty() {
                println!("No artifacts.");
            } else {
                println!("{:<36}  {:<20}  {:<36}  TITLE", "KEY", "CREATED", "PARENT");
                for a in artifacts {
                    println!(
                        "{:<36}  {:<20}  {:<36}  {}",
                        a.key,
                        a.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
                        a.parent_key.as_deref().unwrap_or("-"),
                        a.api_title
                    );
                }
            }
        }
        Commands::Lineage { key } => {
            let controller = open_controller(&cfg).await?;
            for (depth, a) in controller.lineage(&key).await?.iter().enumerate() {
                let kind = if a.parent_key.is_some() { "refined" } else { "generated" };
                println!("{}{}  {}", "  ".repeat(depth), a.key, kind);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Digest { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
