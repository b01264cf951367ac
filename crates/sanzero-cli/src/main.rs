//! `sanzero`: analyse workplace-injury cases against a precedent store.

mod display;
mod embed;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sanzero_ai::{DisabledSummarizer, HashingEmbedder, Summarizer, TextEmbedder, WeightedGradeModel};
use sanzero_core::{AnalysisStatus, AnalysisType, Citation, EngineConfig};
use sanzero_engine::{AnalysisManager, Engine, ServiceContext};
use sanzero_store::{ExactMatchTable, IndexParams, JsonDirRepository, PrecedentStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sanzero", version)]
#[command(about = "Workplace-injury precedent retrieval and disability-grade prediction")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "SANZERO_CONFIG")]
    config: Option<PathBuf>,

    /// Override the similarity-tier threshold
    #[arg(long, global = true, env = "SANZERO_SIMILARITY_THRESHOLD")]
    similarity_threshold: Option<f32>,

    /// Override the model-tier threshold
    #[arg(long, global = true, env = "SANZERO_MODEL_THRESHOLD")]
    model_threshold: Option<f32>,

    /// Parquet file of embedded precedents
    #[arg(long, global = true, env = "SANZERO_PRECEDENTS")]
    precedents: Option<PathBuf>,

    /// JSON exact-match table
    #[arg(long, global = true, env = "SANZERO_EXACT_TABLE")]
    exact: Option<PathBuf>,

    /// JSON grade-model weights (built-in weights when absent)
    #[arg(long, global = true, env = "SANZERO_GRADE_WEIGHTS")]
    weights: Option<PathBuf>,

    /// ONNX embedding model directory (model.onnx + tokenizer.json); needs the `onnx` feature
    #[arg(long, global = true, env = "SANZERO_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Persist requests as JSON files under this directory
    #[arg(long, global = true, env = "SANZERO_REQUESTS_DIR")]
    requests_dir: Option<PathBuf>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit case descriptions, wait for them, and print the results.
    ///
    /// Tags like `injury=fracture body=leg severity=moderate code=8-3
    /// salary=3,000,000` in the text sharpen exact matching, the model tier,
    /// and the compensation estimate.
    Analyze {
        #[arg(required = true)]
        texts: Vec<String>,
        /// precedent_search, disability_prediction, or comprehensive
        #[arg(long = "type", default_value = "comprehensive")]
        kind: AnalysisType,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Print JSON instead of cards
        #[arg(long)]
        json: bool,
    },
    /// Top-k precedents for a case description
    Search {
        text: String,
        #[arg(short)]
        k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Embed the `text` column of a precedent Parquet file
    Embed {
        input: PathBuf,
        output: PathBuf,
        /// Recorded in the `embedding_model` column
        #[arg(long)]
        model_name: Option<String>,
    },
    /// A user's recent requests (needs --requests-dir)
    History {
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_parser = parse_status)]
        status: Option<AnalysisStatus>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    info!("sanzero v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Analyze {
            texts,
            kind,
            user,
            json,
        } => {
            let manager = AnalysisManager::new(Arc::new(build_context(&cli, config).await?));

            let mut ids = Vec::with_capacity(texts.len());
            for text in texts {
                let id = manager
                    .submit_analysis(user, text, *kind)
                    .await
                    .with_context(|| format!("submitting {text:?}"))?;
                ids.push(id);
            }
            let finished = futures::future::join_all(ids.iter().map(|id| manager.wait(*id))).await;
            manager.shutdown().await;

            let requests = finished.into_iter().collect::<Result<Vec<_>, _>>()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
            } else {
                for request in &requests {
                    display::print_request_card(request);
                }
            }
        }
        Command::Search { text, k, json } => {
            let engine = Engine::new(Arc::new(build_context(&cli, config).await?));
            let k = k.unwrap_or(engine.context().config.retrieval.top_k);
            let results = engine.search(text, k).await?;
            let citations: Vec<Citation> = results.iter().map(Citation::from).collect();
            if *json {
                println!("{}", serde_json::to_string_pretty(&citations)?);
            } else {
                display::print_citations(&citations);
            }
        }
        Command::Embed {
            input,
            output,
            model_name,
        } => {
            let embedder = build_embedder(cli.model_dir.as_deref(), &config)?;
            let model_name = model_name.clone().unwrap_or_else(|| match &cli.model_dir {
                Some(dir) => dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "onnx".into()),
                None => format!("hashing-{}", embedder.dim()),
            });
            eprintln!("Embedding {} with {model_name}...", input.display());
            let stats = embed::run_embed_pipeline(embedder.as_ref(), &model_name, input, output).await?;
            eprintln!(
                "  {} embedded, {} skipped in {:.1}s",
                stats.embedded, stats.skipped, stats.elapsed_secs
            );
        }
        Command::History {
            user,
            limit,
            status,
            json,
        } => {
            if cli.requests_dir.is_none() {
                anyhow::bail!("history needs --requests-dir");
            }
            let manager = AnalysisManager::new(Arc::new(build_context(&cli, config).await?));
            let requests = manager.list_for_user(user, *limit, *status).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
            } else if requests.is_empty() {
                println!("No requests for {user}.");
            } else {
                for request in &requests {
                    display::print_request_card(request);
                }
            }
        }
        Command::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(t) = cli.similarity_threshold {
        config.thresholds.similarity = t;
    }
    if let Some(t) = cli.model_threshold {
        config.thresholds.model = t;
    }
    config.validate()?;
    Ok(config)
}

async fn build_context(cli: &Cli, config: EngineConfig) -> anyhow::Result<ServiceContext> {
    let embedder = build_embedder(cli.model_dir.as_deref(), &config)?;

    let store = PrecedentStore::new(embedder.dim(), IndexParams::from(&config.retrieval));
    if let Some(path) = &cli.precedents {
        let load = store
            .load_parquet(path)
            .with_context(|| format!("loading precedents from {}", path.display()))?;
        info!(
            path = %path.display(),
            loaded = store.len()?,
            unembedded = load.unembedded,
            "precedents loaded"
        );
    }

    let mut builder = ServiceContext::builder(config)
        .embedder(embedder)
        .index(Arc::new(store))
        .summarizer(build_summarizer());
    if let Some(path) = &cli.exact {
        let table = ExactMatchTable::load_json(path)
            .with_context(|| format!("loading exact-match table {}", path.display()))?;
        builder = builder.exact(table);
    }
    if let Some(path) = &cli.weights {
        let model = WeightedGradeModel::load_json(path)
            .with_context(|| format!("loading grade weights {}", path.display()))?;
        builder = builder.classifier(Arc::new(model));
    }
    if let Some(dir) = &cli.requests_dir {
        let repo = JsonDirRepository::open(dir.clone())
            .await
            .with_context(|| format!("opening request directory {}", dir.display()))?;
        builder = builder.requests(Arc::new(repo));
    }
    Ok(builder.build()?)
}

fn build_embedder(
    model_dir: Option<&Path>,
    config: &EngineConfig,
) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    match model_dir {
        #[cfg(feature = "onnx")]
        Some(dir) => {
            let embedder = sanzero_ai::OnnxEmbedder::load(dir, config.embedding.max_chars)?;
            info!(dir = %dir.display(), dim = embedder.dim(), "ONNX embedder loaded");
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "onnx"))]
        Some(_) => anyhow::bail!("--model-dir needs sanzero built with the `onnx` feature"),
        None => Ok(Arc::new(HashingEmbedder::new(
            config.embedding.dim,
            config.embedding.max_chars,
        ))),
    }
}

fn build_summarizer() -> Arc<dyn Summarizer> {
    #[cfg(feature = "http")]
    {
        if let Some(summarizer) = sanzero_ai::AnthropicSummarizer::from_env() {
            info!("summaries via Anthropic API");
            return Arc::new(summarizer);
        }
    }
    Arc::new(DisabledSummarizer)
}

fn parse_status(s: &str) -> Result<AnalysisStatus, String> {
    [
        AnalysisStatus::Pending,
        AnalysisStatus::Processing,
        AnalysisStatus::Completed,
        AnalysisStatus::Failed,
    ]
    .into_iter()
    .find(|status| status.as_str() == s.trim().to_lowercase())
    .ok_or_else(|| format!("unknown status: {s}"))
}
