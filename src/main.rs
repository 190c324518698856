use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use panelx::{
    Backends, FieldCatalog, HashEmbedder, HybridEngine, LegacyQuery, PanelSnapshot, Pooled, SearchConfig,
    SearchMode, SearchQuery, SerializedEmbedder,
};

/// Resolve a classified query against a panel snapshot
#[derive(Parser, Debug)]
#[command(name = "panelx")]
#[command(about = "Hybrid panel query resolution", long_about = None)]
struct Args {
    /// Panel snapshot (.json or .json.gz)
    #[arg(short, long)]
    data: PathBuf,

    /// Classified query as JSON
    #[arg(short, long)]
    query: PathBuf,

    /// Engine configuration as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candidate set returned when no limit is given
    #[arg(long)]
    mode: Option<SearchMode>,

    /// Maximum number of panels returned
    #[arg(long)]
    limit: Option<usize>,

    /// Per sub-search timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Dimension of the local embedder
    #[arg(long, default_value_t = 256)]
    dimension: usize,

    /// Connections per pooled collaborator
    #[arg(long, default_value_t = 8)]
    pool_size: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn read_query(args: &Args, config: &SearchConfig, engine: &HybridEngine) -> anyhow::Result<SearchQuery> {
    let raw = std::fs::read_to_string(&args.query)
        .with_context(|| format!("reading query {}", args.query.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing query JSON")?;

    let mut query = if value.get("objective_keywords").is_some() {
        let legacy: LegacyQuery = serde_json::from_value(value)?;
        legacy.into_query(&engine.keyword_builder()?, config.default_mode)
    } else {
        serde_json::from_value(value)?
    };
    if let Some(mode) = args.mode {
        query.mode = mode;
    }
    if args.limit.is_some() {
        query.limit = args.limit;
    }
    Ok(query)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting panelx v{}", env!("CARGO_PKG_VERSION"));
    info!("Snapshot: {:?}", args.data);

    let mut config = match &args.config {
        Some(path) => SearchConfig::from_path(path)?,
        None => SearchConfig::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.task_timeout_ms = timeout_ms;
    }

    let embedder = SerializedEmbedder::new(HashEmbedder::new(args.dimension)?);
    let loaded = PanelSnapshot::load(&args.data)?.into_collaborators(&embedder).await?;
    let backends = Backends {
        attributes: Arc::new(Pooled::open("attributes", loaded.attributes, args.pool_size)?),
        free_text: Arc::new(Pooled::open("free_text", loaded.free_text, args.pool_size)?),
        poll: Arc::new(Pooled::open("poll", loaded.poll, args.pool_size)?),
        embedder: Arc::new(embedder),
    };

    let engine = HybridEngine::open(backends, Arc::new(FieldCatalog::builtin()), config.clone()).await?;
    let query = read_query(&args, &config, &engine)?;
    let resolution = engine.resolve(&query).await;
    engine.close();

    let resolution = resolution?;
    info!(
        final_count = resolution.final_ids.len(),
        elapsed_ms = resolution.report.elapsed_ms,
        "Done"
    );
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}
