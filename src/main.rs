use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use nearspot::ingest::{self, AddressLineFormat, AddressStreamWriter, LoaderConfig};
use nearspot::{
    CoordinatorConfig, EmbeddingProvider, GeoIndex, GeoPoint, HashingEmbedder, NearestOutcome,
    QueryCoordinator, RestApi, VectorIndex, VectorIndexConfig,
};
use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Nearest points of interest and address suggestions
#[derive(Parser, Debug)]
#[command(name = "nearspot")]
#[command(about = "Location lookup service", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the data files and serve the HTTP API
    Serve {
        /// Point of interest export (JSON lines, UTF-8 or UTF-16LE, optionally gzip)
        #[arg(long)]
        pois: PathBuf,

        /// Address record stream (optionally gzip). Queries are embedded with
        /// the built-in hashing embedder, so the stream must come from
        /// `nearspot encode` with the same --dim; embeddings from another model
        /// load fine but give meaningless suggestions
        #[arg(long)]
        addresses: PathBuf,

        /// HTTP API port
        #[arg(long, default_value_t = 8050)]
        port: u16,

        #[command(flatten)]
        index: IndexArgs,
    },
    /// Print the points of interest nearest to a position
    Nearest {
        #[arg(long)]
        pois: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Search radius in kilometers
        #[arg(long, default_value_t = 200.0)]
        radius_km: f64,
    },
    /// Print address suggestions for a piece of text
    Suggest {
        /// Address record stream (optionally gzip). Queries are embedded with
        /// the built-in hashing embedder, so the stream must come from
        /// `nearspot encode` with the same --dim; embeddings from another model
        /// load fine but give meaningless suggestions
        #[arg(long)]
        addresses: PathBuf,

        #[command(flatten)]
        index: IndexArgs,

        text: String,
    },
    /// Embed a plain-text address list into an address record stream
    Encode {
        /// Semicolon separated input (optionally gzip)
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Input layout: "simple" (label;lat;lon) or "ban"
        #[arg(long, default_value = "simple")]
        format: AddressLineFormat,

        /// Embedding dimension
        #[arg(long, default_value_t = 1024)]
        dim: usize,
    },
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Embedding dimension of the address stream
    #[arg(long, default_value_t = 1024)]
    dim: usize,

    /// Exact scan instead of the HNSW graph
    #[arg(long)]
    exact: bool,

    /// Frames decoded per parallel batch while loading
    #[arg(long, default_value_t = 4096)]
    batch_size: usize,
}

impl IndexArgs {
    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size,
            expected_dim: Some(self.dim),
        }
    }

    fn vector_config(&self) -> VectorIndexConfig {
        VectorIndexConfig {
            dim: self.dim,
            use_hnsw: !self.exact,
            ..Default::default()
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

fn load_geo(path: &Path) -> anyhow::Result<Arc<GeoIndex>> {
    let (pois, _) = ingest::load_pois(path)?;
    let geo = Arc::new(GeoIndex::default());
    geo.build(pois).context("building geo index")?;
    Ok(geo)
}

/// Records re-embedded when checking a loaded address stream
const EMBEDDER_SAMPLE: usize = 16;
const MIN_EMBEDDER_AGREEMENT: f32 = 0.99;

fn load_vectors(path: &Path, args: &IndexArgs) -> anyhow::Result<Arc<VectorIndex>> {
    let (records, _) = ingest::load_addresses(path, &args.loader_config())?;
    let embedder = HashingEmbedder::new(args.dim);
    if let Some(agreement) = ingest::embedder_agreement(&records, &embedder, EMBEDDER_SAMPLE)? {
        if agreement < MIN_EMBEDDER_AGREEMENT {
            warn!(
                path = %path.display(),
                agreement,
                "address embeddings do not match the hashing embedder, suggestions will be unreliable"
            );
        }
    }
    let vectors = Arc::new(VectorIndex::new(args.vector_config()));
    vectors.build(records).context("building vector index")?;
    Ok(vectors)
}

fn coordinator(
    geo: Arc<GeoIndex>,
    vectors: Arc<VectorIndex>,
    dim: usize,
    config: CoordinatorConfig,
) -> Arc<QueryCoordinator> {
    Arc::new(QueryCoordinator::new(
        geo,
        vectors,
        Arc::new(HashingEmbedder::new(dim)),
        config,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Serve {
            pois,
            addresses,
            port,
            index,
        } => serve(&pois, &addresses, port, &index).await,
        Command::Nearest {
            pois,
            lat,
            lon,
            radius_km,
        } => nearest(&pois, lat, lon, radius_km),
        Command::Suggest {
            addresses,
            index,
            text,
        } => suggest(&addresses, &index, &text),
        Command::Encode {
            input,
            output,
            format,
            dim,
        } => encode(&input, &output, format, dim),
    }
}

async fn serve(pois: &Path, addresses: &Path, port: u16, index: &IndexArgs) -> anyhow::Result<()> {
    info!("Starting nearspot v{}", env!("CARGO_PKG_VERSION"));

    let geo = load_geo(pois)?;
    let vectors = load_vectors(addresses, index)?;
    info!(pois = geo.len(), addresses = vectors.len(), "indexes ready");

    let coordinator = coordinator(geo, vectors, index.dim, CoordinatorConfig::default());

    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(coordinator, port).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/", port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}

fn nearest(pois: &Path, lat: f64, lon: f64, radius_km: f64) -> anyhow::Result<()> {
    let position = GeoPoint::new(lat, lon)?;
    let coordinator = coordinator(
        load_geo(pois)?,
        Arc::new(VectorIndex::default()),
        1,
        CoordinatorConfig {
            radius_km,
            ..Default::default()
        },
    );

    let output = match coordinator.nearest_poi(&position)? {
        NearestOutcome::Found { results, viewport } => serde_json::json!({
            "status": "ok",
            "points": results,
            "zoom": viewport.zoom,
            "center": viewport.center,
        }),
        NearestOutcome::NoResults => serde_json::json!({ "status": "no_results", "points": [] }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn suggest(addresses: &Path, index: &IndexArgs, text: &str) -> anyhow::Result<()> {
    let geo = Arc::new(GeoIndex::default());
    let vectors = load_vectors(addresses, index)?;
    let coordinator = coordinator(geo, vectors, index.dim, CoordinatorConfig::default());

    let suggestions = coordinator.suggest_addresses(text)?;
    println!("{}", serde_json::to_string_pretty(&suggestions)?);
    Ok(())
}

fn encode(input: &Path, output: &Path, format: AddressLineFormat, dim: usize) -> anyhow::Result<()> {
    let embedder = HashingEmbedder::new(dim);
    let reader = ingest::open_input(input)?;
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = AddressStreamWriter::new(BufWriter::new(file));

    let mut skipped = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", input.display()))?;
        if n == 0 && format.has_header() {
            continue;
        }
        let Some(address) = ingest::parse_address_line(&line, format) else {
            if !line.trim().is_empty() {
                warn!(line = n + 1, "skipping malformed address line");
                skipped += 1;
            }
            continue;
        };
        let coordinate = match GeoPoint::new(address.lat, address.lon) {
            Ok(c) => c,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping address");
                skipped += 1;
                continue;
            }
        };
        let embedding = embedder.embed(&address.label)?;
        writer.write_record(&address.label, &coordinate, &embedding)?;
    }

    let written = writer.written();
    writer.finish()?;
    info!(written, skipped, dim = embedder.dim(), output = %output.display(), "encoded addresses");
    Ok(())
}
