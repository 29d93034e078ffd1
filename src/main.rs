//! platcache demo
//!
//! Starts an in-process cluster from a cluster file, creates its caches,
//! runs a small read workload on every node and reports which nodes host a
//! platform cache and how many reads reached the distributed store.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Cluster file │───▶│   Cluster    │───▶│   Workload   │
//! │ (YAML/JSON)  │    │ nodes+caches │    │  + report    │
//! └──────────────┘    └──────────────┘    └──────────────┘
//!                             │
//!                             ▼
//!                   /metrics  /healthz
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use platcache::adapters::{
    CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher, PrometheusExporter,
};
use platcache::{Cluster, ClusterFile, Node};

// =============================================================================
// CLI Arguments
// =============================================================================

/// platcache - node-filtered platform cache demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cluster description (.yaml, .yml or .json)
    #[arg(long, env = "PLATCACHE_CLUSTER_FILE", default_value = "demos/cluster.yaml")]
    cluster_file: String,

    /// Distinct keys written and then read on every node
    #[arg(long, env = "PLATCACHE_KEYS", default_value = "16")]
    keys: usize,

    /// Reads of each key per node
    #[arg(long, env = "PLATCACHE_READ_ROUNDS", default_value = "3")]
    read_rounds: usize,

    /// Serve /metrics and /healthz on this address until interrupted
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting platcache demo");
    info!("  Cluster file: {}", args.cluster_file);
    info!("  Keys: {}, read rounds: {}", args.keys, args.read_rounds);

    let file = ClusterFile::from_file(&args.cluster_file)
        .with_context(|| format!("failed to load cluster file {}", args.cluster_file))?;

    let events = Arc::new(InMemoryEventCollector::new());
    let publisher = CompositeEventPublisher::new()
        .with_publisher(LoggingEventPublisher::debug_level())
        .with_shared(events.clone());
    let cluster = Cluster::builder().publisher(Arc::new(publisher)).build();

    let nodes = cluster
        .apply(&file)
        .await
        .context("failed to start cluster")?;
    info!(
        nodes = nodes.len(),
        caches = cluster.cache_configs().len(),
        "Cluster started"
    );

    run_workload(&nodes, args.keys, args.read_rounds)
        .await
        .context("workload failed")?;
    report(&nodes);
    info!(
        events = events.len(),
        activations = events.events_of_type("PlatformCacheActivated").len(),
        filter_failures = events.events_of_type("FilterEvaluationFailed").len(),
        "Domain events recorded"
    );

    let exporter = Arc::new(PrometheusExporter::new()?);
    exporter.observe(&cluster);

    if let Some(addr) = args.metrics_addr.clone() {
        let server_cluster = cluster.clone();
        let server_exporter = exporter.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = run_metrics_server(&addr, server_cluster, server_exporter).await {
                error!("Metrics server error: {}", e);
            }
        });

        info!("Serving metrics, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        server.abort();
    } else {
        print!("{}", exporter.render()?);
    }

    cluster.stop_all().await;
    info!("Demo shutdown complete");
    Ok(())
}

// =============================================================================
// Workload
// =============================================================================

async fn run_workload(nodes: &[Node], keys: usize, rounds: usize) -> platcache::Result<()> {
    let Some(writer) = nodes.first() else {
        return Ok(());
    };

    for cache in writer.caches() {
        let entries = (0..keys).map(|i| (format!("key-{}", i), format!("value-{}", i)));
        cache.put_all(entries).await?;
    }

    for node in nodes {
        for cache in node.caches() {
            for _ in 0..rounds {
                for i in 0..keys {
                    cache.get(format!("key-{}", i)).await?;
                }
            }
        }
    }
    Ok(())
}

fn report(nodes: &[Node]) {
    for node in nodes {
        for cache in node.caches() {
            let metrics = cache.metrics();
            info!(
                node = %node.name(),
                client = node.is_client(),
                cache = %cache.name(),
                has_platform_cache = cache.has_platform_cache(),
                remote_gets = metrics.remote_gets,
                platform_hits = metrics.platform_hits,
                platform_entries = metrics.platform_entries,
                "Cache report"
            );
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    cluster: Arc<Cluster>,
    exporter: Arc<PrometheusExporter>,
) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        if let Ok(value) = content_type.parse() {
            response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
        }
        response
    }

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics server address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics server to {}", addr))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .context("metrics server accept error")?;
        let io = TokioIo::new(stream);
        let cluster = cluster.clone();
        let exporter = exporter.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let cluster = cluster.clone();
                let exporter = exporter.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            exporter.observe(&cluster);
                            match exporter.render() {
                                Ok(text) => respond(StatusCode::OK, exporter.content_type(), text),
                                Err(e) => respond(
                                    StatusCode::INTERNAL_SERVER_ERROR,
                                    "text/plain",
                                    e.to_string(),
                                ),
                            }
                        }
                        "/healthz" | "/livez" | "/readyz" => {
                            respond(StatusCode::OK, "text/plain", "ok")
                        }
                        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
