//! Sales assistant entry point
//!
//! `sales-rag ingest | chat | ask | serve`

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use sales_rag_agent::{SalesAgent, TurnPlan};
use sales_rag_config::prompts::{CLI_GOODBYE, CLI_INPUT, CLI_READY};
use sales_rag_config::{load_settings, Settings};
use sales_rag_core::{Embedder, ProductStore};
use sales_rag_llm::create_embedder;
use sales_rag_rag::{create_store, load_products, IngestMode, IngestReport, Ingestor};
use sales_rag_server::{create_router, init_metrics, AppState};

#[derive(Parser)]
#[command(name = "sales-rag", version, about = "Retrieval-augmented sales assistant")]
struct Cli {
    /// Configuration environment, loads `config/{env}.toml`
    #[arg(long, env = "SALES_RAG_ENV", global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the product catalog into the configured store
    Ingest {
        /// Catalog CSV, defaults to `catalog.csv_path`
        #[arg(long)]
        csv: Option<String>,

        /// `if-empty` or `missing-only`
        #[arg(long, default_value = "if-empty")]
        mode: IngestMode,
    },
    /// Interactive chat on stdin
    Chat,
    /// One-shot answer from retrieved passages
    Ask { question: String },
    /// HTTP chat server
    Serve {
        /// Overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = load_settings(cli.env.as_deref()).context("Failed to load configuration")?;
    init_tracing(&settings);

    match cli.command {
        Command::Ingest { csv, mode } => {
            let csv = csv.unwrap_or_else(|| settings.catalog.csv_path.clone());
            let embedder = create_embedder(&settings.embedding)?;
            let store = create_store(&settings)?;
            let report = ingest_catalog(store, embedder, &csv, mode).await?;
            println!(
                "✅ {} sản phẩm, đã chèn {}, bỏ qua {}",
                report.total, report.inserted, report.skipped
            );
        }
        Command::Chat => {
            let agent = SalesAgent::from_settings(&settings).await?;
            ingest_on_startup(&agent, &settings).await;
            run_chat(&agent).await?;
        }
        Command::Ask { question } => {
            let agent = SalesAgent::from_settings(&settings).await?;
            let outcome = agent.ask(&question).await?;
            println!("Thông tin được tìm thấy:");
            for hit in &outcome.hits {
                println!("Title: {}, Information: {}", hit.title, hit.information);
                println!("{}", "-".repeat(50));
            }
            println!("🤖 Trả lời: {}", outcome.reply);
        }
        Command::Serve { port } => {
            let mut settings = settings;
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await?;
        }
    }

    Ok(())
}

async fn ingest_catalog(
    store: Arc<dyn ProductStore>,
    embedder: Arc<dyn Embedder>,
    csv: &str,
    mode: IngestMode,
) -> anyhow::Result<IngestReport> {
    let products = load_products(csv).with_context(|| format!("Failed to read catalog {}", csv))?;
    let report = Ingestor::new(store, embedder).run(&products, mode).await?;
    Ok(report)
}

/// Fill an empty store from the configured catalog, if the file exists
async fn ingest_on_startup(agent: &SalesAgent, settings: &Settings) {
    let csv = &settings.catalog.csv_path;
    if !Path::new(csv).exists() {
        tracing::warn!(csv = %csv, "Catalog file not found, skipping startup ingest");
        return;
    }

    let retriever = agent.retriever();
    match ingest_catalog(
        retriever.store().clone(),
        retriever.embedder().clone(),
        csv,
        IngestMode::IfEmpty,
    )
    .await
    {
        Ok(report) if report.inserted > 0 => {
            tracing::info!(inserted = report.inserted, "Catalog loaded into empty store")
        }
        Ok(_) => tracing::info!("Store already populated, skipping insert"),
        Err(e) => tracing::warn!(error = %e, "Startup ingest failed"),
    }
}

async fn run_chat(agent: &SalesAgent) -> anyhow::Result<()> {
    let mut conversation = agent.new_conversation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", CLI_READY);
    loop {
        print!("\n{}", CLI_INPUT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("exit") {
            println!("{}", CLI_GOODBYE);
            break;
        }

        let pending = match agent.begin_turn(&mut conversation, query).await {
            Ok(TurnPlan::Clarify { message }) => {
                println!("[Semantic Router] → Phân loại: uncertain");
                println!("{}", message);
                continue;
            }
            Ok(TurnPlan::Answer(pending)) => pending,
            Err(e) => {
                eprintln!("⚠️ {}", e);
                continue;
            }
        };

        println!("[Semantic Router] → Phân loại: {}", pending.route());
        for (i, hit) in pending.hits().iter().enumerate() {
            match hit.rerank_score {
                Some(score) => println!("📄 {} | Score: {:.4} | {}", i + 1, score, hit.title),
                None => println!("📄 {} | {}", i + 1, hit.title),
            }
        }

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let printer = tokio::spawn(async move {
            print!("🤖 Trả lời: ");
            while let Some(token) = rx.recv().await {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            }
            println!();
        });

        let result = agent.complete_turn(&mut conversation, pending, Some(tx)).await;
        let _ = printer.await;

        match result {
            Ok(_) => println!("{}", "-".repeat(80)),
            Err(e) => eprintln!("⚠️ {}", e),
        }
    }

    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    tracing::info!("Starting sales assistant v{}", env!("CARGO_PKG_VERSION"));

    if settings.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let agent = SalesAgent::from_settings(&settings).await?;
    ingest_on_startup(&agent, &settings).await;

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState::new(settings, agent);
    let cleanup = state.sessions.start_cleanup_task();
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("sales_rag={level},tower_http=info").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    subscriber.with(fmt_layer).init();
}
