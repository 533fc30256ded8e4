use anyhow::{bail, Context};
use basex_client::{Config, Query, Session, SessionBuilder};
use clap::Parser;
use futures::TryStreamExt;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "basex-query")]
#[command(about = "Run an XQuery against a BaseX server", long_about = None)]
struct Args {
    /// Query text
    query: String,

    /// Config file (defaults to ./basex.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Database to open before running the query
    #[arg(short, long)]
    database: Option<String>,

    /// Namespace declaration (e.g., --namespace amf=http://amf.openlib.org)
    #[arg(short, long = "namespace", value_parser = parse_pair)]
    namespaces: Vec<(String, String)>,

    /// External variable binding (e.g., --bind name=Sarah)
    #[arg(short, long = "bind", value_parser = parse_pair)]
    bindings: Vec<(String, String)>,

    /// Stream result items one per line instead of a single result
    #[arg(short, long)]
    iterate: bool,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "basex_client=info,basex_query=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(user) = args.user {
        config.user = user;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if args.database.is_some() {
        config.database = args.database;
    }

    let session = SessionBuilder::from_config(&config)
        .build()
        .await
        .with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;

    let outcome = run_query(
        &session,
        &args.query,
        args.namespaces,
        &args.bindings,
        args.iterate,
    )
    .await;
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close session: {}", e);
    }
    outcome
}

async fn run_query(
    session: &Session,
    text: &str,
    namespaces: Vec<(String, String)>,
    bindings: &[(String, String)],
    iterate: bool,
) -> anyhow::Result<()> {
    let mut query = session.query_with_namespaces(text, namespaces).await?;
    tracing::debug!("Query id {}", query.id());

    for (name, value) in bindings {
        query
            .bind(name, value)
            .await
            .with_context(|| format!("Failed to bind ${}", name))?;
    }

    let result = print_results(&query, iterate).await;

    if let Err(e) = query.close().await {
        if result.is_ok() {
            bail!("Failed to close query: {}", e);
        }
    }
    result
}

async fn print_results(query: &Query, iterate: bool) -> anyhow::Result<()> {
    if !iterate {
        println!("{}", query.execute().await?);
        return Ok(());
    }

    let mut items = query.iter().await?;
    let mut count = 0usize;
    while let Some(item) = items.try_next().await? {
        println!("{}", item);
        count += 1;
    }
    tracing::info!("{} items", count);
    Ok(())
}
