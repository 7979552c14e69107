use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use sa_board_client::{BoardClient, BoardCredentials};
use sa_domain::config::{Config, ConfigSeverity};
use sa_pipeline::PipelineDeps;
use sa_scheduler::SchedulerCore;
use sa_store::{ApplicationStore, ProcessedVacancyCache, RunStore, SettingsStore, TokenStore};
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};

use sa_gateway::api;
use sa_gateway::cli::{self, Cli, Command, ConfigCommand};
use sa_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Command::Doctor => {
            let (config, path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, path) = cli::load_config()?;
            if !cli::config::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Command::Version => {
            println!("autoapply {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let issues = config.validate();
    let hard_errors: Vec<_> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .collect();
    if !hard_errors.is_empty() {
        for issue in &hard_errors {
            tracing::error!(%issue, "config error");
        }
        anyhow::bail!("refusing to start with {} config error(s)", hard_errors.len());
    }
    for issue in issues.iter().filter(|i| i.severity == ConfigSeverity::Warning) {
        tracing::warn!(%issue, "config warning");
    }

    std::fs::create_dir_all(&config.store.path)
        .with_context(|| format!("creating store directory {}", config.store.path.display()))?;

    let settings = Arc::new(SettingsStore::new(&config.store.path));
    let runs = Arc::new(RunStore::new(&config.store.path));
    let applications = Arc::new(ApplicationStore::new(&config.store.path));
    let cache = Arc::new(ProcessedVacancyCache::new(
        &config.store.path,
        config.cache.processed_vacancy_ttl_days,
    ));
    let token_store = Arc::new(TokenStore::new(&config.store.path));

    let credentials = BoardCredentials::from_env().context("reading board OAuth credentials")?;
    let board = Arc::new(BoardClient::new(config.board.clone(), credentials, token_store)?);
    tracing::info!(base_url = %config.board.base_url, "board client ready");

    let llm = sa_llm::build_provider(&config.llm);
    tracing::info!(provider = llm.provider_id(), "llm provider ready");

    let pipeline_deps = PipelineDeps {
        board: board.clone(),
        llm: llm.clone(),
        applications: applications.clone(),
        cache: cache.clone(),
        runs: runs.clone(),
        board_domain: "hh.ru".to_string(),
    };

    let scheduler = Arc::new(SchedulerCore::new(
        config.scheduler.clone(),
        settings.clone(),
        runs.clone(),
        pipeline_deps,
    ));
    if config.scheduler.auto_start {
        scheduler.start().await?;
        tracing::info!("scheduler started");
    }

    spawn_tick_loop(scheduler.clone(), config.scheduler.tick_interval_secs);
    spawn_cache_sweep_loop(cache.clone());

    let api_token_hash = std::env::var("AUTOAPPLY_API_TOKEN")
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| Sha256::digest(v.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!("AUTOAPPLY_API_TOKEN not set, API running without authentication");
    }

    let state = AppState {
        config: config.clone(),
        scheduler,
        settings,
        runs,
        applications,
        cache,
        board,
        llm,
        api_token_hash,
    };

    let cors = build_cors_layer(&config.server.cors.allowed_origins);
    let app = api::router(state.clone()).layer(cors).with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_tick_loop(scheduler: Arc<SchedulerCore>, tick_interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_interval_secs.max(1)));
        loop {
            interval.tick().await;
            scheduler.tick().await;
        }
    });
}

fn spawn_cache_sweep_loop(cache: Arc<ProcessedVacancyCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let removed = cache.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "swept expired processed-vacancy cache entries");
            }
        }
    });
}

/// Builds a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `:*` wildcard for the port segment (e.g.
/// `http://localhost:*`), expanded into a predicate matching any port on
/// that host. A literal `"*"` allows all origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\", all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
