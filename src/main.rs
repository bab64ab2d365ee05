use std::process;
use std::sync::Arc;

use polizza::{
    application::admin::AdminService,
    application::error::AppError,
    application::loader::{SeedData, SeedLoader, demo_seed},
    application::mutations::MutationService,
    application::queries::QueryService,
    cache::{CacheConfig, CacheStore, InvalidationRouter, MemoryBackend, QueryCache},
    config,
    infra::{error::InfraError, memory::MemoryRepositories, telemetry},
    ranking::RankingIndex,
};
use serde::Serialize;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::CheckConfig => run_check_config(&settings),
        config::Command::PrintConfig => run_print_config(&settings),
        config::Command::Seed(args) => run_seed(&settings, args).await,
        config::Command::Query(args) => run_query(&settings, args).await,
        config::Command::Stats => run_stats(&settings).await,
        config::Command::Keys => run_keys(&settings).await,
        config::Command::Flush(args) => run_flush(&settings, args).await,
        config::Command::RebuildRanking => run_rebuild_ranking(&settings).await,
    }
}

/// Every command gets the full service stack over the in-memory
/// engine; state lives for one process invocation.
struct AppContext {
    queries: QueryService,
    mutations: MutationService,
    loader: SeedLoader,
    admin: AdminService,
}

fn build_application_context(settings: &config::Settings) -> AppContext {
    let repositories = Arc::new(MemoryRepositories::new());
    let cache_config = CacheConfig::from(&settings.cache);
    let backend = Arc::new(MemoryBackend::new(&cache_config));
    let store = Arc::new(CacheStore::new(backend, cache_config));
    let query_cache = Arc::new(QueryCache::new(store.clone()));
    let router = Arc::new(InvalidationRouter::new(store.clone()));
    let ranking = Arc::new(RankingIndex::new());

    AppContext {
        queries: QueryService::new(repositories.clone(), query_cache, ranking.clone()),
        mutations: MutationService::new(
            repositories.clone(),
            repositories.clone(),
            router,
            ranking.clone(),
        ),
        loader: SeedLoader::new(
            repositories.clone(),
            repositories,
            store.clone(),
            ranking,
        ),
        admin: AdminService::new(store),
    }
}

fn run_check_config(settings: &config::Settings) -> Result<(), AppError> {
    info!(
        cache_enabled = settings.cache.enabled,
        entry_limit = settings.cache.entry_limit,
        "Configuration resolved"
    );
    emit(&json!({ "status": "ok" }))
}

fn run_print_config(settings: &config::Settings) -> Result<(), AppError> {
    let format = match settings.logging.format {
        config::LogFormat::Json => "json",
        config::LogFormat::Compact => "compact",
    };
    emit(&json!({
        "cache": {
            "enabled": settings.cache.enabled,
            "entry_limit": settings.cache.entry_limit,
            "default_ttl_secs": settings.cache.default_ttl_secs,
        },
        "logging": {
            "level": settings.logging.level.to_string(),
            "format": format,
        },
    }))
}

async fn run_seed(settings: &config::Settings, args: config::SeedArgs) -> Result<(), AppError> {
    let seed = match args.file {
        Some(path) => {
            info!(path = %path.display(), "Loading seed file");
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|err| AppError::from(InfraError::Io(err)))?;
            serde_json::from_str::<SeedData>(&raw).map_err(|err| {
                AppError::validation(format!("invalid seed file {}: {err}", path.display()))
            })?
        }
        None => demo_seed(),
    };

    let app = build_application_context(settings);
    let report = app.loader.load(seed).await?;
    emit(&report)
}

async fn run_query(settings: &config::Settings, args: config::QueryArgs) -> Result<(), AppError> {
    let app = build_application_context(settings);
    let rows = run_catalogued_query(&app.queries, &args).await?;
    emit(&rows)
}

async fn run_catalogued_query(
    queries: &QueryService,
    args: &config::QueryArgs,
) -> Result<serde_json::Value, AppError> {
    match args.name.as_str() {
        "active_clients" => to_json(&queries.active_clients().await?),
        "open_claims" => to_json(&queries.open_claims().await?),
        "insured_vehicles" => to_json(&queries.insured_vehicles().await?),
        "clients_no_active_policies" => {
            to_json(&queries.clients_without_active_policies().await?)
        }
        "agent_policy_counts" => to_json(&queries.agent_policy_counts().await?),
        "expired_policies" => to_json(&queries.expired_policies().await?),
        "top_clients_coverage" => to_json(&queries.top_clients_by_coverage().await?),
        "accident_claims" => {
            let year = args
                .year
                .ok_or_else(|| AppError::validation("accident_claims requires --year"))?;
            to_json(&queries.accident_claims_in_year(year).await?)
        }
        "active_policies_sorted" => to_json(&queries.active_policies_sorted().await?),
        "suspended_policies" => to_json(&queries.suspended_policies().await?),
        "multi_vehicle_clients" => to_json(&queries.multi_vehicle_clients().await?),
        "agent_claim_counts" => to_json(&queries.agent_claim_counts().await?),
        other => Err(AppError::validation(format!("unknown query `{other}`"))),
    }
}

async fn run_stats(settings: &config::Settings) -> Result<(), AppError> {
    let app = build_application_context(settings);
    emit(&app.admin.stats().await)
}

async fn run_keys(settings: &config::Settings) -> Result<(), AppError> {
    let app = build_application_context(settings);
    emit(&app.admin.keys().await)
}

async fn run_flush(settings: &config::Settings, args: config::FlushArgs) -> Result<(), AppError> {
    let app = build_application_context(settings);
    let pattern = args.pattern.as_deref();
    let flushed = app.admin.flush(pattern).await;
    emit(&json!({
        "pattern": pattern.unwrap_or(polizza::cache::PATTERN_ALL),
        "flushed": flushed,
    }))
}

async fn run_rebuild_ranking(settings: &config::Settings) -> Result<(), AppError> {
    let app = build_application_context(settings);
    let entries = app.mutations.rebuild_ranking().await?;
    emit(&json!({ "ranking_entries": entries }))
}

fn to_json<T: Serialize>(rows: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(rows).map_err(|err| AppError::unexpected(err.to_string()))
}

/// Results go to stdout as JSON; diagnostics stay on the logging side.
fn emit<T: Serialize>(payload: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(payload)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}
