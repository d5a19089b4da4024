mod api;
mod config;
mod queries;
mod stats;
mod svg;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::ApiClient;
use config::Config;
use stats::{Filters, Stats};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(
        user = %config.username,
        exclude_repos = config.exclude_repos.len(),
        exclude_langs = config.exclude_langs.len(),
        consider_forked_repos = config.consider_forked_repos,
        "starting badge generation"
    );

    let api = ApiClient::new(config.access_token);
    let stats = Stats::new(
        config.username,
        api,
        Filters {
            exclude_repos: config.exclude_repos,
            exclude_langs: config.exclude_langs,
            consider_forked_repos: config.consider_forked_repos,
        },
    );

    // The two badges share one aggregator, so overlapping statistics are
    // fetched once.
    let (overview, languages) = tokio::try_join!(
        svg::generate_overview(&stats),
        svg::generate_languages(&stats),
    )?;
    svg::write_badge("overview.svg", &overview)?;
    svg::write_badge("languages.svg", &languages)?;

    info!("badge generation completed");
    info!("\n{}", stats.summary().await?);
    Ok(())
}
