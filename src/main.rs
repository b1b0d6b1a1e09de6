use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod config;
mod semantic;
mod web;
use config::Config;
use semantic::SemanticSearchService;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout is reserved for search output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the catalog and make the service searchable, rebuilding the cache if needed.
fn build_service(config: &Config) -> anyhow::Result<Arc<SemanticSearchService>> {
    let (_, records) = catalog::load(&config.multivector_path(), config.cards_path().as_deref())?;

    let service = SemanticSearchService::new(
        config.semantic_search.clone(),
        config.search.clone(),
        config.cache_dir(),
    );
    let model = service.load_model()?;
    service.initialize(records, Box::new(model))?;

    Ok(Arc::new(service))
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let config = Config::load()?;
    log::debug!("base path: {}", config.base_path().display());

    match args.command {
        cli::Command::Serve { bind } => {
            let service = build_service(&config)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            web::start_daemon(service, &bind)?;
        }

        cli::Command::Search { query, top_k } => {
            let service = build_service(&config)?;
            let results = service.search(query.trim(), top_k)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        cli::Command::Rebuild {} => {
            let cache = semantic::cache::EmbeddingCache::new(&config.cache_dir());
            log::info!("clearing cache at {}", cache.dir().display());
            cache.clear()?;

            let service = build_service(&config)?;
            println!(
                "{} catalog rows indexed with '{}'",
                service.indexed_count(),
                service.model_name().unwrap_or_default()
            );
        }
    }

    Ok(())
}
