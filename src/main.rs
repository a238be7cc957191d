// src/main.rs
use std::sync::Arc;

use clap::Parser;
use field_scraper::config::{Args, Settings, SiteSettings};
use field_scraper::fetch::{FetchProvider, HttpFetcher};
use field_scraper::runner;
use field_scraper::sites::aqi::AqiSite;
use field_scraper::sites::psx::PsxSite;
use field_scraper::sites::Site;
use field_scraper::storage::StorageManager;
use field_scraper::utils::{self, AppError};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments and the optional input file
    let args = Args::parse();
    tracing::debug!("Parsed args: {:?}", args);
    let settings = Settings::from_args(args)?;
    tracing::info!("Starting with settings: {:?}", settings.site);

    // 3. Initialize storage (records and, in debug mode, page snapshots)
    let mut storage = StorageManager::new(&settings.output_dir)?;
    let snapshots = if settings.debug { Some(StorageManager::new(&settings.output_dir)?) } else { None };

    // 4. Build the site and its fetch provider
    let site: Arc<dyn Site> = match settings.site {
        SiteSettings::Aqi(input) => Arc::new(AqiSite::new(input)),
        SiteSettings::Psx(input) => Arc::new(PsxSite::new(input)?),
    };
    let provider: Arc<dyn FetchProvider> = Arc::new(HttpFetcher::new(settings.fetch)?);

    // 5. Fetch, extract, store
    let summary = runner::run(site, provider, &mut storage, settings.max_concurrency, snapshots.as_ref()).await?;

    if summary.succeeded == 0 && summary.failed > 0 {
        return Err(AppError::Processing(format!("Failed to scrape any of {} page(s)", summary.failed)));
    }

    Ok(())
}
