// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::extractors::date_window::{MAX_DAYS, MIN_DAYS};
use crate::fetch::FetchOptions;
use crate::sites::aqi::AqiInput;
use crate::sites::psx::PsxInput;
use crate::utils::AppError;

const DEFAULT_DAYS: u32 = 30;
const DEFAULT_SYMBOL: &str = "SYS";
const DEFAULT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Command Line Interface for the page extraction scrapers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// JSON input file with the same options; command-line flags take precedence
    #[arg(short, long, global = true)]
    pub input: Option<PathBuf>,

    /// Output directory for extracted records
    #[arg(short, long, global = true, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Debug mode - attach a raw page excerpt and save annotated HTML snapshots
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Extra attempts for retryable fetch failures
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Route requests through this proxy (http, https or socks5 URL)
    #[arg(long, global = true)]
    pub proxy_url: Option<String>,

    /// Ignore all proxies, including those from the environment
    #[arg(long, global = true)]
    pub no_proxy: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Pages fetched at the same time
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Daily air-quality readings for a city over the last N days
    Aqi {
        /// City name, e.g. Lahore
        #[arg(long)]
        city: Option<String>,

        /// Province, adds a second candidate page
        #[arg(long)]
        province: Option<String>,

        /// Number of days to cover (1-90)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Company profiles from the stock-exchange data portal
    Psx {
        /// Ticker symbols, comma separated
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
}

/// Options accepted from an `--input` JSON document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputFile {
    pub city: Option<String>,
    pub province: Option<String>,
    pub days: Option<u32>,
    pub symbols: Option<Vec<String>>,
    pub debug: Option<bool>,
    #[serde(alias = "use_proxy", alias = "useApifyProxy")]
    pub use_proxy: Option<bool>,
    #[serde(alias = "proxy_url")]
    pub proxy_url: Option<String>,
    #[serde(alias = "max_retries", alias = "maxRequestRetries")]
    pub max_retries: Option<u32>,
    #[serde(alias = "timeout_secs")]
    pub timeout_secs: Option<u64>,
    #[serde(alias = "max_concurrency")]
    pub max_concurrency: Option<usize>,
}

impl InputFile {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Invalid input file {}: {}", path.display(), e)))
    }
}

#[derive(Debug, Clone)]
pub enum SiteSettings {
    Aqi(AqiInput),
    Psx(PsxInput),
}

/// Everything a run needs, resolved from CLI flags and the optional input file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteSettings,
    pub fetch: FetchOptions,
    pub output_dir: PathBuf,
    pub max_concurrency: usize,
    pub debug: bool,
}

pub fn clamp_days(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_DAYS).clamp(MIN_DAYS, MAX_DAYS)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Upper-cased, de-duplicated symbols in first-seen order; defaults to a single symbol.
pub fn normalize_symbols(symbols: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_SYMBOL.to_string());
    }
    out
}

impl Settings {
    pub fn from_args(args: Args) -> Result<Self, AppError> {
        let file = match &args.input {
            Some(path) => {
                tracing::info!("Reading input options from {}", path.display());
                InputFile::load(path)?
            }
            None => InputFile::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: Args, file: InputFile) -> Result<Self, AppError> {
        let debug = args.debug || file.debug.unwrap_or(false);

        let (site, default_retries) = match args.command {
            Command::Aqi { city, province, days } => {
                let city = non_empty(city.or(file.city)).ok_or_else(|| {
                    AppError::Config("Input must include a city (e.g. Lahore)".to_string())
                })?;
                let input = AqiInput {
                    city,
                    province: non_empty(province.or(file.province)),
                    days: clamp_days(days.or(file.days)),
                    debug,
                };
                (SiteSettings::Aqi(input), 1)
            }
            Command::Psx { symbols } => {
                let symbols = if symbols.is_empty() { file.symbols.unwrap_or_default() } else { symbols };
                let input = PsxInput { symbols: normalize_symbols(symbols), debug };
                (SiteSettings::Psx(input), 3)
            }
        };

        let fetch = FetchOptions {
            max_retries: args.max_retries.or(file.max_retries).unwrap_or(default_retries),
            timeout: Duration::from_secs(args.timeout_secs.or(file.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS)),
            use_proxy: !args.no_proxy && file.use_proxy.unwrap_or(true),
            proxy_url: non_empty(args.proxy_url.or(file.proxy_url)),
            ..FetchOptions::default()
        };

        let max_concurrency = args
            .max_concurrency
            .or(file.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1);

        Ok(Self { site, fetch, output_dir: args.output_dir, max_concurrency, debug })
    }
}
