use nse_datahub::config::{Config, EnvSource, LayeredSource, StorageBackend, TomlSource};
use nse_datahub::scrapers::datasets::{dataset_names, find_dataset, Dataset};
use nse_datahub::services::scrape_service::build_session;
use nse_datahub::services::{DatasetOutcome, ScrapeService};
use nse_datahub::session::{CookieStore, FileCookieStore};
use nse_datahub::storage::open_sink;
use nse_datahub::util::is_market_open;
use nse_datahub::FieldValue;

use anyhow::{anyhow, Context};
use chrono::{TimeZone, Utc};
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info, warn};
use std::path::Path;

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut source = LayeredSource::new().with_layer(Box::new(EnvSource::new()));
    if let Some(path) = matches.value_of("config") {
        let toml = TomlSource::load(Path::new(path)).with_context(|| format!("reading config file {}", path))?;
        source = source.with_layer(Box::new(toml));
    }

    let mut config = Config::from_source(&source)?;

    if let Some(storage) = matches.value_of("storage") {
        config = config.with_storage(storage.parse::<StorageBackend>()?);
    }
    if let Some(dir) = matches.value_of("data-dir") {
        config = config.with_data_dir(dir);
    }
    if matches.is_present("headed") {
        config = config.with_headless(false);
    }
    Ok(config)
}

fn selected_datasets(matches: &ArgMatches) -> anyhow::Result<Vec<&'static Dataset>> {
    let names: Vec<&str> = matches.values_of("dataset").map(|v| v.collect()).unwrap_or_default();
    if names.is_empty() || names.contains(&"all") {
        return Ok(nse_datahub::scrapers::DATASETS.iter().collect());
    }

    names
        .into_iter()
        .map(|name| {
            find_dataset(name).ok_or_else(|| {
                anyhow!("Unknown dataset: {} (known: {})", name, dataset_names().join(", "))
            })
        })
        .collect()
}

async fn run_scrape(config: Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let datasets = selected_datasets(matches)?;

    if !is_market_open(Utc::now()) {
        warn!("Market is closed; the exchange may serve stale or empty data");
    }

    let service = ScrapeService::from_config(config)?;
    let report = service.scrape(&datasets).await?;

    if report.session_refreshed {
        info!("Session was refreshed after the origin rejected the first batch");
    }
    for dataset in &report.datasets {
        match &dataset.outcome {
            DatasetOutcome::Committed(count) => {
                info!("{:<22} committed {} rows to {}", dataset.dataset, count, dataset.table)
            }
            DatasetOutcome::NoRecords => info!("{:<22} no records", dataset.dataset),
            DatasetOutcome::Failed => error!("{:<22} failed", dataset.dataset),
            DatasetOutcome::PersistFailed { error, records } => {
                error!("{:<22} could not store {} rows: {}", dataset.dataset, records.len(), error)
            }
        }
        for failure in &dataset.failures {
            warn!("  {} -> {}", failure.key, failure.reason);
        }
    }
    info!("Committed {} rows in total", report.committed_rows());

    if report.is_complete() {
        Ok(())
    } else {
        Err(anyhow!("{} endpoint(s) failed", report.failures().count()))
    }
}

async fn run_cookies(config: Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let store = FileCookieStore::new(&config.cookie_file);

    if matches.is_present("clear") {
        store.clear().await?;
        return Ok(());
    }

    if matches.is_present("refresh") {
        let session = build_session(&config)?;
        let cookies = match store.load().await? {
            Some(current) => session.refresh_after_rejection(&current).await?,
            None => session.get_valid_cookies().await?,
        };
        info!("Session ready with {} cookies", cookies.len());
        return Ok(());
    }

    if matches.is_present("validate") {
        let session = build_session(&config)?;
        let cookies = session.get_valid_cookies().await?;
        info!("Session valid with {} cookies", cookies.len());
        return Ok(());
    }

    match store.load().await? {
        Some(cookies) => {
            let expires = Utc
                .timestamp_opt(cookies.expires_at(), 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cookies.expires_at().to_string());
            info!("Cookie cache: {}", store.path().display());
            let status = if cookies.is_expired() { " (expired)" } else { "" };
            info!(
                "Acquired at {}, expires at {}{}",
                cookies.acquired_at().to_rfc3339(),
                expires,
                status
            );
            for (name, _) in cookies.iter() {
                info!("  {}", name);
            }
            let missing = cookies.missing(&config.required_cookies);
            if !missing.is_empty() {
                warn!("Missing required cookies: {}", missing.join(", "));
            }
        }
        None => info!("No cookies cached at {}", store.path().display()),
    }
    Ok(())
}

fn parse_limit(value: &str) -> anyhow::Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("--limit expects a row count, got {:?}", value))
}

fn run_explore(config: Config, matches: &ArgMatches) -> anyhow::Result<()> {
    let sink = open_sink(&config)?;
    let limit = parse_limit(matches.value_of("limit").unwrap_or("10"))?;

    let Some(table) = matches.value_of("table") else {
        let tables = sink.list_tables()?;
        info!("Found {} tables", tables.len());
        for table in tables {
            info!("  {}", table);
        }
        return Ok(());
    };

    let snapshot = sink
        .read_table(table)?
        .ok_or_else(|| anyhow!("Table {} has not been written yet", table))?;
    info!("{}: {} rows captured at {}", snapshot.table_name, snapshot.len(), snapshot.captured_at);

    let columns = snapshot.columns();
    info!("{}", columns.join(" | "));
    info!("{:-<60}", "");
    for record in snapshot.records.iter().take(limit) {
        let row: Vec<String> = record
            .iter()
            .map(|(_, value)| match value {
                FieldValue::Text(s) => s.clone(),
                FieldValue::Number(n) => format!("{:.2}", n),
                FieldValue::Null => "-".to_string(),
            })
            .collect();
        info!("{}", row.join(" | "));
    }
    if snapshot.len() > limit {
        info!("... and {} more rows", snapshot.len() - limit);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let app = App::new("NSE DataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Session-aware scraper for NSE market data")
        .arg(
            Arg::with_name("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML config file ([nse], [scraping], [browser], [storage])")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("storage")
                .long("storage")
                .value_name("BACKEND")
                .help("Storage backend (arrow, sqlite)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory for Arrow table files")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("headed")
                .long("headed")
                .help("Show the browser window during cookie acquisition")
                .takes_value(false)
                .global(true),
        );

    let app = app
        .subcommand(
            SubCommand::with_name("scrape")
                .about("Scrape datasets and replace their tables")
                .arg(
                    Arg::with_name("dataset")
                        .short('d')
                        .long("dataset")
                        .value_name("DATASET")
                        .help("Dataset to scrape, repeatable (default: all)")
                        .takes_value(true)
                        .multiple_occurrences(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("cookies")
                .about("Inspect or manage the session cookie cache")
                .arg(Arg::with_name("refresh").long("refresh").help("Acquire a fresh cookie set"))
                .arg(Arg::with_name("validate").long("validate").help("Probe the cached cookies, refreshing if needed"))
                .arg(Arg::with_name("clear").long("clear").help("Delete the cookie cache")),
        )
        .subcommand(
            SubCommand::with_name("explore")
                .about("Explore stored tables")
                .arg(
                    Arg::with_name("table")
                        .short('t')
                        .long("table")
                        .value_name("TABLE")
                        .help("Table to show (lists tables when omitted)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("limit")
                        .short('l')
                        .long("limit")
                        .value_name("LIMIT")
                        .help("Limit the number of rows to display")
                        .takes_value(true)
                        .default_value("10"),
                ),
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("scrape", sub)) => run_scrape(load_config(sub)?, sub).await,
        Some(("cookies", sub)) => run_cookies(load_config(sub)?, sub).await,
        Some(("explore", sub)) => run_explore(load_config(sub)?, sub),
        _ => {
            info!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_must_be_a_row_count() {
        assert_eq!(parse_limit("25").unwrap(), 25);
        assert_eq!(parse_limit(" 3 ").unwrap(), 3);

        for bad in ["ten", "-1", ""] {
            let err = parse_limit(bad).unwrap_err();
            assert!(err.to_string().contains("--limit expects a row count"), "{}", err);
        }
    }
}
