use crate::config::Config;
use crate::errors::{FetchFailure, Result};
use crate::models::{FetchOutcome, NormalizedRecord};
use crate::scrapers::datasets::{Dataset, PlannedRequest, DATASETS};
use crate::scrapers::fetcher::FetchOrchestrator;
use crate::scrapers::headers::HeaderTemplate;
use crate::scrapers::transport::{build_client, HttpTransport};
use crate::services::normalize::normalize_dataset;
use crate::session::{ChromeCookieAcquirer, FileCookieStore, HttpCookieValidator, SessionManager};
use crate::storage::{open_sink, TableSink};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

/// An endpoint that produced no usable rows, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointFailure {
    pub key: String,
    pub reason: FetchFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOutcome {
    /// The table was replaced with this many rows.
    Committed(usize),
    /// Every fetch succeeded but yielded no rows; the table is untouched.
    NoRecords,
    /// No endpoint of the dataset succeeded; the table is untouched.
    Failed,
    /// The sink refused the batch. The records are kept for a retry.
    PersistFailed {
        error: String,
        records: Vec<NormalizedRecord>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub dataset: &'static str,
    pub table: &'static str,
    pub outcome: DatasetOutcome,
    pub failures: Vec<EndpointFailure>,
}

/// What one scrape call did, per dataset.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub started_at: DateTime<Utc>,
    pub session_refreshed: bool,
    pub datasets: Vec<DatasetReport>,
}

impl ScrapeReport {
    pub fn committed_rows(&self) -> usize {
        self.datasets
            .iter()
            .map(|d| match d.outcome {
                DatasetOutcome::Committed(n) => n,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EndpointFailure> {
        self.datasets.iter().flat_map(|d| d.failures.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.datasets.iter().all(|d| {
            d.failures.is_empty() && matches!(d.outcome, DatasetOutcome::Committed(_) | DatasetOutcome::NoRecords)
        })
    }
}

/// Session, fetch, normalize and replace, for a set of datasets.
pub struct ScrapeService {
    config: Config,
    session: Arc<SessionManager>,
    fetcher: FetchOrchestrator,
    headers: HeaderTemplate,
    sink: Arc<dyn TableSink>,
}

impl ScrapeService {
    pub fn new(
        config: Config,
        session: Arc<SessionManager>,
        fetcher: FetchOrchestrator,
        headers: HeaderTemplate,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        Self {
            config,
            session,
            fetcher,
            headers,
            sink,
        }
    }

    /// Wire up the production collaborators: file cookie cache, Chrome acquirer,
    /// HTTP probe and transport sharing one client, and the configured sink.
    pub fn from_config(config: Config) -> Result<Self> {
        let session = Arc::new(build_session(&config)?);
        let client = build_client(&config)?;
        let fetcher = FetchOrchestrator::new(Arc::new(HttpTransport::new(client)), config.max_concurrency);
        let headers = HeaderTemplate::new(&config.base_url, &config.user_agent)?;
        let sink = open_sink(&config)?;
        Ok(Self::new(config, session, fetcher, headers, sink))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn sink(&self) -> &Arc<dyn TableSink> {
        &self.sink
    }

    pub async fn scrape_all(&self) -> Result<ScrapeReport> {
        let datasets: Vec<&'static Dataset> = DATASETS.iter().collect();
        self.scrape(&datasets).await
    }

    /// Scrape `datasets` with one validated session.
    ///
    /// Fails only when no session can be established; endpoint and sink
    /// failures are reported per dataset.
    pub async fn scrape(&self, datasets: &[&'static Dataset]) -> Result<ScrapeReport> {
        let started_at = Utc::now();
        let mut cookies = self.session.get_valid_cookies().await?;

        let mut planned: Vec<(usize, PlannedRequest)> = Vec::new();
        for (idx, dataset) in datasets.iter().enumerate() {
            for request in dataset.plan(&self.config, &self.headers)? {
                planned.push((idx, request));
            }
        }
        let requests: Vec<_> = planned.iter().map(|(_, p)| p.request.clone()).collect();
        info!("Scraping {} datasets over {} requests", datasets.len(), requests.len());

        let mut outcomes = self.fetcher.fetch_many(&requests, cookies.clone()).await;
        let mut session_refreshed = false;

        if is_rejected_batch(&outcomes) {
            cookies = self.session.refresh_after_rejection(&cookies).await?;
            session_refreshed = true;
            outcomes = self.fetcher.fetch_many(&requests, cookies.clone()).await;
        }

        let mut reports = Vec::with_capacity(datasets.len());
        for (idx, &dataset) in datasets.iter().enumerate() {
            let results = planned
                .iter()
                .zip(&outcomes)
                .filter(|((owner, _), _)| *owner == idx)
                .map(|((_, request), outcome)| (request, outcome));
            reports.push(self.commit_dataset(dataset, results));
        }

        Ok(ScrapeReport {
            started_at,
            session_refreshed,
            datasets: reports,
        })
    }

    fn commit_dataset<'a>(
        &self,
        dataset: &'static Dataset,
        results: impl Iterator<Item = (&'a PlannedRequest, &'a FetchOutcome)>,
    ) -> DatasetReport {
        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut successes = 0;

        for (planned, outcome) in results {
            let key = planned.request.key.clone();
            match outcome {
                FetchOutcome::Success(payload) => {
                    match normalize_dataset(dataset, payload, planned.index_name.as_deref()) {
                        Ok(rows) => {
                            successes += 1;
                            records.extend(rows);
                        }
                        Err(e) => {
                            warn!("Could not normalize {}: {}", key, e);
                            failures.push(EndpointFailure {
                                key,
                                reason: FetchFailure::MalformedBody(e.to_string()),
                            });
                        }
                    }
                }
                FetchOutcome::Failure(reason) => failures.push(EndpointFailure {
                    key,
                    reason: reason.clone(),
                }),
            }
        }

        let outcome = if successes == 0 && !failures.is_empty() {
            warn!("Dataset {} failed on every endpoint", dataset.name);
            DatasetOutcome::Failed
        } else if records.is_empty() {
            info!("Dataset {} returned no records", dataset.name);
            DatasetOutcome::NoRecords
        } else {
            match self.sink.replace_table(dataset.table, &records) {
                Ok(count) => DatasetOutcome::Committed(count),
                Err(e) => {
                    error!("Failed to store {}: {}", dataset.table, e);
                    DatasetOutcome::PersistFailed {
                        error: e.to_string(),
                        records,
                    }
                }
            }
        };

        DatasetReport {
            dataset: dataset.name,
            table: dataset.table,
            outcome,
            failures,
        }
    }
}

/// Every endpoint answered, and every answer was a session refusal.
fn is_rejected_batch(outcomes: &[FetchOutcome]) -> bool {
    !outcomes.is_empty()
        && outcomes
            .iter()
            .all(|o| o.failure().map_or(false, FetchFailure::is_rejection))
}

/// Session manager over the file cache, Chrome acquirer and HTTP probe.
pub fn build_session(config: &Config) -> Result<SessionManager> {
    let store = Arc::new(FileCookieStore::new(&config.cookie_file));
    let acquirer = Arc::new(ChromeCookieAcquirer::from_config(config));
    let validator = Arc::new(HttpCookieValidator::new(
        build_client(config)?,
        &config.probe_url(),
        &config.cookie_trigger_url,
        config.probe_timeout,
        &HeaderTemplate::new(&config.base_url, &config.user_agent)?,
    ));
    Ok(SessionManager::new(store, acquirer, validator))
}
