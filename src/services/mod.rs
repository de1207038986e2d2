pub mod normalize;
pub mod scrape_service;

pub use scrape_service::{DatasetOutcome, DatasetReport, EndpointFailure, ScrapeReport, ScrapeService};
