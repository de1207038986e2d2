// Public modules for library users
pub mod errors;
pub mod models;
pub mod session;
pub mod scrapers;
pub mod storage;
pub mod services;

// Kept public for the CLI binary
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod util;

// Re-export common types
pub use config::Config;
pub use errors::{DataHubError, FetchFailure, Result};
pub use models::{CookieSet, EndpointRequest, FetchOutcome, FieldValue, NormalizedRecord, TableSnapshot};
pub use scrapers::FetchOrchestrator;
pub use services::{ScrapeReport, ScrapeService};
pub use session::SessionManager;
pub use storage::TableSink;
