pub mod datasets;
pub mod fetcher;
pub mod headers;
pub mod transport;

pub use datasets::{find_dataset, Dataset, DATASETS};
pub use fetcher::FetchOrchestrator;
pub use headers::HeaderTemplate;
pub use transport::{HttpTransport, Transport};
