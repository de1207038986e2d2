pub mod cookie;
pub mod record;
pub mod request;

pub use cookie::CookieSet;
pub use record::{FieldValue, NormalizedRecord, TableSnapshot};
pub use request::{EndpointRequest, FetchOutcome};
