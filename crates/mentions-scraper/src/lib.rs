pub mod catalog;
pub mod directory;
pub mod error;
pub mod live;
pub mod resolve;
mod retry;

pub use catalog::{CatalogClient, CATALOG_BATCH_SIZE};
pub use directory::{DirectoryAdapter, DirectoryClient, DirectoryClientOptions, PageKind, PageSink};
pub use error::{ClientError, ScraperError};
pub use live::{ClientConnector, ExtractionMode, LiveAdapter, MessagingClient};
pub use resolve::{LinkResolver, MentionResolver, RedirectResolver};
