//! Contracts with the external data store: snapshot ingest, versioning,
//! write-back and asset addressing.

pub mod assets;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use assets::{AssetClass, StorageConfig, resolve};
pub use snapshot::{IngestReport, Rejection, Snapshot, SnapshotStore, SnapshotVersion};
pub use store::{InMemorySiteStore, SiteStore};

use foundation::SiteId;
use scene::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("site not found: {0}")]
    NotFound(SiteId),
    #[error("snapshot corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("overlay for {0} is not fully calibrated")]
    IncompleteOverlay(SiteId),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
