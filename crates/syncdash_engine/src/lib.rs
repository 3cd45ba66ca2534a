//! Syncdash engine: REST client, shared store and effect execution.
mod client;
mod dashboard;
mod persist;
mod poller;
mod store;
mod types;
mod wire;

pub use client::{ClientSettings, ReqwestSyncApi, SyncApi};
pub use dashboard::{Dashboard, DashboardSettings};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use store::{
    ContextId, ForeignChange, ForeignChanges, MemorySharedStore, SharedStore, StoreChange,
    StoreHandle,
};
pub use types::{ApiError, ApiErrorKind, DashboardEvent, StatsSnapshot};
