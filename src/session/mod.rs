//! Session persistence and token renewal.

pub mod coordinator;
pub mod storage;
pub mod store;

pub use coordinator::RefreshCoordinator;
pub use storage::{FileStorage, KvStorage, MemoryStorage};
pub use store::{Session, SessionStore};
