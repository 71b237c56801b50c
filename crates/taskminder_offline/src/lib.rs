pub mod dir_storage;
pub mod http;
pub mod network;
pub mod storage;
pub mod worker;

pub use crate::dir_storage::DirCacheStorage;
pub use crate::http::{Request, Response, ResponseKind};
pub use crate::network::{FetchError, HttpNetwork, Network};
pub use crate::storage::{Cache, CacheError, CacheStorage, MemoryCacheStorage};
pub use crate::worker::{CacheWorker, CacheWorkerBuilder, Clients, FetchDecision, WorkerState};
