pub mod models;
pub mod queries;
pub mod store;

pub use sqlx::types::Json;
pub use store::{MemoryStore, PgStore, Settlement, Store, StoreError, StoreResult};
