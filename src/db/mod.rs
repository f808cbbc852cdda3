//! SQLite persistence layer.
//!
//! [`store`] owns the connection pool, schema migration, and read paths;
//! [`writer`] adds the transactional batch upsert and retry machinery.

pub mod store;
pub mod writer;

pub use store::Store;
pub use writer::{RetryPolicy, WriteResult};
