//! Async document-database client facade.
//!
//! mongobridge adapts a callback-driven document-database transport into a
//! uniform, future-returning async API: a connection opens a [`Db`], the
//! database resolves [`Collection`] facades, and queries stream through a
//! [`Cursor`]. Every public operation returns a single-resolution future
//! and never a raw callback.
//!
//! # Modules
//!
//! - `config`: Configuration management
//! - `connection`: Connection state shared by a facade chain
//! - `collection`: Collection command facade
//! - `cursor`: Streaming result sets
//! - `db`: Database facade
//! - `error`: Error types and handling
//! - `remote`: Single-resolution adapter over callback completions
//! - `transport`: Transport boundary and the in-memory backend
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bson::doc;
//! use mongobridge::{Config, Db, MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Db::open(
//!         Arc::new(MemoryTransport::new()),
//!         "app",
//!         &config.connection,
//!     )
//!     .await?;
//!
//!     let users = db.collection("users", None).await?;
//!     users.insert(vec![doc! { "name": "ada" }], None).await?;
//!
//!     let mut cursor = users.find(None).sort(doc! { "name": 1 })?;
//!     while let Some(user) = cursor.try_next().await? {
//!         println!("{user}");
//!     }
//!
//!     db.close(false).await?;
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod db;
pub mod error;
pub mod remote;
pub mod transport;

// Re-export commonly used types
pub use collection::{
    Collection, FindAndModifyOptions, MapReduceOptions, MapReduceOut, MapReduceOutput,
};
pub use config::{Config, ConnectionConfig, LoggingConfig};
pub use connection::ConnectionState;
pub use cursor::{Cursor, CursorState, QueryShape, ReadPreference};
pub use db::Db;
pub use error::{BridgeError, Result};
pub use remote::{Completion, RemoteOp, issue};
pub use transport::{Fetch, MemoryTransport, RemoteHandle, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
