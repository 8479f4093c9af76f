//! Database facade.
//!
//! A [`Db`] owns the logical database handle and the collection namespace.
//! It is obtained from [`Db::open`], which establishes the connection and
//! resolves only once the connection is live; there is no half-usable
//! facade. Database-level administration goes through the same single-shot
//! adapter path as collection commands.

use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::info;

use crate::collection::Collection;
use crate::config::ConnectionConfig;
use crate::connection::{ConnectionState, Session};
use crate::error::{ConnectionError, Result};
use crate::remote;
use crate::transport::Transport;

/// Facade over one logical database on one live connection.
pub struct Db {
    session: Arc<Session>,
    name: String,
}

impl Db {
    /// Open a connection to the named database.
    ///
    /// Resolves with a live facade, or fails with a connection error; no
    /// facade exists until the connection is established.
    pub async fn open(
        transport: Arc<dyn Transport>,
        name: impl Into<String>,
        config: &ConnectionConfig,
    ) -> Result<Db> {
        let name = name.into();
        if config.address.is_empty() {
            return Err(ConnectionError::InvalidAddress(String::new()).into());
        }
        let handle = remote::issue(|done| {
            transport.open_connection(&config.address, &name, config, done)
        })
        .await?;
        info!("connected to '{}' at {}", name, config.address);
        Ok(Db {
            session: Arc::new(Session::new(transport, handle)),
            name,
        })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// True once [`Db::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// One single-shot command against the database handle.
    async fn command_named(
        &self,
        name: &str,
        args: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.session
            .command(self.session.connection(), name, args, options.unwrap_or_default())
            .await
    }

    /* --------------------------- collections --------------------------- */

    /// Resolve a facade for the named collection.
    ///
    /// Does not create the collection server-side.
    pub async fn collection(&self, name: &str, options: Option<Document>) -> Result<Collection> {
        let handle = self
            .session
            .collection_handle(name, options.unwrap_or_default())
            .await?;
        Ok(Collection::new(
            Arc::clone(&self.session),
            handle,
            name.to_string(),
        ))
    }

    /// Names of the collections in this database.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let reply = self
            .command_named("listCollections", Document::new(), None)
            .await?;
        Ok(match reply.get("names") {
            Some(Bson::Array(values)) => values
                .iter()
                .filter_map(|value| match value {
                    Bson::String(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Create a collection server-side.
    pub async fn create_collection(
        &self,
        name: &str,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named("createCollection", doc! { "name": name }, options)
            .await
    }

    /// Drop a collection, removing it permanently.
    pub async fn drop_collection(&self, name: &str) -> Result<Document> {
        self.command_named("dropCollection", doc! { "name": name }, None)
            .await
    }

    /// Rename a collection within this database.
    pub async fn rename_collection(
        &self,
        from: &str,
        to: &str,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named("renameCollection", doc! { "from": from, "to": to }, options)
            .await
    }

    /* -------------------------- administration ------------------------- */

    /// Drop the whole database.
    pub async fn drop_database(&self) -> Result<Document> {
        info!("dropping database '{}'", self.name);
        self.command_named("dropDatabase", Document::new(), None)
            .await
    }

    /// Database statistics.
    pub async fn stats(&self) -> Result<Document> {
        self.command_named("dbStats", Document::new(), None).await
    }

    /// Execute an arbitrary command document against the database.
    pub async fn command(
        &self,
        command: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named("command", command, options).await
    }

    /* ---------------------- index passthroughs ------------------------ */

    /// Create an index on the named collection.
    pub async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named(
            "createIndex",
            doc! { "collection": collection, "keys": keys },
            options,
        )
        .await
    }

    /// Ensure an index exists on the named collection.
    pub async fn ensure_index(
        &self,
        collection: &str,
        keys: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named(
            "ensureIndex",
            doc! { "collection": collection, "keys": keys },
            options,
        )
        .await
    }

    /// Drop an index from the named collection.
    pub async fn drop_index(&self, collection: &str, name: &str) -> Result<Document> {
        self.command_named(
            "dropIndex",
            doc! { "collection": collection, "name": name },
            None,
        )
        .await
    }

    /// Index metadata for the named collection.
    pub async fn index_information(
        &self,
        collection: &str,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command_named(
            "indexInformation",
            doc! { "collection": collection },
            options,
        )
        .await
    }

    /// Rebuild all indexes on the named collection.
    pub async fn re_index(&self, collection: &str) -> Result<Document> {
        self.command_named("reIndex", doc! { "collection": collection }, None)
            .await
    }

    /* ------------------------------ close ------------------------------ */

    /// Release the connection.
    ///
    /// Afterwards every operation on this facade, and on any facade derived
    /// from it, fails with a connection-closed error. In-flight operations
    /// are failed rather than left hanging. Closing twice trivially
    /// succeeds.
    pub async fn close(&self, force: bool) -> Result<()> {
        info!("closing database '{}'", self.name);
        self.session.close(force).await
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::transport::MemoryTransport;

    async fn open_db() -> Db {
        let transport = Arc::new(MemoryTransport::new());
        Db::open(transport, "testdb", &ConnectionConfig::default())
            .await
            .expect("open")
    }

    fn transport_code(err: BridgeError) -> i32 {
        match err {
            BridgeError::Transport(e) => e.code.unwrap_or(0),
            other => panic!("expected a transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_fails_with_a_connection_error_on_bad_address() {
        let transport = Arc::new(MemoryTransport::new());
        let config = ConnectionConfig {
            address: "tcp://nope".to_string(),
            ..ConnectionConfig::default()
        };
        let err = Db::open(transport, "testdb", &config).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
    }

    #[tokio::test]
    async fn open_rejects_an_empty_address() {
        let transport = Arc::new(MemoryTransport::new());
        let config = ConnectionConfig {
            address: String::new(),
            ..ConnectionConfig::default()
        };
        let err = Db::open(transport, "testdb", &config).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
    }

    #[tokio::test]
    async fn collection_names_reflect_created_collections() {
        let db = open_db().await;
        assert!(db.collection_names().await.unwrap().is_empty());

        db.create_collection("alpha", None).await.unwrap();
        db.create_collection("beta", None).await.unwrap();

        let names = db.collection_names().await.unwrap();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn resolving_a_collection_does_not_create_it() {
        let db = open_db().await;
        let coll = db.collection("lazy", None).await.unwrap();
        assert!(db.collection_names().await.unwrap().is_empty());

        // The first write materializes it.
        coll.insert(vec![bson::doc! { "a": 1 }], None).await.unwrap();
        assert_eq!(db.collection_names().await.unwrap(), vec!["lazy".to_string()]);
    }

    #[tokio::test]
    async fn create_collection_twice_is_a_namespace_clash() {
        let db = open_db().await;
        db.create_collection("dup", None).await.unwrap();
        let err = db.create_collection("dup", None).await.unwrap_err();
        assert_eq!(transport_code(err), 48);
    }

    #[tokio::test]
    async fn drop_collection_on_a_missing_namespace_fails() {
        let db = open_db().await;
        let err = db.drop_collection("missing").await.unwrap_err();
        assert_eq!(transport_code(err), 26);
    }

    #[tokio::test]
    async fn rename_collection_moves_documents() {
        let db = open_db().await;
        let coll = db.collection("before", None).await.unwrap();
        coll.insert(vec![bson::doc! { "a": 1 }], None).await.unwrap();

        db.rename_collection("before", "after", None).await.unwrap();

        let renamed = db.collection("after", None).await.unwrap();
        assert_eq!(renamed.count(None, None).await.unwrap(), 1);
        assert_eq!(db.collection_names().await.unwrap(), vec!["after".to_string()]);
    }

    #[tokio::test]
    async fn drop_database_removes_every_collection() {
        let db = open_db().await;
        db.create_collection("one", None).await.unwrap();
        db.create_collection("two", None).await.unwrap();

        db.drop_database().await.unwrap();
        assert!(db.collection_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_summarize_the_database() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![bson::doc! { "a": 1 }, bson::doc! { "a": 2 }], None)
            .await
            .unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.get_str("db").unwrap(), "testdb");
        assert_eq!(stats.get_i64("collections").unwrap(), 1);
        assert_eq!(stats.get_i64("objects").unwrap(), 2);
    }

    #[tokio::test]
    async fn generic_command_round_trips() {
        let db = open_db().await;
        let reply = db.command(doc! { "ping": 1 }, None).await.unwrap();
        assert_eq!(reply.get_i32("ok").unwrap(), 1);

        let err = db.command(doc! { "unknownCmd": 1 }, None).await.unwrap_err();
        assert_eq!(transport_code(err), 59);
    }

    #[tokio::test]
    async fn database_level_index_passthroughs() {
        let db = open_db().await;
        let created = db
            .create_index("users", doc! { "age": 1 }, None)
            .await
            .unwrap();
        assert_eq!(created.get_str("name").unwrap(), "age_1");

        db.ensure_index("users", doc! { "age": 1 }, None).await.unwrap();

        let info = db.index_information("users", None).await.unwrap();
        assert_eq!(info.get_array("indexes").unwrap().len(), 1);

        db.re_index("users").await.unwrap();
        db.drop_index("users", "age_1").await.unwrap();
    }

    #[tokio::test]
    async fn close_makes_every_derived_facade_fail() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![bson::doc! { "a": 1 }], None).await.unwrap();
        let mut cursor = coll.find(None);

        db.close(false).await.unwrap();
        assert!(db.is_closed());
        assert_eq!(db.state(), ConnectionState::Closed);

        assert!(db.stats().await.unwrap_err().is_connection_closed());
        assert!(
            db.collection("other", None)
                .await
                .unwrap_err()
                .is_connection_closed()
        );
        assert!(
            coll.insert(vec![bson::doc! { "a": 2 }], None)
                .await
                .unwrap_err()
                .is_connection_closed()
        );
        // A cursor that never started cannot start anymore.
        assert!(cursor.try_next().await.unwrap_err().is_connection_closed());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let db = open_db().await;
        db.close(false).await.unwrap();
        db.close(true).await.unwrap();
        assert!(db.is_closed());
    }
}
