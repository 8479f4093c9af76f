//! Collection command facade.
//!
//! A [`Collection`] wraps one named collection's remote handle. Every
//! non-streaming operation is a thin single-shot adapter call: exactly one
//! remote invocation, resolving with the server's result or failing with
//! the server's error, with no local interpretation of the payload. The
//! one special case is [`Collection::map_reduce`], which resolves with raw
//! documents for inline output and with a new facade for collection
//! output. `find` performs no I/O and hands back a [`Cursor`].

use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::debug;

use crate::connection::Session;
use crate::cursor::{Cursor, QueryShape};
use crate::error::Result;
use crate::transport::RemoteHandle;

/// Options for [`Collection::find_and_modify`].
#[derive(Debug, Clone, Default)]
pub struct FindAndModifyOptions {
    /// Insert the document when no match exists.
    pub upsert: bool,

    /// Return the document as it is after the mutation, not before.
    pub return_new: bool,

    /// Order used to pick among multiple matches.
    pub sort: Option<Document>,

    /// Field projection applied to the returned document.
    pub projection: Option<Document>,

    /// Advisory server-side time bound in milliseconds.
    pub max_time_ms: Option<u64>,
}

/// Destination of a map-reduce job's output.
#[derive(Debug, Clone)]
pub enum MapReduceOut {
    /// Return the reduced documents directly.
    Inline,

    /// Materialize the output into the named collection.
    Collection(String),
}

/// Options for [`Collection::map_reduce`].
#[derive(Debug, Clone)]
pub struct MapReduceOptions {
    /// Where the job writes its output.
    pub out: MapReduceOut,

    /// Filter applied before the map phase.
    pub query: Option<Document>,
}

impl Default for MapReduceOptions {
    fn default() -> Self {
        Self {
            out: MapReduceOut::Inline,
            query: None,
        }
    }
}

/// Result of a map-reduce job.
///
/// Inline output yields the raw result documents; collection output yields
/// a facade over the materialized output collection.
#[derive(Debug)]
pub enum MapReduceOutput {
    Inline(Vec<Document>),
    Collection(Collection),
}

/// Facade over one named collection.
///
/// Owns the collection's remote handle exclusively. Cursors created by
/// [`Collection::find`] have independent lifetimes; the caller owns them
/// and is responsible for closing them.
pub struct Collection {
    session: Arc<Session>,
    handle: RemoteHandle,
    name: String,
}

impl Collection {
    pub(crate) fn new(session: Arc<Session>, handle: RemoteHandle, name: String) -> Self {
        Self {
            session,
            handle,
            name,
        }
    }

    /// Collection name without the database prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full namespace of the collection, e.g. `mydb.users`.
    pub fn namespace(&self) -> &str {
        self.handle.namespace()
    }

    /// One single-shot command against this collection's handle.
    async fn command(
        &self,
        name: &str,
        args: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.session
            .command(&self.handle, name, args, options.unwrap_or_default())
            .await
    }

    /* ----------------------------- writes ----------------------------- */

    /// Insert documents into the collection.
    pub async fn insert(&self, docs: Vec<Document>, options: Option<Document>) -> Result<Document> {
        debug!("inserting {} document(s) into '{}'", docs.len(), self.name);
        let documents: Vec<Bson> = docs.into_iter().map(Bson::Document).collect();
        self.command("insert", doc! { "documents": documents }, options)
            .await
    }

    /// Update documents matching `query`.
    pub async fn update(
        &self,
        query: Document,
        update: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        debug!("updating documents in '{}'", self.name);
        self.command("update", doc! { "query": query, "update": update }, options)
            .await
    }

    /// Remove documents matching `query`.
    pub async fn remove(&self, query: Document, options: Option<Document>) -> Result<Document> {
        debug!("removing documents from '{}'", self.name);
        self.command("remove", doc! { "query": query }, options).await
    }

    /// Alias of [`Collection::remove`] with identical argument forwarding.
    pub async fn delete(&self, query: Document, options: Option<Document>) -> Result<Document> {
        self.remove(query, options).await
    }

    /// Save a document: replace by `_id` when present, insert otherwise.
    pub async fn save(&self, document: Document, options: Option<Document>) -> Result<Document> {
        self.command("save", doc! { "document": document }, options)
            .await
    }

    /* ----------------------------- reads ------------------------------ */

    /// Distinct values of `key` across matching documents.
    pub async fn distinct(
        &self,
        key: &str,
        query: Option<Document>,
        options: Option<Document>,
    ) -> Result<Vec<Bson>> {
        let args = doc! { "key": key, "query": query.unwrap_or_default() };
        let reply = self.command("distinct", args, options).await?;
        Ok(match reply.get("values") {
            Some(Bson::Array(values)) => values.clone(),
            _ => Vec::new(),
        })
    }

    /// Count documents matching `query`.
    pub async fn count(&self, query: Option<Document>, options: Option<Document>) -> Result<u64> {
        let args = doc! { "query": query.unwrap_or_default() };
        let reply = self.command("count", args, options).await?;
        Ok(reply_u64(&reply, "n"))
    }

    /// Find a single document matching `query`, or `None`.
    pub async fn find_one(
        &self,
        query: Document,
        options: Option<Document>,
    ) -> Result<Option<Document>> {
        let reply = self
            .command("findOne", doc! { "query": query }, options)
            .await?;
        Ok(reply_document(&reply, "document"))
    }

    /// Create a cursor over the documents matching `filter`.
    ///
    /// No I/O happens here; fetching is deferred entirely to the cursor.
    pub fn find(&self, filter: Option<Document>) -> Cursor {
        Cursor::new(
            Arc::clone(&self.session),
            self.handle.clone(),
            filter.unwrap_or_default(),
            QueryShape::default(),
        )
    }

    /// Create a cursor with a pre-seeded sort and shape.
    pub fn find_with(
        &self,
        filter: Option<Document>,
        sort: Option<Document>,
        mut shape: QueryShape,
    ) -> Cursor {
        if sort.is_some() {
            shape.sort = sort;
        }
        Cursor::new(
            Arc::clone(&self.session),
            self.handle.clone(),
            filter.unwrap_or_default(),
            shape,
        )
    }

    /* ------------------------ atomic find-and-* ------------------------ */

    /// Atomically find one document and apply `update` to it.
    ///
    /// Resolves with `None` when nothing matches and `upsert` is off; with
    /// upsert the created document is returned.
    pub async fn find_and_modify(
        &self,
        query: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> Result<Option<Document>> {
        debug!("findAndModify on '{}'", self.name);
        let mut args = doc! { "query": query, "update": update };
        if let Some(sort) = options.sort {
            args.insert("sort", sort);
        }
        let mut opts = doc! { "upsert": options.upsert, "new": options.return_new };
        if let Some(projection) = options.projection {
            opts.insert("projection", projection);
        }
        if let Some(ms) = options.max_time_ms {
            opts.insert("maxTimeMS", ms as i64);
        }
        let reply = self.command("findAndModify", args, Some(opts)).await?;
        Ok(reply_document(&reply, "value"))
    }

    /// Atomically find one document and remove it.
    pub async fn find_and_remove(
        &self,
        query: Document,
        sort: Option<Document>,
        options: Option<Document>,
    ) -> Result<Option<Document>> {
        let mut args = doc! { "query": query };
        if let Some(sort) = sort {
            args.insert("sort", sort);
        }
        let mut opts = options.unwrap_or_default();
        opts.insert("remove", true);
        let reply = self.command("findAndModify", args, Some(opts)).await?;
        Ok(reply_document(&reply, "value"))
    }

    /* ------------------------- administration ------------------------- */

    /// Drop the collection.
    pub async fn drop(&self) -> Result<Document> {
        debug!("dropping collection '{}'", self.name);
        self.command("drop", Document::new(), None).await
    }

    /// Rename the collection server-side.
    ///
    /// The facade keeps referring to the old namespace; resolve a fresh
    /// collection from the database to address the new name.
    pub async fn rename(&self, new_name: &str, options: Option<Document>) -> Result<Document> {
        self.command("rename", doc! { "to": new_name }, options).await
    }

    /// Collection statistics.
    pub async fn stats(&self, options: Option<Document>) -> Result<Document> {
        self.command("stats", Document::new(), options).await
    }

    /// Create an index on the collection.
    pub async fn create_index(
        &self,
        keys: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command("createIndex", doc! { "keys": keys }, options)
            .await
    }

    /// Ensure an index exists, creating it when missing.
    pub async fn ensure_index(
        &self,
        keys: Document,
        options: Option<Document>,
    ) -> Result<Document> {
        self.command("ensureIndex", doc! { "keys": keys }, options)
            .await
    }

    /// Drop a single named index.
    pub async fn drop_index(&self, name: &str) -> Result<Document> {
        self.command("dropIndex", doc! { "name": name }, None).await
    }

    /// Drop every index on the collection.
    pub async fn drop_all_indexes(&self) -> Result<Document> {
        self.command("dropAllIndexes", Document::new(), None).await
    }

    /// Rebuild every index on the collection.
    pub async fn re_index(&self) -> Result<Document> {
        self.command("reIndex", Document::new(), None).await
    }

    /// Index metadata for the collection.
    pub async fn index_information(&self, options: Option<Document>) -> Result<Document> {
        self.command("indexInformation", Document::new(), options)
            .await
    }

    /* ---------------------------- map-reduce --------------------------- */

    /// Run a map-reduce job across the collection.
    ///
    /// Inline output resolves with the raw result documents. Collection
    /// output materializes a new collection server-side and resolves with
    /// a facade over it.
    pub async fn map_reduce(
        &self,
        map: &str,
        reduce: &str,
        options: MapReduceOptions,
    ) -> Result<MapReduceOutput> {
        debug!("mapReduce on '{}'", self.name);
        let mut args = doc! { "map": map, "reduce": reduce };
        if let Some(query) = options.query {
            args.insert("query", query);
        }
        let (out, inline) = match &options.out {
            MapReduceOut::Inline => (doc! { "inline": 1 }.into(), true),
            MapReduceOut::Collection(name) => (Bson::String(name.clone()), false),
        };
        let opts = doc! { "out": out };
        let reply = self.command("mapReduce", args, Some(opts)).await?;

        if inline {
            return Ok(MapReduceOutput::Inline(reply_documents(&reply, "results")));
        }

        let out_name = reply.get_str("result").unwrap_or_default().to_string();
        let handle = self
            .session
            .collection_handle(&out_name, Document::new())
            .await?;
        Ok(MapReduceOutput::Collection(Collection::new(
            Arc::clone(&self.session),
            handle,
            out_name,
        )))
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace())
            .finish_non_exhaustive()
    }
}

/* ------------------------- reply payload helpers ------------------------ */

/// Numeric payload field of a command reply, tolerant of integer width.
pub(crate) fn reply_u64(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) => n.max(0.0) as u64,
        _ => 0,
    }
}

/// Document payload field of a command reply; null and absent mean `None`.
fn reply_document(reply: &Document, key: &str) -> Option<Document> {
    match reply.get(key) {
        Some(Bson::Document(document)) => Some(document.clone()),
        _ => None,
    }
}

/// Document-array payload field of a command reply.
fn reply_documents(reply: &Document, key: &str) -> Vec<Document> {
    match reply.get(key) {
        Some(Bson::Array(values)) => values
            .iter()
            .filter_map(|value| match value {
                Bson::Document(document) => Some(document.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::config::ConnectionConfig;
    use crate::db::Db;
    use crate::error::BridgeError;
    use crate::remote::Completion;
    use crate::transport::{Fetch, MemoryTransport, Transport};

    #[test]
    fn reply_u64_tolerates_integer_widths() {
        assert_eq!(reply_u64(&doc! { "n": 3_i32 }, "n"), 3);
        assert_eq!(reply_u64(&doc! { "n": 3_i64 }, "n"), 3);
        assert_eq!(reply_u64(&doc! { "n": 3.0 }, "n"), 3);
        assert_eq!(reply_u64(&doc! { "n": -1_i64 }, "n"), 0);
        assert_eq!(reply_u64(&Document::new(), "n"), 0);
    }

    #[test]
    fn reply_document_treats_null_as_absent() {
        assert_eq!(reply_document(&doc! { "value": Bson::Null }, "value"), None);
        let reply = doc! { "value": { "a": 1 } };
        assert_eq!(reply_document(&reply, "value"), Some(doc! { "a": 1 }));
    }

    async fn open_db() -> Db {
        let transport = Arc::new(MemoryTransport::new());
        Db::open(transport, "testdb", &ConnectionConfig::default())
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn insert_sort_count_remove_scenario() {
        let db = open_db().await;
        let coll = db.collection("numbers", None).await.unwrap();
        coll.insert(vec![doc! { "a": 1 }, doc! { "a": 2 }, doc! { "a": 3 }], None)
            .await
            .unwrap();

        let ascending = coll
            .find(None)
            .sort(doc! { "a": 1 })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        let order: Vec<i32> = ascending.iter().map(|d| d.get_i32("a").unwrap()).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(coll.count(None, None).await.unwrap(), 3);

        let removed = coll.remove(doc! { "a": 2 }, None).await.unwrap();
        assert_eq!(reply_u64(&removed, "n"), 1);
        assert_eq!(coll.count(None, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn find_one_resolves_none_for_missing_documents() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        assert_eq!(coll.find_one(doc! { "name": "nobody" }, None).await.unwrap(), None);

        coll.insert(vec![doc! { "_id": 1, "name": "ada" }], None)
            .await
            .unwrap();
        let found = coll.find_one(doc! { "name": "ada" }, None).await.unwrap();
        assert_eq!(found.unwrap().get_str("name").unwrap(), "ada");
    }

    #[tokio::test]
    async fn find_and_modify_without_upsert_resolves_none() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        let value = coll
            .find_and_modify(
                doc! { "name": "ghost" },
                doc! { "$set": { "seen": true } },
                FindAndModifyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(coll.count(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_and_modify_with_upsert_creates_the_document() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        let value = coll
            .find_and_modify(
                doc! { "name": "ada" },
                doc! { "$set": { "seen": true } },
                FindAndModifyOptions {
                    upsert: true,
                    return_new: true,
                    ..FindAndModifyOptions::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.get_str("name").unwrap(), "ada");
        assert!(value.get_bool("seen").unwrap());
        assert_eq!(coll.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_and_modify_returns_the_old_document_by_default() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![doc! { "_id": 1, "v": 1 }], None).await.unwrap();

        let before = coll
            .find_and_modify(
                doc! { "_id": 1 },
                doc! { "$set": { "v": 2 } },
                FindAndModifyOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.get_i32("v").unwrap(), 1);

        let after = coll.find_one(doc! { "_id": 1 }, None).await.unwrap().unwrap();
        assert_eq!(after.get_i32("v").unwrap(), 2);
    }

    #[tokio::test]
    async fn find_and_remove_deletes_the_match() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![doc! { "_id": 1, "a": 1 }, doc! { "_id": 2, "a": 2 }], None)
            .await
            .unwrap();

        let removed = coll
            .find_and_remove(doc! {}, Some(doc! { "a": -1 }), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.get_i32("a").unwrap(), 2);
        assert_eq!(coll.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_forwards_the_remove_result() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![doc! { "a": 1 }, doc! { "a": 2 }], None)
            .await
            .unwrap();

        let reply = coll.delete(doc! { "a": 1 }, None).await.unwrap();
        assert_eq!(reply_u64(&reply, "n"), 1);
        assert_eq!(coll.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn save_inserts_then_replaces_by_id() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();

        coll.save(doc! { "_id": 1, "v": "old" }, None).await.unwrap();
        let reply = coll.save(doc! { "_id": 1, "v": "new" }, None).await.unwrap();
        assert!(reply.get_bool("updatedExisting").unwrap());

        assert_eq!(coll.count(None, None).await.unwrap(), 1);
        let current = coll.find_one(doc! { "_id": 1 }, None).await.unwrap().unwrap();
        assert_eq!(current.get_str("v").unwrap(), "new");
    }

    #[tokio::test]
    async fn update_with_upsert_inserts_when_nothing_matches() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        let reply = coll
            .update(
                doc! { "name": "ada" },
                doc! { "$set": { "hits": 1 } },
                Some(doc! { "upsert": true }),
            )
            .await
            .unwrap();
        assert!(reply.get("upserted").is_some());
        assert_eq!(coll.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_returns_unique_values() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(
            vec![
                doc! { "city": "oslo" },
                doc! { "city": "lima" },
                doc! { "city": "oslo" },
            ],
            None,
        )
        .await
        .unwrap();

        let values = coll.distinct("city", None, None).await.unwrap();
        assert_eq!(
            values,
            vec![Bson::String("oslo".into()), Bson::String("lima".into())]
        );
    }

    #[tokio::test]
    async fn map_reduce_inline_resolves_raw_documents() {
        let db = open_db().await;
        let coll = db.collection("events", None).await.unwrap();
        coll.insert(vec![doc! { "_id": 1 }, doc! { "_id": 2 }], None)
            .await
            .unwrap();

        let output = coll
            .map_reduce(
                "function() { emit(this._id, 1); }",
                "function(key, values) { return values.length; }",
                MapReduceOptions::default(),
            )
            .await
            .unwrap();
        match output {
            MapReduceOutput::Inline(documents) => assert_eq!(documents.len(), 2),
            MapReduceOutput::Collection(_) => panic!("expected inline output"),
        }
    }

    #[tokio::test]
    async fn map_reduce_collection_output_is_independently_usable() {
        let db = open_db().await;
        let coll = db.collection("events", None).await.unwrap();
        coll.insert(vec![doc! { "_id": 1 }, doc! { "_id": 2 }], None)
            .await
            .unwrap();

        let output = coll
            .map_reduce(
                "function() { emit(this._id, 1); }",
                "function(key, values) { return values.length; }",
                MapReduceOptions {
                    out: MapReduceOut::Collection("events_out".into()),
                    query: None,
                },
            )
            .await
            .unwrap();

        let MapReduceOutput::Collection(out) = output else {
            panic!("expected collection output");
        };
        assert_eq!(out.name(), "events_out");
        assert_eq!(out.count(None, None).await.unwrap(), 2);

        // The new facade supports its full operation set.
        out.insert(vec![doc! { "_id": 3 }], None).await.unwrap();
        assert_eq!(out.count(None, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn index_lifecycle() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();

        let created = coll
            .create_index(doc! { "age": -1, "name": 1 }, None)
            .await
            .unwrap();
        assert_eq!(created.get_str("name").unwrap(), "age_-1_name_1");

        let ensured = coll
            .ensure_index(doc! { "age": -1, "name": 1 }, None)
            .await
            .unwrap();
        assert!(ensured.get_bool("existed").unwrap());

        let info = coll.index_information(None).await.unwrap();
        let indexes = info.get_array("indexes").unwrap();
        assert_eq!(indexes.len(), 1);

        let err = coll.drop_index("missing").await.unwrap_err();
        match err {
            BridgeError::Transport(e) => assert_eq!(e.code, Some(27)),
            other => panic!("unexpected error: {other:?}"),
        }

        coll.drop_index("age_-1_name_1").await.unwrap();
        coll.drop_all_indexes().await.unwrap();
        coll.re_index().await.unwrap();
    }

    #[tokio::test]
    async fn rename_moves_the_namespace() {
        let db = open_db().await;
        let coll = db.collection("old_name", None).await.unwrap();
        coll.insert(vec![doc! { "a": 1 }], None).await.unwrap();

        coll.rename("new_name", None).await.unwrap();

        // The old facade now points at a missing namespace.
        let err = coll.stats(None).await.unwrap_err();
        match err {
            BridgeError::Transport(e) => assert_eq!(e.code, Some(26)),
            other => panic!("unexpected error: {other:?}"),
        }

        let renamed = db.collection("new_name", None).await.unwrap();
        assert_eq!(renamed.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stats_reports_document_count() {
        let db = open_db().await;
        let coll = db.collection("users", None).await.unwrap();
        coll.insert(vec![doc! { "a": 1 }, doc! { "a": 2 }], None)
            .await
            .unwrap();

        let stats = coll.stats(None).await.unwrap();
        assert_eq!(stats.get_str("ns").unwrap(), "testdb.users");
        assert_eq!(stats.get_i64("count").unwrap(), 2);
    }

    /* ------------------- exactly-once resolution check ------------------- */

    /// Transport that fires every command completion twice.
    #[derive(Default)]
    struct DoubleFireTransport {
        commands: AtomicU32,
    }

    impl Transport for DoubleFireTransport {
        fn open_connection(
            &self,
            _address: &str,
            database: &str,
            _config: &ConnectionConfig,
            done: Completion<crate::transport::RemoteHandle>,
        ) {
            done.resolve(crate::transport::RemoteHandle::new(database));
        }

        fn close_connection(
            &self,
            _connection: &crate::transport::RemoteHandle,
            _force: bool,
            done: Completion<()>,
        ) {
            done.resolve(());
        }

        fn open_collection(
            &self,
            connection: &crate::transport::RemoteHandle,
            name: &str,
            _options: Document,
            done: Completion<crate::transport::RemoteHandle>,
        ) {
            let namespace = format!("{}.{}", connection.namespace(), name);
            done.resolve(crate::transport::RemoteHandle::new(namespace));
        }

        fn execute_command(
            &self,
            _target: &crate::transport::RemoteHandle,
            _name: &str,
            _args: Document,
            _options: Document,
            done: Completion<Document>,
        ) {
            self.commands.fetch_add(1, Ordering::SeqCst);
            done.resolve(doc! { "ok": 1, "n": 1, "fire": "first" });
            done.resolve(doc! { "ok": 1, "fire": "second" });
        }

        fn open_cursor(
            &self,
            _collection: &crate::transport::RemoteHandle,
            _filter: &Document,
            _shape: &crate::cursor::QueryShape,
        ) -> crate::transport::RemoteHandle {
            unreachable!("no cursors in this test");
        }

        fn cursor_fetch_one(
            &self,
            _cursor: &crate::transport::RemoteHandle,
            _done: Completion<Fetch>,
        ) {
            unreachable!("no cursors in this test");
        }

        fn cursor_fetch_all(
            &self,
            _cursor: &crate::transport::RemoteHandle,
            _done: Completion<Vec<Document>>,
        ) {
            unreachable!("no cursors in this test");
        }

        fn cursor_close(&self, _cursor: &crate::transport::RemoteHandle, _done: Completion<()>) {
            unreachable!("no cursors in this test");
        }
    }

    #[tokio::test]
    async fn single_shot_operations_resolve_once_per_remote_call() {
        let transport = Arc::new(DoubleFireTransport::default());
        let observed = Arc::clone(&transport);
        let db = Db::open(transport, "testdb", &ConnectionConfig::default())
            .await
            .unwrap();
        let coll = db.collection("users", None).await.unwrap();

        let reply = coll.insert(vec![doc! { "a": 1 }], None).await.unwrap();
        assert_eq!(reply.get_str("fire").unwrap(), "first");
        assert_eq!(observed.commands.load(Ordering::SeqCst), 1);

        let reply = coll.remove(doc! {}, None).await.unwrap();
        assert_eq!(reply.get_str("fire").unwrap(), "first");
        assert_eq!(observed.commands.load(Ordering::SeqCst), 2);
    }
}
