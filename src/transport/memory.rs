//! In-memory transport for development and tests.
//!
//! Implements the full [`Transport`] contract against an in-process
//! document store: a namespace keyed map of BSON documents with a small
//! filter matcher ($gt, $gte, $lt, $lte, $ne, $in, $exists, dotted paths),
//! multi-key sorting, skip/limit and inclusion projections. Commands are
//! dispatched by name and reply with command-shaped documents, using the
//! wire error codes a real server would use.
//!
//! Completion timing is deliberately mixed: command and single-fetch
//! completions fire synchronously, connection opens and bulk fetches fire
//! from a spawned task. Consumers must not rely on either timing.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use tracing::debug;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::cursor::QueryShape;
use crate::error::{BridgeError, ConnectionError, Result, TransportError};
use crate::remote::Completion;
use crate::transport::{Fetch, RemoteHandle, Transport};

/// Callback-driven transport over an in-process document store.
#[derive(Default)]
pub struct MemoryTransport {
    store: Arc<Mutex<Store>>,
}

#[derive(Default)]
struct Store {
    collections: BTreeMap<String, CollectionStore>,
    cursors: HashMap<Uuid, CursorEntry>,
    connections: HashSet<Uuid>,
}

#[derive(Default, Clone)]
struct CollectionStore {
    documents: Vec<Document>,
    indexes: Vec<Document>,
}

struct CursorEntry {
    namespace: String,
    filter: Document,
    shape: QueryShape,
    /// Remaining documents; materialized at the first fetch.
    pending: Option<VecDeque<Document>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(store: &Arc<Mutex<Store>>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/* ----------------------------- error helpers ---------------------------- */

fn ns_not_found(namespace: &str) -> BridgeError {
    TransportError::new(26, format!("ns not found: {namespace}")).into()
}

fn ns_exists(namespace: &str) -> BridgeError {
    TransportError::new(48, format!("target namespace exists: {namespace}")).into()
}

fn index_not_found(name: &str) -> BridgeError {
    TransportError::new(27, format!("index not found with name [{name}]")).into()
}

fn command_not_found(name: &str) -> BridgeError {
    TransportError::new(59, format!("no such command: '{name}'")).into()
}

fn duplicate_key(id: &Bson) -> BridgeError {
    TransportError::new(11000, format!("duplicate key error, _id: {id}")).into()
}

fn cursor_not_found(id: Uuid) -> BridgeError {
    TransportError::new(43, format!("cursor not found: {id}")).into()
}

impl Transport for MemoryTransport {
    fn open_connection(
        &self,
        address: &str,
        database: &str,
        _config: &ConnectionConfig,
        done: Completion<RemoteHandle>,
    ) {
        let store = Arc::clone(&self.store);
        let address = address.to_string();
        let database = database.to_string();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if !address.starts_with("mongodb://") {
                done.fail(
                    ConnectionError::OpenFailed(format!("unsupported address '{address}'")).into(),
                );
                return;
            }
            let handle = RemoteHandle::new(database);
            lock(&store).connections.insert(handle.id());
            debug!("memory transport connected to '{}'", handle.namespace());
            done.resolve(handle);
        });
    }

    fn close_connection(&self, connection: &RemoteHandle, _force: bool, done: Completion<()>) {
        lock(&self.store).connections.remove(&connection.id());
        done.resolve(());
    }

    fn open_collection(
        &self,
        connection: &RemoteHandle,
        name: &str,
        _options: Document,
        done: Completion<RemoteHandle>,
    ) {
        let known = lock(&self.store).connections.contains(&connection.id());
        if !known {
            done.fail(ConnectionError::Closed.into());
            return;
        }
        let namespace = format!("{}.{}", connection.namespace(), name);
        done.resolve(RemoteHandle::new(namespace));
    }

    fn execute_command(
        &self,
        target: &RemoteHandle,
        name: &str,
        args: Document,
        options: Document,
        done: Completion<Document>,
    ) {
        let outcome = {
            let mut store = lock(&self.store);
            if target.namespace().contains('.') {
                store.collection_command(target.namespace(), name, &args, &options)
            } else {
                store.database_command(target.namespace(), name, &args, &options)
            }
        };
        done.complete(outcome);
    }

    fn open_cursor(
        &self,
        collection: &RemoteHandle,
        filter: &Document,
        shape: &QueryShape,
    ) -> RemoteHandle {
        let handle = RemoteHandle::new(collection.namespace());
        lock(&self.store).cursors.insert(
            handle.id(),
            CursorEntry {
                namespace: collection.namespace().to_string(),
                filter: filter.clone(),
                shape: shape.clone(),
                pending: None,
            },
        );
        handle
    }

    fn cursor_fetch_one(&self, cursor: &RemoteHandle, done: Completion<Fetch>) {
        let outcome = lock(&self.store).fetch_one(cursor.id());
        done.complete(outcome);
    }

    fn cursor_fetch_all(&self, cursor: &RemoteHandle, done: Completion<Vec<Document>>) {
        let store = Arc::clone(&self.store);
        let id = cursor.id();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            done.complete(lock(&store).fetch_all(id));
        });
    }

    fn cursor_close(&self, cursor: &RemoteHandle, done: Completion<()>) {
        lock(&self.store).cursors.remove(&cursor.id());
        done.resolve(());
    }
}

/* ------------------------------- commands ------------------------------- */

impl Store {
    fn collection_command(
        &mut self,
        namespace: &str,
        name: &str,
        args: &Document,
        options: &Document,
    ) -> Result<Document> {
        match name {
            "insert" => self.insert(namespace, args),
            "update" => self.update(namespace, args, options),
            "remove" => self.remove(namespace, args, options),
            "save" => self.save(namespace, args),
            "findOne" => self.find_one(namespace, args),
            "findAndModify" => self.find_and_modify(namespace, args, options),
            "distinct" => self.distinct(namespace, args),
            "count" => self.count(namespace, args),
            "drop" => self.drop_collection_ns(namespace),
            "rename" => {
                let to = args.get_str("to").unwrap_or_default();
                let database = namespace.split('.').next().unwrap_or_default();
                self.rename_ns(namespace, &format!("{database}.{to}"))
            }
            "stats" => self.collection_stats(namespace),
            "createIndex" => self.create_index(namespace, args, false),
            "ensureIndex" => self.create_index(namespace, args, true),
            "dropIndex" => self.drop_index(namespace, args),
            "dropAllIndexes" => self.drop_all_indexes(namespace),
            "reIndex" => self.re_index(namespace),
            "indexInformation" => self.index_information(namespace),
            "explain" => self.explain(namespace, args),
            "mapReduce" => self.map_reduce(namespace, args, options),
            other => Err(command_not_found(other)),
        }
    }

    fn database_command(
        &mut self,
        database: &str,
        name: &str,
        args: &Document,
        options: &Document,
    ) -> Result<Document> {
        match name {
            "listCollections" => {
                let prefix = format!("{database}.");
                let names: Vec<Bson> = self
                    .collections
                    .keys()
                    .filter_map(|ns| ns.strip_prefix(&prefix))
                    .map(|name| Bson::String(name.to_string()))
                    .collect();
                Ok(doc! { "ok": 1, "names": names })
            }
            "createCollection" => {
                let namespace = format!("{database}.{}", args.get_str("name").unwrap_or_default());
                if self.collections.contains_key(&namespace) {
                    return Err(ns_exists(&namespace));
                }
                self.collections.insert(namespace, CollectionStore::default());
                Ok(doc! { "ok": 1 })
            }
            "dropCollection" => {
                let namespace = format!("{database}.{}", args.get_str("name").unwrap_or_default());
                self.drop_collection_ns(&namespace)
            }
            "renameCollection" => {
                let from = format!("{database}.{}", args.get_str("from").unwrap_or_default());
                let to = format!("{database}.{}", args.get_str("to").unwrap_or_default());
                self.rename_ns(&from, &to)
            }
            "dropDatabase" => {
                let prefix = format!("{database}.");
                self.collections.retain(|ns, _| !ns.starts_with(&prefix));
                Ok(doc! { "ok": 1, "dropped": database })
            }
            "dbStats" => {
                let prefix = format!("{database}.");
                let members: Vec<&CollectionStore> = self
                    .collections
                    .iter()
                    .filter(|(ns, _)| ns.starts_with(&prefix))
                    .map(|(_, store)| store)
                    .collect();
                let objects: usize = members.iter().map(|c| c.documents.len()).sum();
                Ok(doc! {
                    "ok": 1,
                    "db": database,
                    "collections": members.len() as i64,
                    "objects": objects as i64,
                })
            }
            "command" => {
                if args.contains_key("ping") {
                    Ok(doc! { "ok": 1 })
                } else if args.contains_key("buildInfo") {
                    Ok(doc! { "ok": 1, "version": env!("CARGO_PKG_VERSION") })
                } else {
                    let requested = args.keys().next().map(String::as_str).unwrap_or("");
                    Err(command_not_found(requested))
                }
            }
            // Index management addressed at the database with a collection
            // argument routes to the collection implementation.
            "createIndex" | "ensureIndex" | "dropIndex" | "dropAllIndexes" | "reIndex"
            | "indexInformation" => {
                let namespace =
                    format!("{database}.{}", args.get_str("collection").unwrap_or_default());
                self.collection_command(&namespace, name, args, options)
            }
            other => Err(command_not_found(other)),
        }
    }

    /* ------------------------------ writes ----------------------------- */

    fn insert(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let incoming: Vec<Document> = doc_array(args, "documents");
        let collection = self.collections.entry(namespace.to_string()).or_default();

        let mut prepared: Vec<Document> = Vec::with_capacity(incoming.len());
        for mut document in incoming {
            // Only caller-supplied ids can clash; generated ids are unique.
            if let Some(id) = document.get("_id") {
                let clash = collection
                    .documents
                    .iter()
                    .chain(prepared.iter())
                    .filter_map(|known| known.get("_id"))
                    .any(|known| bson_eq(known, id));
                if clash {
                    return Err(duplicate_key(id));
                }
            } else {
                document.insert("_id", ObjectId::new());
            }
            prepared.push(document);
        }

        let n = prepared.len() as i64;
        collection.documents.extend(prepared);
        Ok(doc! { "ok": 1, "n": n })
    }

    fn update(&mut self, namespace: &str, args: &Document, options: &Document) -> Result<Document> {
        let query = sub_document(args, "query");
        let update = sub_document(args, "update");
        let multi = truthy_field(options, "multi");
        let upsert = truthy_field(options, "upsert");

        let collection = self.collections.entry(namespace.to_string()).or_default();
        let mut matched = 0_i64;
        for document in collection.documents.iter_mut() {
            if !matches(document, &query) {
                continue;
            }
            *document = apply_update(document, &update);
            matched += 1;
            if !multi {
                break;
            }
        }

        if matched == 0 && upsert {
            let inserted = upsert_document(&query, &update);
            let id = inserted.get("_id").cloned().unwrap_or(Bson::Null);
            collection.documents.push(inserted);
            return Ok(doc! { "ok": 1, "n": 1, "nModified": 0, "upserted": id });
        }

        Ok(doc! { "ok": 1, "n": matched, "nModified": matched })
    }

    fn remove(&mut self, namespace: &str, args: &Document, options: &Document) -> Result<Document> {
        let query = sub_document(args, "query");
        let single = truthy_field(options, "single");
        let Some(collection) = self.collections.get_mut(namespace) else {
            return Ok(doc! { "ok": 1, "n": 0 });
        };

        let mut removed = 0_i64;
        collection.documents.retain(|document| {
            if (single && removed > 0) || !matches(document, &query) {
                return true;
            }
            removed += 1;
            false
        });
        Ok(doc! { "ok": 1, "n": removed })
    }

    fn save(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let mut document = sub_document(args, "document");
        let collection = self.collections.entry(namespace.to_string()).or_default();

        if let Some(id) = document.get("_id").cloned() {
            for slot in collection.documents.iter_mut() {
                if slot.get("_id").is_some_and(|known| bson_eq(known, &id)) {
                    *slot = document;
                    return Ok(doc! { "ok": 1, "n": 1, "updatedExisting": true });
                }
            }
        } else {
            document.insert("_id", ObjectId::new());
        }
        collection.documents.push(document);
        Ok(doc! { "ok": 1, "n": 1, "updatedExisting": false })
    }

    /* ------------------------------ reads ------------------------------ */

    fn query_documents(&self, namespace: &str, filter: &Document, shape: &QueryShape) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .collections
            .get(namespace)
            .map(|collection| {
                collection
                    .documents
                    .iter()
                    .filter(|document| matches(document, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &shape.sort {
            sort_documents(&mut documents, sort);
        }
        let skip = (shape.skip as usize).min(documents.len());
        documents.drain(..skip);
        if shape.limit > 0 {
            documents.truncate(shape.limit as usize);
        }
        if let Some(projection) = &shape.projection {
            documents = documents
                .iter()
                .map(|document| project(document, projection))
                .collect();
        }
        documents
    }

    fn find_one(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let filter = sub_document(args, "query");
        let shape = QueryShape {
            limit: 1,
            ..QueryShape::default()
        };
        let document = self
            .query_documents(namespace, &filter, &shape)
            .into_iter()
            .next()
            .map(Bson::Document)
            .unwrap_or(Bson::Null);
        Ok(doc! { "ok": 1, "document": document })
    }

    fn distinct(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let key = args.get_str("key").unwrap_or_default();
        let filter = sub_document(args, "query");
        let mut values: Vec<Bson> = Vec::new();
        if let Some(collection) = self.collections.get(namespace) {
            for document in &collection.documents {
                if !matches(document, &filter) {
                    continue;
                }
                if let Some(value) = lookup_path(document, key) {
                    if !values.iter().any(|known| bson_eq(known, value)) {
                        values.push(value.clone());
                    }
                }
            }
        }
        Ok(doc! { "ok": 1, "values": values })
    }

    fn count(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let filter = sub_document(args, "query");
        let matched = self
            .collections
            .get(namespace)
            .map(|collection| {
                collection
                    .documents
                    .iter()
                    .filter(|document| matches(document, &filter))
                    .count() as i64
            })
            .unwrap_or(0);

        let skip = args.get_i64("skip").unwrap_or(0).max(0);
        let limit = args.get_i64("limit").unwrap_or(0).max(0);
        let mut n = (matched - skip).max(0);
        if limit > 0 {
            n = n.min(limit);
        }
        Ok(doc! { "ok": 1, "n": n })
    }

    fn find_and_modify(
        &mut self,
        namespace: &str,
        args: &Document,
        options: &Document,
    ) -> Result<Document> {
        let query = sub_document(args, "query");
        let sort = args.get_document("sort").ok().cloned();
        let remove = truthy_field(options, "remove");
        let upsert = truthy_field(options, "upsert");
        let return_new = truthy_field(options, "new");
        let update = sub_document(args, "update");

        let collection = self.collections.entry(namespace.to_string()).or_default();

        // Pick the first match, honoring the requested order.
        let mut candidates: Vec<(usize, Document)> = collection
            .documents
            .iter()
            .enumerate()
            .filter(|(_, document)| matches(document, &query))
            .map(|(position, document)| (position, document.clone()))
            .collect();
        if let Some(sort) = &sort {
            candidates.sort_by(|(_, a), (_, b)| compare_by_sort(a, b, sort));
        }

        let Some((position, before)) = candidates.into_iter().next() else {
            if upsert && !remove {
                let inserted = upsert_document(&query, &update);
                let value = if return_new {
                    Bson::Document(inserted.clone())
                } else {
                    Bson::Null
                };
                collection.documents.push(inserted);
                return Ok(doc! { "ok": 1, "value": value });
            }
            return Ok(doc! { "ok": 1, "value": Bson::Null });
        };

        if remove {
            collection.documents.remove(position);
            return Ok(doc! { "ok": 1, "value": before });
        }

        let after = apply_update(&before, &update);
        collection.documents[position] = after.clone();
        let value = if return_new { after } else { before };
        Ok(doc! { "ok": 1, "value": value })
    }

    fn explain(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let filter = sub_document(args, "query");
        let matched = self
            .collections
            .get(namespace)
            .map(|collection| {
                collection
                    .documents
                    .iter()
                    .filter(|document| matches(document, &filter))
                    .count() as i64
            })
            .unwrap_or(0);
        Ok(doc! {
            "ok": 1,
            "queryPlanner": {
                "namespace": namespace,
                "parsedQuery": filter,
                "winningPlan": { "stage": "COLLSCAN" },
            },
            "executionStats": { "nReturned": matched },
        })
    }

    /* -------------------------- administration ------------------------- */

    fn drop_collection_ns(&mut self, namespace: &str) -> Result<Document> {
        if self.collections.remove(namespace).is_none() {
            return Err(ns_not_found(namespace));
        }
        Ok(doc! { "ok": 1, "dropped": namespace })
    }

    fn rename_ns(&mut self, from: &str, to: &str) -> Result<Document> {
        if self.collections.contains_key(to) {
            return Err(ns_exists(to));
        }
        match self.collections.remove(from) {
            Some(collection) => {
                self.collections.insert(to.to_string(), collection);
                Ok(doc! { "ok": 1 })
            }
            None => Err(ns_not_found(from)),
        }
    }

    fn collection_stats(&mut self, namespace: &str) -> Result<Document> {
        match self.collections.get(namespace) {
            Some(collection) => Ok(doc! {
                "ok": 1,
                "ns": namespace,
                "count": collection.documents.len() as i64,
                "nindexes": collection.indexes.len() as i64,
            }),
            None => Err(ns_not_found(namespace)),
        }
    }

    fn create_index(&mut self, namespace: &str, args: &Document, reuse: bool) -> Result<Document> {
        let keys = sub_document(args, "keys");
        let name = index_name(&keys);
        let collection = self.collections.entry(namespace.to_string()).or_default();

        let exists = collection
            .indexes
            .iter()
            .any(|index| index.get_str("name") == Ok(name.as_str()));
        if exists {
            if reuse {
                return Ok(doc! { "ok": 1, "name": name, "existed": true });
            }
            return Err(ns_exists(&format!("{namespace}.${name}")));
        }

        collection.indexes.push(doc! { "name": &name, "key": keys });
        Ok(doc! { "ok": 1, "name": name })
    }

    fn drop_index(&mut self, namespace: &str, args: &Document) -> Result<Document> {
        let name = args.get_str("name").unwrap_or_default();
        let Some(collection) = self.collections.get_mut(namespace) else {
            return Err(ns_not_found(namespace));
        };
        let before = collection.indexes.len();
        collection
            .indexes
            .retain(|index| index.get_str("name") != Ok(name));
        if collection.indexes.len() == before {
            return Err(index_not_found(name));
        }
        Ok(doc! { "ok": 1 })
    }

    fn drop_all_indexes(&mut self, namespace: &str) -> Result<Document> {
        let Some(collection) = self.collections.get_mut(namespace) else {
            return Err(ns_not_found(namespace));
        };
        let was = collection.indexes.len() as i64;
        collection.indexes.clear();
        Ok(doc! { "ok": 1, "nIndexesWas": was })
    }

    fn re_index(&mut self, namespace: &str) -> Result<Document> {
        match self.collections.get(namespace) {
            Some(collection) => Ok(doc! { "ok": 1, "nIndexes": collection.indexes.len() as i64 }),
            None => Err(ns_not_found(namespace)),
        }
    }

    fn index_information(&mut self, namespace: &str) -> Result<Document> {
        let indexes: Vec<Bson> = self
            .collections
            .get(namespace)
            .map(|collection| {
                collection
                    .indexes
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect()
            })
            .unwrap_or_default();
        Ok(doc! { "ok": 1, "indexes": indexes })
    }

    /// Identity map-reduce: the matched documents pass through unreduced.
    fn map_reduce(
        &mut self,
        namespace: &str,
        args: &Document,
        options: &Document,
    ) -> Result<Document> {
        let filter = sub_document(args, "query");
        let matched = self.query_documents(namespace, &filter, &QueryShape::default());

        match options.get("out") {
            Some(Bson::Document(out)) if truthy_field(out, "inline") => {
                let results: Vec<Bson> = matched.into_iter().map(Bson::Document).collect();
                Ok(doc! { "ok": 1, "results": results })
            }
            Some(Bson::String(out_name)) => {
                let database = namespace.split('.').next().unwrap_or_default();
                let out_namespace = format!("{database}.{out_name}");
                let out_store = self.collections.entry(out_namespace).or_default();
                out_store.documents = matched;
                Ok(doc! { "ok": 1, "result": out_name.clone() })
            }
            _ => Err(TransportError::new(9, "mapReduce requires an 'out' option").into()),
        }
    }

    /* ------------------------------ cursors ---------------------------- */

    fn materialize(&mut self, id: Uuid) -> Result<&mut CursorEntry> {
        // Two-phase: run the query first, then re-borrow the entry.
        let (namespace, filter, shape) = match self.cursors.get(&id) {
            Some(entry) => (
                entry.namespace.clone(),
                entry.filter.clone(),
                entry.shape.clone(),
            ),
            None => return Err(cursor_not_found(id)),
        };
        let needs_query = self
            .cursors
            .get(&id)
            .is_some_and(|entry| entry.pending.is_none());
        if needs_query {
            let documents = self.query_documents(&namespace, &filter, &shape);
            if let Some(entry) = self.cursors.get_mut(&id) {
                entry.pending = Some(documents.into());
            }
        }
        self.cursors.get_mut(&id).ok_or_else(|| cursor_not_found(id))
    }

    fn fetch_one(&mut self, id: Uuid) -> Result<Fetch> {
        let entry = self.materialize(id)?;
        let next = entry.pending.as_mut().and_then(VecDeque::pop_front);
        Ok(match next {
            Some(document) => Fetch::Document(document),
            None => Fetch::EndOfStream,
        })
    }

    fn fetch_all(&mut self, id: Uuid) -> Result<Vec<Document>> {
        let entry = self.materialize(id)?;
        let drained = entry
            .pending
            .as_mut()
            .map(|pending| pending.drain(..).collect())
            .unwrap_or_default();
        Ok(drained)
    }
}

/* ------------------------------ BSON helpers ----------------------------- */

fn doc_array(args: &Document, key: &str) -> Vec<Document> {
    match args.get(key) {
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

fn sub_document(args: &Document, key: &str) -> Document {
    args.get_document(key).cloned().unwrap_or_default()
}

fn truthy(value: &Bson) -> bool {
    !matches!(
        value,
        Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0) | Bson::Null
    ) && !matches!(value, Bson::Double(d) if *d == 0.0)
}

fn truthy_field(document: &Document, key: &str) -> bool {
    document.get(key).map(truthy).unwrap_or(false)
}

/// Dotted-path lookup, e.g. `address.city`.
fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        match value {
            Bson::Document(nested) => current = nested,
            _ => return None,
        }
    }
    None
}

/// Numeric-aware comparison; `None` when the types are not comparable.
fn compare(a: &Bson, b: &Bson) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;
    let numeric = |value: &Bson| -> Option<f64> {
        match value {
            Bson::Int32(n) => Some(*n as f64),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(n) => Some(*n),
            _ => None,
        }
    };
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => {
            if a == b {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(std::cmp::Ordering::Equal) || a == b
}

fn is_operator_doc(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// True when `document` satisfies every clause of `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, condition)| field_matches(document, key, condition))
}

fn field_matches(document: &Document, path: &str, condition: &Bson) -> bool {
    let value = lookup_path(document, path);
    match condition {
        Bson::Document(ops) if is_operator_doc(ops) => ops
            .iter()
            .all(|(operator, operand)| apply_operator(value, operator, operand)),
        expected => value.is_some_and(|actual| bson_eq(actual, expected)),
    }
}

fn apply_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> bool {
    use std::cmp::Ordering;
    match operator {
        "$exists" => value.is_some() == truthy(operand),
        "$ne" => !value.is_some_and(|actual| bson_eq(actual, operand)),
        "$in" => match operand {
            Bson::Array(candidates) => {
                value.is_some_and(|actual| candidates.iter().any(|c| bson_eq(actual, c)))
            }
            _ => false,
        },
        "$gt" | "$gte" | "$lt" | "$lte" => {
            let Some(ordering) = value.and_then(|actual| compare(actual, operand)) else {
                return false;
            };
            match operator {
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
        _ => false,
    }
}

/// Multi-key comparator for one sort specification.
fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for (key, direction) in sort {
        let ordering = match (lookup_path(a, key), lookup_path(b, key)) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let descending = matches!(direction, Bson::Int32(d) if *d < 0)
            || matches!(direction, Bson::Int64(d) if *d < 0)
            || matches!(direction, Bson::Double(d) if *d < 0.0);
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| compare_by_sort(a, b, sort));
}

/// Inclusion projection; `_id` is kept unless explicitly suppressed.
fn project(document: &Document, projection: &Document) -> Document {
    let mut out = Document::new();
    let id_suppressed = projection.get("_id").is_some_and(|flag| !truthy(flag));
    if !id_suppressed {
        if let Some(id) = document.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (key, flag) in projection {
        if key == "_id" || !truthy(flag) {
            continue;
        }
        if let Some(value) = document.get(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Apply an update document: `$set`/`$unset`/`$inc`, or full replacement.
fn apply_update(current: &Document, update: &Document) -> Document {
    if !update.keys().any(|key| key.starts_with('$')) {
        let mut replacement = update.clone();
        if let Some(id) = current.get("_id") {
            replacement.insert("_id", id.clone());
        }
        return replacement;
    }

    let mut out = current.clone();
    for (operator, spec) in update {
        let Bson::Document(fields) = spec else { continue };
        match operator.as_str() {
            "$set" => {
                for (key, value) in fields {
                    out.insert(key.clone(), value.clone());
                }
            }
            "$unset" => {
                for (key, _) in fields {
                    out.remove(key);
                }
            }
            "$inc" => {
                for (key, delta) in fields {
                    let incremented = match (out.get(key), delta) {
                        (Some(Bson::Int32(n)), Bson::Int32(d)) => {
                            Bson::Int64(*n as i64 + *d as i64)
                        }
                        (Some(Bson::Int64(n)), Bson::Int32(d)) => Bson::Int64(n + *d as i64),
                        (Some(Bson::Int32(n)), Bson::Int64(d)) => Bson::Int64(*n as i64 + d),
                        (Some(Bson::Int64(n)), Bson::Int64(d)) => Bson::Int64(n + d),
                        (Some(other), delta) => {
                            let base = match other {
                                Bson::Double(x) => *x,
                                Bson::Int32(x) => *x as f64,
                                Bson::Int64(x) => *x as f64,
                                _ => 0.0,
                            };
                            let step = match delta {
                                Bson::Double(x) => *x,
                                Bson::Int32(x) => *x as f64,
                                Bson::Int64(x) => *x as f64,
                                _ => 0.0,
                            };
                            Bson::Double(base + step)
                        }
                        (None, delta) => delta.clone(),
                    };
                    out.insert(key.clone(), incremented);
                }
            }
            _ => {}
        }
    }
    out
}

/// Seed document for an upsert: equality clauses of the query plus the
/// update, with a generated `_id` when none resulted.
fn upsert_document(query: &Document, update: &Document) -> Document {
    let mut base = Document::new();
    for (key, value) in query {
        let is_operator = matches!(value, Bson::Document(d) if is_operator_doc(d));
        if !key.starts_with('$') && !is_operator {
            base.insert(key.clone(), value.clone());
        }
    }
    let mut document = apply_update(&base, update);
    if !document.contains_key("_id") {
        document.insert("_id", ObjectId::new());
    }
    document
}

/// Index name derived from its keys, e.g. `age_-1_name_1`.
fn index_name(keys: &Document) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|(key, direction)| {
            let direction = match direction {
                Bson::Int32(d) => *d as i64,
                Bson::Int64(d) => *d,
                Bson::Double(d) => *d as i64,
                _ => 1,
            };
            format!("{key}_{direction}")
        })
        .collect();
    parts.join("_")
}
