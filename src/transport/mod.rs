//! Transport boundary consumed by the facade layer.
//!
//! Everything below this trait is an external collaborator: the wire
//! protocol, connection pooling, authentication and BSON encoding are the
//! transport's business. The facade only needs callback-completing remote
//! procedures, which [`crate::remote`] adapts into futures.
//!
//! Each completion handler fires at most once per call from a well-behaved
//! transport; the adapter layer tolerates handlers that misbehave and fire
//! more than once.

pub mod memory;

use bson::Document;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::cursor::QueryShape;
use crate::remote::Completion;

pub use memory::MemoryTransport;

/// Opaque reference to a server-side resource.
///
/// A handle identifies one remote resource (connection, collection or
/// cursor). Exactly one facade object owns a given handle for the facade's
/// lifetime; handles are cheap values, but ownership of the resource they
/// name is never shared between facades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandle {
    id: Uuid,
    namespace: String,
}

impl RemoteHandle {
    /// Create a handle for the named remote resource.
    ///
    /// Called by transport implementations when a resource is registered;
    /// facade code never fabricates handles.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
        }
    }

    /// Unique identity of this handle.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Namespace path of the resource, e.g. `mydb` or `mydb.users`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Outcome of a single cursor advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    /// The next document in server order.
    Document(Document),

    /// The server signalled that no more documents remain.
    EndOfStream,
}

/// Callback-driven remote procedures of the underlying driver.
///
/// Contract for every completion-taking operation: the transport issues
/// exactly one remote call and fires `done` exactly once, with either the
/// server's result or the server's error verbatim. `open_cursor` is a
/// synchronous registration that performs no I/O; all cursor data flows
/// through the fetch operations.
pub trait Transport: Send + Sync + 'static {
    /// Establish a connection to the logical database at `address`.
    fn open_connection(
        &self,
        address: &str,
        database: &str,
        config: &ConnectionConfig,
        done: Completion<RemoteHandle>,
    );

    /// Release a connection. With `force`, in-flight work may be abandoned.
    fn close_connection(&self, connection: &RemoteHandle, force: bool, done: Completion<()>);

    /// Resolve a collection resource inside the connected database.
    ///
    /// Resolving does not create the collection server-side.
    fn open_collection(
        &self,
        connection: &RemoteHandle,
        name: &str,
        options: Document,
        done: Completion<RemoteHandle>,
    );

    /// Execute a named command against the resource behind `target`.
    fn execute_command(
        &self,
        target: &RemoteHandle,
        name: &str,
        args: Document,
        options: Document,
        done: Completion<Document>,
    );

    /// Register a server-side cursor for the given query. No I/O.
    fn open_cursor(
        &self,
        collection: &RemoteHandle,
        filter: &Document,
        shape: &QueryShape,
    ) -> RemoteHandle;

    /// Fetch the next document, or the end-of-stream signal.
    fn cursor_fetch_one(&self, cursor: &RemoteHandle, done: Completion<Fetch>);

    /// Fetch every remaining document in server order.
    fn cursor_fetch_all(&self, cursor: &RemoteHandle, done: Completion<Vec<Document>>);

    /// Release the server-side cursor resources.
    fn cursor_close(&self, cursor: &RemoteHandle, done: Completion<()>);
}
