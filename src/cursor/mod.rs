//! Streaming result sets.
//!
//! A [`Cursor`] represents one remote query result set as a lazily-driven
//! sequence: chainable shape builders before execution, bulk
//! materialization, single-step advance, push-style iteration with early
//! termination, and explicit close. Construction performs no I/O; the
//! server-side cursor is registered on the first fetch, so there is exactly
//! one engine per server cursor.
//!
//! Documents are delivered in exactly the server's order. At most one fetch
//! is in flight per cursor; every fetch-triggering operation takes
//! `&mut self`, so interleaved fetches on the same cursor are rejected at
//! compile time rather than left undefined.

use std::sync::Arc;

use bson::{Document, doc};
use futures::Stream;
use tracing::{debug, warn};

use crate::collection::reply_u64;
use crate::connection::Session;
use crate::error::{CursorError, Result, ValidationError};
use crate::transport::{Fetch, RemoteHandle};


/// Read preference tag forwarded with the query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    /// Wire name of the preference tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

impl std::fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable, pre-execution description of a pending query.
///
/// Shape mutations are only valid before the first element is requested;
/// afterwards the builders on [`Cursor`] fail with a validation error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryShape {
    /// Ordered sort specification, keys mapping to 1 or -1.
    pub sort: Option<Document>,

    /// Number of leading documents the server skips.
    pub skip: u64,

    /// Maximum number of documents returned; 0 means unbounded.
    pub limit: u64,

    /// Advisory server-side time bound in milliseconds.
    pub max_time_ms: Option<u64>,

    /// Read preference tag.
    pub read_preference: Option<ReadPreference>,

    /// Field projection applied by the server.
    pub projection: Option<Document>,
}

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created or between fetches; more documents may remain.
    Open,

    /// A fetch is in flight.
    Draining,

    /// The server signalled the end of the result set. Terminal.
    Exhausted,

    /// Closed by the consumer or after an error. Terminal.
    Closed,
}

/// A lazily-advanced, cancellable stream over one query's result set.
pub struct Cursor {
    session: Arc<Session>,
    collection: RemoteHandle,
    filter: Document,
    shape: QueryShape,
    state: CursorState,
    remote: Option<RemoteHandle>,
}

impl Cursor {
    pub(crate) fn new(
        session: Arc<Session>,
        collection: RemoteHandle,
        filter: Document,
        shape: QueryShape,
    ) -> Self {
        Self {
            session,
            collection,
            filter,
            shape,
            state: CursorState::Open,
            remote: None,
        }
    }

    /* ------------------------- shape builders ------------------------- */

    fn shape_slot(&mut self, field: &'static str) -> Result<&mut QueryShape> {
        if self.remote.is_some() || self.state != CursorState::Open {
            return Err(ValidationError::ShapeFrozen { field }.into());
        }
        Ok(&mut self.shape)
    }

    /// Set the sort specification, e.g. `doc! { "age": -1, "name": 1 }`.
    pub fn sort(mut self, spec: Document) -> Result<Self> {
        self.shape_slot("sort")?.sort = Some(spec);
        Ok(self)
    }

    /// Cap the number of returned documents. 0 means unbounded.
    pub fn limit(mut self, n: u64) -> Result<Self> {
        self.shape_slot("limit")?.limit = n;
        Ok(self)
    }

    /// Skip the first `n` documents.
    pub fn skip(mut self, n: u64) -> Result<Self> {
        self.shape_slot("skip")?.skip = n;
        Ok(self)
    }

    /// Advisory time limit for the query, enforced by the server.
    pub fn max_time_ms(mut self, ms: u64) -> Result<Self> {
        self.shape_slot("max_time_ms")?.max_time_ms = Some(ms);
        Ok(self)
    }

    /// Set the read preference for the query.
    pub fn read_preference(mut self, pref: ReadPreference) -> Result<Self> {
        self.shape_slot("read_preference")?.read_preference = Some(pref);
        Ok(self)
    }

    /// Restrict the fields returned for each document.
    pub fn projection(mut self, fields: Document) -> Result<Self> {
        self.shape_slot("projection")?.projection = Some(fields);
        Ok(self)
    }

    /// The shape the first fetch will execute with.
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /* -------------------------- state queries ------------------------- */

    /// Current lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// True once the cursor reached a terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, CursorState::Closed | CursorState::Exhausted)
    }

    /* --------------------------- iteration ---------------------------- */

    fn guard_fetchable(&self) -> Result<()> {
        match self.state {
            CursorState::Exhausted | CursorState::Closed => Err(CursorError::Closed.into()),
            CursorState::Open | CursorState::Draining => Ok(()),
        }
    }

    /// Register the server cursor on first use.
    fn ensure_remote(&mut self) -> Result<RemoteHandle> {
        if let Some(handle) = &self.remote {
            return Ok(handle.clone());
        }
        let handle = self
            .session
            .open_cursor(&self.collection, &self.filter, &self.shape)?;
        debug!(
            "opened cursor on '{}' as '{}'",
            self.collection.namespace(),
            handle.id()
        );
        self.remote = Some(handle.clone());
        Ok(handle)
    }

    /// One fetch against the server cursor, with state bookkeeping.
    async fn fetch_step(&mut self) -> Result<Fetch> {
        self.guard_fetchable()?;
        let handle = self.ensure_remote()?;
        self.state = CursorState::Draining;
        match self.session.fetch_one(&handle).await {
            Ok(Fetch::Document(document)) => {
                self.state = CursorState::Open;
                Ok(Fetch::Document(document))
            }
            Ok(Fetch::EndOfStream) => {
                self.state = CursorState::Exhausted;
                Ok(Fetch::EndOfStream)
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// Close after a failure, releasing the server cursor if one exists.
    async fn abort(&mut self) {
        self.state = CursorState::Closed;
        if let Some(handle) = self.remote.take() {
            if let Err(close_err) = self.session.close_cursor(&handle).await {
                warn!("failed to release cursor '{}': {close_err}", handle.id());
            }
        }
    }

    /// Fetch the next document, or `None` once the result set is drained.
    ///
    /// After exhaustion every further call keeps returning `Ok(None)`.
    /// Calling on a closed cursor is an error.
    pub async fn try_next(&mut self) -> Result<Option<Document>> {
        match self.state {
            CursorState::Exhausted => Ok(None),
            CursorState::Closed => Err(CursorError::Closed.into()),
            CursorState::Open | CursorState::Draining => match self.fetch_step().await? {
                Fetch::Document(document) => Ok(Some(document)),
                Fetch::EndOfStream => Ok(None),
            },
        }
    }

    /// Visit every remaining document in server order.
    ///
    /// `visit` returns `Ok(true)` to continue, `Ok(false)` to stop early
    /// without error (the cursor stays usable), or `Err` to abort; an abort
    /// closes the cursor so the server resource is never leaked. The loop
    /// yields to the scheduler between fetches: iterating N documents uses
    /// constant stack depth for any N.
    pub async fn for_each<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(Document) -> Result<bool>,
    {
        self.guard_fetchable()?;
        loop {
            match self.fetch_step().await? {
                Fetch::EndOfStream => return Ok(()),
                Fetch::Document(document) => match visit(document) {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(e) => {
                        self.abort().await;
                        return Err(e);
                    }
                },
            }
            tokio::task::yield_now().await;
        }
    }

    /// Materialize every remaining document into a vector, in server order.
    ///
    /// Terminal: the cursor is exhausted afterwards.
    pub async fn to_vec(&mut self) -> Result<Vec<Document>> {
        self.guard_fetchable()?;
        let handle = self.ensure_remote()?;
        self.state = CursorState::Draining;
        match self.session.fetch_all(&handle).await {
            Ok(documents) => {
                self.state = CursorState::Exhausted;
                debug!("materialized {} documents", documents.len());
                Ok(documents)
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// Adapt the cursor into a [`futures::Stream`] of documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            match cursor.try_next().await? {
                Some(document) => Ok(Some((document, cursor))),
                None => Ok(None),
            }
        })
    }

    /* ------------------------ command-shaped reads --------------------- */

    /// Count the documents matching this cursor's query.
    ///
    /// With `apply_shape_limits`, the shape's skip and limit are applied to
    /// the count; otherwise they are ignored. Issues a command, not a
    /// fetch, so it works regardless of cursor state.
    pub async fn count(&self, apply_shape_limits: bool) -> Result<u64> {
        let mut args = doc! { "query": self.filter.clone() };
        if apply_shape_limits {
            if self.shape.skip > 0 {
                args.insert("skip", self.shape.skip as i64);
            }
            if self.shape.limit > 0 {
                args.insert("limit", self.shape.limit as i64);
            }
        }
        let reply = self
            .session
            .command(&self.collection, "count", args, Document::new())
            .await?;
        Ok(reply_u64(&reply, "n"))
    }

    /// Describe how the server would execute this query.
    ///
    /// Read-only; never touches the cursor state.
    pub async fn explain(&self) -> Result<Document> {
        let mut args = doc! { "query": self.filter.clone() };
        if let Some(sort) = &self.shape.sort {
            args.insert("sort", sort.clone());
        }
        if self.shape.skip > 0 {
            args.insert("skip", self.shape.skip as i64);
        }
        if self.shape.limit > 0 {
            args.insert("limit", self.shape.limit as i64);
        }
        self.session
            .command(&self.collection, "explain", args, Document::new())
            .await
    }

    /* ----------------------------- close ------------------------------ */

    /// Release the server-side cursor resources.
    ///
    /// Idempotent: closing an already-closed or exhausted cursor trivially
    /// succeeds. After close, fetch operations fail with a cursor-closed
    /// error. Once this resolves, no further fetch can be issued.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        let remote = self.remote.take();
        self.state = CursorState::Closed;
        if let Some(handle) = remote {
            self.session.close_cursor(&handle).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.namespace())
            .field("state", &self.state)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}
