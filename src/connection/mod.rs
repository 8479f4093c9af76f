//! Connection management for the facade chain.
//!
//! One [`Session`] backs a [`crate::Db`] and every facade derived from it.
//! It owns the transport, the connection handle and the cancellation token,
//! and funnels every remote call through a single guarded code path so that
//! a closed connection fails fast instead of hanging.

use std::sync::Arc;

use bson::Document;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cursor::QueryShape;
use crate::error::{ConnectionError, Result};
use crate::remote::{self, RemoteOp};
use crate::transport::{Fetch, RemoteHandle, Transport};

/// Current connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready.
    Connected,

    /// Closed; every further operation fails with a connection error.
    Closed,
}

/// Shared core of one open connection.
///
/// Facades hold this behind an `Arc`; the session itself owns the
/// connection's `RemoteHandle` exclusively.
pub(crate) struct Session {
    transport: Arc<dyn Transport>,
    connection: RemoteHandle,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(transport: Arc<dyn Transport>, connection: RemoteHandle) -> Self {
        Self {
            transport,
            connection,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle of the connection this session wraps.
    pub(crate) fn connection(&self) -> &RemoteHandle {
        &self.connection
    }

    pub(crate) fn state(&self) -> ConnectionState {
        if self.cancel.is_cancelled() {
            ConnectionState::Closed
        } else {
            ConnectionState::Connected
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(ConnectionError::Closed.into()),
        }
    }

    /// Await a pending operation, racing it against connection close.
    ///
    /// Close wins the race: an operation still in flight when the session
    /// closes fails with `ConnectionError::Closed` and its late completion
    /// is discarded by the adapter.
    async fn guarded<T>(&self, op: RemoteOp<T>) -> Result<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ConnectionError::Closed.into()),
            outcome = op => outcome,
        }
    }

    /// Execute a named command against `target` through the adapter.
    pub(crate) async fn command(
        &self,
        target: &RemoteHandle,
        name: &str,
        args: Document,
        options: Document,
    ) -> Result<Document> {
        self.ensure_open()?;
        debug!("issuing '{}' against '{}'", name, target.namespace());
        let op = remote::issue(|done| {
            self.transport
                .execute_command(target, name, args, options, done)
        });
        self.guarded(op).await
    }

    /// Resolve a collection handle inside the connected database.
    pub(crate) async fn collection_handle(
        &self,
        name: &str,
        options: Document,
    ) -> Result<RemoteHandle> {
        self.ensure_open()?;
        let op = remote::issue(|done| {
            self.transport
                .open_collection(&self.connection, name, options, done)
        });
        self.guarded(op).await
    }

    /// Register a server-side cursor. Synchronous, no I/O.
    pub(crate) fn open_cursor(
        &self,
        collection: &RemoteHandle,
        filter: &Document,
        shape: &QueryShape,
    ) -> Result<RemoteHandle> {
        self.ensure_open()?;
        Ok(self.transport.open_cursor(collection, filter, shape))
    }

    pub(crate) async fn fetch_one(&self, cursor: &RemoteHandle) -> Result<Fetch> {
        self.ensure_open()?;
        let op = remote::issue(|done| self.transport.cursor_fetch_one(cursor, done));
        self.guarded(op).await
    }

    pub(crate) async fn fetch_all(&self, cursor: &RemoteHandle) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let op = remote::issue(|done| self.transport.cursor_fetch_all(cursor, done));
        self.guarded(op).await
    }

    pub(crate) async fn close_cursor(&self, cursor: &RemoteHandle) -> Result<()> {
        self.ensure_open()?;
        let op = remote::issue(|done| self.transport.cursor_close(cursor, done));
        self.guarded(op).await
    }

    /// Release the connection.
    ///
    /// The session is marked closed before the release call goes out, so
    /// concurrent operations observe the closed state immediately. Closing
    /// an already-closed session trivially succeeds.
    pub(crate) async fn close(&self, force: bool) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.cancel.cancel();
        debug!("closing connection '{}'", self.connection.namespace());
        remote::issue(|done| {
            self.transport
                .close_connection(&self.connection, force, done)
        })
        .await
    }
}
