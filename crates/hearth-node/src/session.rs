//! Connection session boundary
//!
//! A transport drives each client connection through a [`Session`]. The
//! [`SessionBoundary`] wrapping it is where connection failures stop:
//! errors and panics raised while receiving or sending are caught, reported
//! to the registered exception handler, and the session is closed. Nothing
//! escapes into actor or component machinery.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;

/// Connection-level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The transport reported a failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A received frame could not be handled
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// Session code panicked
    #[error("session panicked: {0}")]
    Panicked(String),

    /// The session was already closed
    #[error("session is closed")]
    Closed,
}

/// Per-connection callbacks invoked by a transport
#[async_trait]
pub trait Session: Send + Sync {
    /// The connection became active
    async fn on_active(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// The connection went away
    async fn on_inactive(&self) {}

    /// A failure was caught at the boundary; the session is about to close
    async fn on_exception(&self, _error: &SessionError) {}

    /// A frame arrived from the client
    async fn on_receive(&self, frame: Vec<u8>) -> Result<(), SessionError>;

    /// Write bytes to the client
    async fn send(&self, bytes: Vec<u8>) -> Result<(), SessionError>;

    /// Close the underlying connection
    async fn close(&self);
}

/// Whether a session is still usable after a boundary call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Call succeeded; the session stays open
    Open,
    /// The session is closed
    Closed,
}

/// Callback receiving every failure caught at a boundary
pub type ExceptionHandler = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// Containment wrapper around one session
pub struct SessionBoundary<S: Session> {
    session: S,
    on_exception: ExceptionHandler,
    closed: AtomicBool,
}

impl<S: Session> SessionBoundary<S> {
    /// Wrap `session`, reporting failures to `on_exception`
    pub fn new(session: S, on_exception: ExceptionHandler) -> Self {
        Self {
            session,
            on_exception,
            closed: AtomicBool::new(false),
        }
    }

    /// Wrapped session
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connection became active
    pub async fn activate(&self) -> SessionStatus {
        self.guard(self.session.on_active()).await
    }

    /// Hand a received frame to the session
    pub async fn receive(&self, frame: Vec<u8>) -> SessionStatus {
        self.guard(self.session.on_receive(frame)).await
    }

    /// Send bytes through the session
    pub async fn send(&self, bytes: Vec<u8>) -> SessionStatus {
        self.guard(self.session.send(bytes)).await
    }

    /// Report a transport-level failure and close
    pub async fn fail(&self, error: SessionError) {
        (self.on_exception)(&error);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!(%error, "closing session after failure");
        self.session.on_exception(&error).await;
        self.session.close().await;
    }

    /// The connection went away
    pub async fn deactivate(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.session.on_inactive().await;
    }

    async fn guard<F>(&self, call: F) -> SessionStatus
    where
        F: Future<Output = Result<(), SessionError>>,
    {
        if self.is_closed() {
            return SessionStatus::Closed;
        }
        let error = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => return SessionStatus::Open,
            Ok(Err(error)) => error,
            Err(panic) => SessionError::Panicked(panic_message(panic.as_ref())),
        };
        self.fail(error).await;
        SessionStatus::Closed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
