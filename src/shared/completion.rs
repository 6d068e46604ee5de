// This is free and unencumbered software released into the public domain.

//! One-shot completion for capture requests.
//!
//! A [`Completer`] is handed to whoever finishes the request and is consumed
//! by [`Completer::complete`], so a request resolves at most once. Dropping a
//! completer unresolved closes the paired [`Completion`].

use crate::shared::CameraError;
use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, sync_channel},
    time::Duration,
};

pub type CompletionResult<T> = Result<T, CameraError>;

type CompletionFn<T> = Box<dyn FnOnce(CompletionResult<T>) + Send + 'static>;

pub struct Completer<T> {
    inner: CompleterInner<T>,
}

enum CompleterInner<T> {
    Channel(SyncSender<CompletionResult<T>>),
    Callback(CompletionFn<T>),
}

impl<T: Send + 'static> Completer<T> {
    /// Creates a completer that calls `f` with the outcome.
    pub fn from_fn(f: impl FnOnce(CompletionResult<T>) + Send + 'static) -> Self {
        Self {
            inner: CompleterInner::Callback(Box::new(f)),
        }
    }

    /// Returns a completer that transforms the outcome with `f` before
    /// resolving `self`.
    pub fn map_with<U: Send + 'static>(
        self,
        f: impl FnOnce(CompletionResult<U>) -> CompletionResult<T> + Send + 'static,
    ) -> Completer<U> {
        Completer::from_fn(move |result| self.complete(f(result)))
    }

    pub fn complete(self, result: CompletionResult<T>) {
        match self.inner {
            CompleterInner::Channel(tx) => {
                let _ = tx.try_send(result);
            },
            CompleterInner::Callback(f) => f(result),
        }
    }

    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: CameraError) {
        self.complete(Err(error));
    }
}

impl<T> core::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.inner {
            CompleterInner::Channel(_) => write!(f, "Completer(channel)"),
            CompleterInner::Callback(_) => write!(f, "Completer(callback)"),
        }
    }
}

#[derive(Debug)]
pub struct Completion<T> {
    rx: Receiver<CompletionResult<T>>,
}

impl<T> Completion<T> {
    /// Blocks until the request resolves.
    pub fn wait(self) -> CompletionResult<T> {
        self.rx.recv().unwrap_or(Err(CameraError::Closed))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<CompletionResult<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(CameraError::Closed)),
        }
    }

    pub fn try_take(&self) -> Option<CompletionResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CameraError::Closed)),
        }
    }
}

/// Creates a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = sync_channel(1);
    (
        Completer {
            inner: CompleterInner::Channel(tx),
        },
        Completion { rx },
    )
}
