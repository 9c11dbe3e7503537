// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Optimistic update with exact rollback.
//!
//! A [`Reversible`] delta is applied to local state right away, the remote
//! operation is awaited without holding the lock, and on failure the exact
//! inverse is applied. Rollback never reverts to a snapshot, so concurrent
//! successful updates made in between survive.

use crate::error::Result;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

/// A change to `S` that can be undone exactly.
pub trait Reversible<S> {
    fn apply(&self, state: &mut S);
    fn revert(&self, state: &mut S);
}

/// A delta that has been applied locally and awaits the remote outcome.
#[must_use = "a pending delta must be settled or rolled back"]
#[derive(Debug)]
pub struct Pending<D> {
    delta: D,
}

impl<D> Pending<D> {
    /// Apply `delta` to `state`. Call with the state lock already held so the
    /// apply is atomic with any precondition checks.
    pub fn apply<S>(state: &mut S, delta: D) -> Self
    where
        D: Reversible<S>,
    {
        delta.apply(state);
        Self { delta }
    }

    /// Remote side confirmed; keep the local change.
    pub fn commit(self) -> D {
        self.delta
    }

    /// Remote side failed; undo exactly what was applied.
    pub fn rollback<S>(self, state: &mut S)
    where
        D: Reversible<S>,
    {
        self.delta.revert(state);
    }
}

/// Lock a state mutex, recovering the data if a previous holder panicked.
pub fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Await `remote` and roll `pending` back on failure.
///
/// The lock is only taken again if a rollback is needed.
pub async fn settle<S, D, T, F>(state: &Mutex<S>, pending: Pending<D>, remote: F) -> Result<T>
where
    D: Reversible<S>,
    F: Future<Output = Result<T>>,
{
    match remote.await {
        Ok(value) => {
            pending.commit();
            Ok(value)
        }
        Err(err) => {
            let mut guard = lock(state);
            pending.rollback(&mut *guard);
            Err(err)
        }
    }
}
