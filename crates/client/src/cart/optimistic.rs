//! Optimistic mutation with rollback.
//!
//! A mutation is applied to the local lines synchronously, before the remote
//! call is first polled. If the remote call fails the store either puts the
//! snapshot back or reloads the authoritative cart, then re-raises the
//! remote error.
//!
//! Restoring a snapshot is only safe when nothing else touched the lines in
//! the meantime, which is what the revision counter tracks. When it moved,
//! the store reloads instead so a neighbouring mutation that succeeded is
//! not thrown away.

use std::future::Future;

use emporium_core::CartLines;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{CartError, CartState, CartStore};
use crate::api::ApiError;

/// What to do with local state when the remote call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// Put the pre-mutation lines back.
    Snapshot,
    /// Replace local lines with the remote cart.
    Reload,
}

/// Lines as they were before a mutation, and the revision it produced.
#[derive(Default)]
struct Checkpoint {
    lines: CartLines,
    revision: u64,
}

/// Counts a mutation as in flight until dropped.
///
/// Loads wait for the count to reach zero before fetching, so a fetch can
/// never be answered from a server state that predates a local edit.
struct InFlight<'a> {
    state: &'a watch::Sender<CartState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            state.pending = state.pending.saturating_sub(1);
            state.pending == 0
        });
    }
}

impl CartStore {
    /// Apply `edit` locally, then await `remote`.
    ///
    /// `edit` must validate before changing anything and report whether it
    /// changed the lines; if it fails the remote call is never made.
    pub(super) async fn mutate<F, R>(
        &self,
        rollback: Rollback,
        edit: F,
        remote: R,
    ) -> Result<(), CartError>
    where
        F: FnOnce(&mut CartLines) -> Result<bool, CartError>,
        R: Future<Output = Result<(), ApiError>>,
    {
        let checkpoint = self.apply(edit)?;
        let in_flight = InFlight { state: &self.state };

        let result = remote.await;
        drop(in_flight);

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, ?rollback, "Cart mutation rejected, rolling back");
                self.roll_back(rollback, &checkpoint).await;
                Err(err.into())
            }
        }
    }

    /// Run `edit` and mark the mutation in flight. Subscribers are only
    /// notified when the lines changed.
    fn apply<F>(&self, edit: F) -> Result<Checkpoint, CartError>
    where
        F: FnOnce(&mut CartLines) -> Result<bool, CartError>,
    {
        let mut checkpoint = Checkpoint::default();
        let mut failure = None;
        self.state.send_if_modified(|state| {
            let before = state.lines.clone();
            match edit(&mut state.lines) {
                Ok(changed) => {
                    if changed {
                        state.revision += 1;
                    }
                    state.pending += 1;
                    checkpoint = Checkpoint {
                        lines: before,
                        revision: state.revision,
                    };
                    changed
                }
                Err(e) => {
                    state.lines = before;
                    failure = Some(e);
                    false
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(checkpoint),
        }
    }

    async fn roll_back(&self, rollback: Rollback, checkpoint: &Checkpoint) {
        if rollback == Rollback::Snapshot {
            if self.restore(checkpoint) {
                return;
            }
            debug!("Cart changed since the mutation, reloading instead of restoring");
        }

        if let Err(reload_err) = self.load().await {
            warn!(error = %reload_err, "Rollback reload failed");
            if self.restore(checkpoint) {
                debug!("Restored pre-mutation cart after failed reload");
            }
        }
    }

    /// Put the checkpoint's lines back if no other mutation happened since.
    fn restore(&self, checkpoint: &Checkpoint) -> bool {
        let mut restored = false;
        self.state.send_if_modified(|state| {
            if state.revision != checkpoint.revision {
                return false;
            }
            restored = true;
            if state.lines == checkpoint.lines {
                return false;
            }
            state.lines = checkpoint.lines.clone();
            state.revision += 1;
            true
        });
        restored
    }
}
