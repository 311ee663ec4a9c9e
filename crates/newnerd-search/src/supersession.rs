//! Per-owner search supersession.
//!
//! Each owner scope has at most one live search. Beginning a new search
//! cancels the token of the previous one, so its lookups are dropped and its
//! result is never delivered.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use newnerd_core::OwnerScope;

/// Handle for one in-flight search.
#[derive(Debug, Clone)]
pub struct SearchTicket {
    scope: OwnerScope,
    generation: u64,
    token: CancellationToken,
}

impl SearchTicket {
    pub fn scope(&self) -> &OwnerScope {
        &self.scope
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once a newer search for the same scope has begun.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when this ticket is superseded.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[derive(Default)]
struct State {
    next_generation: u64,
    active: HashMap<OwnerScope, (u64, CancellationToken)>,
}

/// Registry of the latest search per owner scope.
#[derive(Default)]
pub struct SearchSupersession {
    state: Mutex<State>,
}

impl SearchSupersession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new search for `scope`, cancelling the previous one.
    pub fn begin(&self, scope: OwnerScope) -> SearchTicket {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_generation += 1;
        let generation = state.next_generation;
        let token = CancellationToken::new();

        if let Some((previous, old_token)) = state.active.insert(scope, (generation, token.clone()))
        {
            old_token.cancel();
            debug!(
                subsystem = "search",
                component = "supersession",
                owner_kind = %scope.kind,
                owner_id = %scope.owner_id,
                superseded = previous,
                generation,
                "Superseded in-flight search"
            );
        }

        SearchTicket {
            scope,
            generation,
            token,
        }
    }

    /// Release the slot held by `ticket`, if it is still the latest one.
    pub fn finish(&self, ticket: &SearchTicket) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let is_latest = state
            .active
            .get(&ticket.scope)
            .is_some_and(|(generation, _)| *generation == ticket.generation);
        if is_latest {
            state.active.remove(&ticket.scope);
        }
    }

    /// Whether `ticket` is still the latest search for its scope.
    #[cfg(test)]
    fn is_current(&self, ticket: &SearchTicket) -> bool {
        if ticket.is_cancelled() {
            return false;
        }
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .active
            .get(&ticket.scope)
            .is_some_and(|(generation, _)| *generation == ticket.generation)
    }

    /// Number of scopes with a live search.
    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .len()
    }
}
