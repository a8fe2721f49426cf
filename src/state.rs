//! Application state management

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::config::Config;
use crate::store::GameStore;
use crate::sync::{PullResponder, Reconciler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn GameStore>,
    verifier: Arc<dyn IdentityVerifier>,
    reconciler: Reconciler,
    pull: PullResponder,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn GameStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let reconciler = Reconciler::with_max_attempts(store.clone(), config.sync.max_attempts);
        let pull = PullResponder::with_max_page_size(store.clone(), config.sync.max_page_size);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                verifier,
                reconciler,
                pull,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the game store
    pub fn store(&self) -> &dyn GameStore {
        self.inner.store.as_ref()
    }

    pub fn verifier(&self) -> &dyn IdentityVerifier {
        self.inner.verifier.as_ref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn pull(&self) -> &PullResponder {
        &self.inner.pull
    }
}
