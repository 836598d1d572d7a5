//! Shared application state for the HTTP server.

use std::sync::Arc;

use coder::cycle::CycleController;

/// Shared state accessible from all request handlers.
///
/// One controller serves every request; each request owns its own run state.
pub struct AppState<C, S> {
    pub controller: Arc<CycleController<C, S>>,
}

impl<C, S> AppState<C, S> {
    pub fn new(controller: CycleController<C, S>) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}

// Manual impl: cloning only bumps the `Arc`, so `C` and `S` need not be `Clone`.
impl<C, S> Clone for AppState<C, S> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
        }
    }
}
