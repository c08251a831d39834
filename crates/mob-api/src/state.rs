//! Application state shared across all route handlers.

use std::sync::Arc;

use mob_action::Dispatcher;
use mob_chat::ChatOrchestrator;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub chat: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, chat: ChatOrchestrator) -> Self {
        Self {
            dispatcher,
            chat: Arc::new(chat),
        }
    }
}
