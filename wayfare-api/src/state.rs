use std::sync::Arc;
use wayfare_catalog::PriceCalculator;
use wayfare_order::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub calculator: PriceCalculator,
    /// Events buffered per SSE subscriber before it starts lagging
    pub event_buffer: usize,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, event_buffer: usize) -> Self {
        Self {
            sessions,
            calculator: PriceCalculator::default(),
            event_buffer: event_buffer.max(1),
        }
    }
}
