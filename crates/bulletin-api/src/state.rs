use std::sync::Arc;

use crate::coordinator::Coordinator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub coordinator: Coordinator,
}
