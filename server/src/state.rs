use common::JobManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: JobManager,
}

impl AppState {
    pub fn new(manager: JobManager) -> Self {
        Self { manager }
    }
}
