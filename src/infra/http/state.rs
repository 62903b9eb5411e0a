use std::sync::Arc;
use std::time::Duration;

use crate::application::auth::UserService;
use crate::application::documents::DocumentService;

#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentService>,
    pub users: Arc<UserService>,
}

/// Router-level limits.
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub max_request_bytes: usize,
    pub request_timeout: Duration,
}
