pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod policy;
pub mod projects;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;
pub mod users;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::Arc;

use config::Config;
use identity::IdentityStore;
use lifecycle::ProjectLifecycle;
use storage::ObjectStorage;
use store::{ProjectStore, UserStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub lifecycle: ProjectLifecycle,
    pub users: Arc<dyn UserStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    pub fn new(
        config: Config,
        projects: Arc<dyn ProjectStore>,
        users: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            lifecycle: ProjectLifecycle::new(projects, users.clone()),
            users,
            identity,
            storage,
        })
    }
}
