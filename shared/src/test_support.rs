//! In-memory stand-ins for Cognito and S3, for handler and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::identity::{AuthTokens, IdentityError, IdentityStore, ResetDelivery};
use crate::storage::{references_submission, ObjectStorage, PresignedUpload, StorageError};
use crate::store::MemoryStore;
use crate::AppState;

pub const SUPERVISOR_EMAIL: &str = "prof@uni.edu";

pub fn test_config() -> Config {
    Config {
        table_name: "thesis-portal-test".to_string(),
        upload_bucket: "thesis-uploads-test".to_string(),
        cognito_client_id: "client".to_string(),
        cognito_client_secret: "secret".to_string(),
        cognito_user_pool_id: None,
        supervisor_email: SUPERVISOR_EMAIL.to_string(),
        supervisor_name: "Supervisor".to_string(),
        trust_identity_headers: true,
        presign_expiry: Duration::from_secs(900),
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    accounts: RwLock<HashMap<String, String>>,
}

impl FakeIdentity {
    pub const RESET_CODE: &'static str = "123456";

    pub fn token_for(email: &str) -> String {
        format!("id-token-for-{}", email)
    }

    pub async fn has_account(&self, email: &str) -> bool {
        self.accounts.read().await.contains_key(email)
    }
}

#[async_trait]
impl IdentityStore for FakeIdentity {
    async fn register(&self, email: &str, password: &str) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(IdentityError::AlreadyExists(
                "An account with this email already exists".to_string(),
            ));
        }
        accounts.insert(email.to_string(), password.to_string());
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError> {
        match self.accounts.read().await.get(email) {
            Some(stored) if stored == password => Ok(AuthTokens {
                id_token: Self::token_for(email),
                access_token: format!("access-{}", email),
                refresh_token: format!("refresh-{}", email),
                expires_in: 3600,
            }),
            _ => Err(IdentityError::InvalidCredentials(
                "Invalid email or password".to_string(),
            )),
        }
    }

    async fn reset_credential(&self, email: &str) -> Result<ResetDelivery, IdentityError> {
        if !self.has_account(email).await {
            return Err(IdentityError::NotFound("User not found".to_string()));
        }
        Ok(ResetDelivery {
            destination: Some(email.to_string()),
            medium: Some("EMAIL".to_string()),
        })
    }

    async fn confirm_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        if code != Self::RESET_CODE {
            return Err(IdentityError::InvalidInput(
                "Invalid verification code".to_string(),
            ));
        }
        match self.accounts.write().await.get_mut(email) {
            Some(password) => {
                *password = new_password.to_string();
                Ok(())
            }
            None => Err(IdentityError::NotFound("User not found".to_string())),
        }
    }
}

/// Object storage that remembers what was put and can be told to fail
#[derive(Default)]
pub struct FakeStorage {
    puts: Mutex<Vec<(String, usize)>>,
    failing: AtomicBool,
}

impl FakeStorage {
    pub fn fail_uploads(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Keys and sizes of stored objects, in upload order
    pub fn puts(&self) -> Vec<(String, usize)> {
        self.puts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    const BASE_URL: &'static str = "https://uploads.test";

    fn url(key: &str) -> String {
        format!("{}/{}", Self::BASE_URL, key)
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("bucket unavailable".to_string()));
        }
        if let Ok(mut puts) = self.puts.lock() {
            puts.push((key.to_string(), bytes.len()));
        }
        Ok(Self::url(key))
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        Ok(PresignedUpload {
            upload_url: format!("{}?signature=test", Self::url(key)),
            method: "PUT",
            content_type: content_type.to_string(),
            file_url: Self::url(key),
            expires_in: expires_in.as_secs(),
        })
    }

    fn is_submission_reference(&self, student_email: &str, url: &str) -> bool {
        references_submission(Self::BASE_URL, student_email, url)
    }
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub identity: Arc<FakeIdentity>,
    pub storage: Arc<FakeStorage>,
}

pub fn test_harness() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let identity = Arc::new(FakeIdentity::default());
    let storage = Arc::new(FakeStorage::default());
    let state = AppState::new(
        test_config(),
        store.clone(),
        store,
        identity.clone(),
        storage.clone(),
    );
    TestHarness {
        state,
        identity,
        storage,
    }
}

pub fn test_state() -> (Arc<AppState>, Arc<FakeIdentity>) {
    let harness = test_harness();
    (harness.state, harness.identity)
}
