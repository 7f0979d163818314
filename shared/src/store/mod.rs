//! Persistence for users and projects.
//!
//! Every mutation is a single-document command so concurrent writers for the
//! same student serialize in the backing store instead of in process.

mod dynamo;
mod memory;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{Comment, Project, ProjectStatus, Submission, User};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("store backend: {0}")]
    Backend(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, email: &str) -> Result<Option<Project>, StoreError>;

    /// Insert a new project. Fails with `AlreadyExists` if one is already keyed by the email.
    async fn create_project(&self, project: &Project) -> Result<(), StoreError>;

    /// Append a submission, set the stage and reset status to `Pending Review`.
    async fn append_submission(
        &self,
        email: &str,
        submission: &Submission,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError>;

    /// Set the status, optionally appending a comment in the same write.
    async fn record_decision(
        &self,
        email: &str,
        status: ProjectStatus,
        comment: Option<&Comment>,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError>;

    async fn append_comment(
        &self,
        email: &str,
        comment: &Comment,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError>;

    async fn list_projects(&self, status: Option<ProjectStatus>)
        -> Result<Vec<Project>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Insert a new user. Fails with `AlreadyExists` if the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    /// Remove a user record. Deleting an absent user is not an error.
    async fn delete_user(&self, email: &str) -> Result<(), StoreError>;
}

fn missing_project(email: &str) -> StoreError {
    StoreError::NotFound(format!("No project found for {}", email))
}
