use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{missing_project, ProjectStore, StoreError, UserStore};
use crate::types::{Comment, Project, ProjectStatus, Submission, User};

/// In-memory store. State is held in `RwLock`ed maps and lost on restart.
pub struct MemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    users: RwLock<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    async fn update<F>(&self, email: &str, mutate: F) -> Result<Project, StoreError>
    where
        F: FnOnce(&mut Project),
    {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(email)
            .ok_or_else(|| missing_project(email))?;
        mutate(project);
        Ok(project.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get_project(&self, email: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(email).cloned())
    }

    async fn create_project(&self, project: &Project) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.student_email) {
            return Err(StoreError::AlreadyExists(format!(
                "Project already exists for {}",
                project.student_email
            )));
        }
        projects.insert(project.student_email.clone(), project.clone());
        Ok(())
    }

    async fn append_submission(
        &self,
        email: &str,
        submission: &Submission,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        self.update(email, |project| {
            project.submissions.push(submission.clone());
            project.current_stage = submission.stage.clone();
            project.status = ProjectStatus::PendingReview;
            project.updated_at = at;
        })
        .await
    }

    async fn record_decision(
        &self,
        email: &str,
        status: ProjectStatus,
        comment: Option<&Comment>,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        self.update(email, |project| {
            project.status = status;
            if let Some(comment) = comment {
                project.comments.push(comment.clone());
            }
            project.updated_at = at;
        })
        .await
    }

    async fn append_comment(
        &self,
        email: &str,
        comment: &Comment,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        self.update(email, |project| {
            project.comments.push(comment.clone());
            project.updated_at = at;
        })
        .await
    }

    async fn list_projects(
        &self,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>, StoreError> {
        let projects = self.projects.read().await;
        Ok(projects
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(StoreError::AlreadyExists(format!(
                "An account with {} already exists",
                user.email
            )));
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, email: &str) -> Result<(), StoreError> {
        self.users.write().await.remove(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn project(email: &str) -> Project {
        let now = Utc::now();
        Project {
            student_email: email.to_string(),
            student_name: "Ada".to_string(),
            reg_number: "R-1".to_string(),
            program: "CS".to_string(),
            submissions: Vec::new(),
            comments: Vec::new(),
            current_stage: String::new(),
            status: ProjectStatus::Approved,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_project_is_unique_per_email() {
        let store = MemoryStore::new();
        store.create_project(&project("a@x.com")).await.unwrap();
        let err = store.create_project(&project("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn append_submission_reopens_review() {
        let store = MemoryStore::new();
        store.create_project(&project("a@x.com")).await.unwrap();
        let submission = Submission {
            stage: "Chapter 1".to_string(),
            file_url: "f1".to_string(),
            submitted_at: Utc::now(),
        };
        let updated = store
            .append_submission("a@x.com", &submission, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::PendingReview);
        assert_eq!(updated.current_stage, "Chapter 1");
        assert_eq!(updated.submissions, vec![submission]);
    }

    #[tokio::test]
    async fn mutations_on_missing_project_are_not_found() {
        let store = MemoryStore::new();
        let err = store
            .record_decision("nobody@x.com", ProjectStatus::Approved, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn users_are_unique_per_email() {
        let store = MemoryStore::new();
        let user = User {
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            reg_number: "R-1".to_string(),
            program: "CS".to_string(),
            role: Role::Student,
            created_at: Utc::now(),
        };
        store.create_user(&user).await.unwrap();
        assert!(store.create_user(&user).await.is_err());
        assert_eq!(store.get_user("a@x.com").await.unwrap(), Some(user.clone()));

        store.delete_user("a@x.com").await.unwrap();
        assert_eq!(store.get_user("a@x.com").await.unwrap(), None);
        store.delete_user("a@x.com").await.unwrap();
        store.create_user(&user).await.unwrap();
    }
}
