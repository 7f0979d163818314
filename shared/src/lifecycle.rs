//! Submission and review lifecycle of a thesis project.
//!
//! Status graph, with no terminal state:
//!
//! ```text
//!   Pending Review --decision--> Approved | Rejected
//!   Approved <--decision--> Rejected
//!   Approved | Rejected --submit--> Pending Review
//! ```
//!
//! Authorization is not checked here; callers go through [`crate::policy`] first.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::PortalError;
use crate::store::{ProjectStore, StoreError, UserStore};
use crate::types::{
    is_known_stage, normalize_email, Comment, Project, ProjectFilter, ProjectStatus, ProjectView,
    Submission,
};

/// Placeholder for profile fields when the student has no registered profile
pub const UNKNOWN_PROFILE_FIELD: &str = "N/A";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct ProjectLifecycle {
    projects: Arc<dyn ProjectStore>,
    users: Arc<dyn UserStore>,
    clock: Clock,
}

impl ProjectLifecycle {
    pub fn new(projects: Arc<dyn ProjectStore>, users: Arc<dyn UserStore>) -> Self {
        Self::with_clock(projects, users, Arc::new(Utc::now))
    }

    pub fn with_clock(
        projects: Arc<dyn ProjectStore>,
        users: Arc<dyn UserStore>,
        clock: Clock,
    ) -> Self {
        Self {
            projects,
            users,
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Record a new submission, creating the student's project on first upload.
    ///
    /// `file_url` must already point at a stored object. Every submission resets
    /// the status to `Pending Review`, including after an approval.
    pub async fn submit(
        &self,
        student_email: &str,
        student_name: &str,
        stage: &str,
        file_url: &str,
    ) -> Result<Project, PortalError> {
        let email = normalize_email(student_email);
        if email.is_empty() {
            return Err(PortalError::validation("Student email is required"));
        }
        let file_url = file_url.trim();
        if file_url.is_empty() {
            return Err(PortalError::validation("A submitted file is required"));
        }
        let stage = stage.trim();
        if stage.is_empty() {
            return Err(PortalError::validation("Stage is required"));
        }
        if !is_known_stage(stage) {
            tracing::warn!("Unrecognised stage label {:?} from {}", stage, email);
        }

        let existing = self.projects.get_project(&email).await?;
        let now = self.now();
        // Keep submission timestamps non-decreasing even if the clock steps back
        let submitted_at = existing
            .as_ref()
            .and_then(|p| p.latest_submission())
            .map_or(now, |last| last.submitted_at.max(now));
        let submission = Submission {
            stage: stage.to_string(),
            file_url: file_url.to_string(),
            submitted_at,
        };

        if existing.is_none() {
            let project = self
                .new_project(&email, student_name, submission.clone(), now)
                .await?;
            match self.projects.create_project(&project).await {
                Ok(()) => {
                    tracing::info!("Created project for {} with {} submission", email, stage);
                    return Ok(project);
                }
                // Lost a create race; append to the project the other writer made
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::info!("Project for {} created concurrently; appending", email);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let project = self
            .projects
            .append_submission(&email, &submission, now)
            .await?;
        tracing::info!(
            "Appended {} submission for {} ({} total)",
            stage,
            email,
            project.submissions.len()
        );
        Ok(project)
    }

    async fn new_project(
        &self,
        email: &str,
        student_name: &str,
        first: Submission,
        now: DateTime<Utc>,
    ) -> Result<Project, PortalError> {
        let profile = self.users.get_user(email).await?;

        let (student_name, reg_number, program) = match profile {
            Some(user) => (user.full_name(), user.reg_number, user.program),
            None => {
                tracing::info!("No registered profile for {}; using submitted name", email);
                let name = student_name.trim();
                (
                    if name.is_empty() { email } else { name }.to_string(),
                    UNKNOWN_PROFILE_FIELD.to_string(),
                    UNKNOWN_PROFILE_FIELD.to_string(),
                )
            }
        };

        Ok(Project {
            student_email: email.to_string(),
            student_name,
            reg_number,
            program,
            current_stage: first.stage.clone(),
            submissions: vec![first],
            comments: Vec::new(),
            status: ProjectStatus::PendingReview,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a reviewer's verdict.
    ///
    /// `decision` must be `Approved` or `Rejected`; a rejection must carry
    /// feedback. Decisions may be reversed without a new submission.
    pub async fn review_decision(
        &self,
        student_email: &str,
        decision: &str,
        feedback: Option<&str>,
        reviewer: &str,
    ) -> Result<Project, PortalError> {
        let email = normalize_email(student_email);
        if email.is_empty() {
            return Err(PortalError::validation("Student email is required"));
        }

        let status = match decision.parse::<ProjectStatus>() {
            Ok(s @ (ProjectStatus::Approved | ProjectStatus::Rejected)) => s,
            _ => {
                return Err(PortalError::validation(format!(
                    "Decision must be Approved or Rejected, got {:?}",
                    decision
                )))
            }
        };

        let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
        if status == ProjectStatus::Rejected && feedback.is_none() {
            return Err(PortalError::validation(
                "A rejection must include feedback for the student",
            ));
        }

        let now = self.now();
        let comment = feedback.map(|text| Comment {
            text: text.to_string(),
            author: reviewer.to_string(),
            created_at: now,
        });

        let project = self
            .projects
            .record_decision(&email, status, comment.as_ref(), now)
            .await?;
        tracing::info!("Project for {} marked {} by {}", email, status, reviewer);
        Ok(project)
    }

    /// Attach a reviewer comment without touching the status
    pub async fn add_comment(
        &self,
        student_email: &str,
        author: &str,
        text: &str,
    ) -> Result<Project, PortalError> {
        let email = normalize_email(student_email);
        if email.is_empty() {
            return Err(PortalError::validation("Student email is required"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(PortalError::validation("Comment text is required"));
        }

        let now = self.now();
        let comment = Comment {
            text: text.to_string(),
            author: author.to_string(),
            created_at: now,
        };
        let project = self.projects.append_comment(&email, &comment, now).await?;
        tracing::info!("Comment added to project for {} by {}", email, author);
        Ok(project)
    }

    /// Current state of a student's project; a missing project is `Not Started`.
    pub async fn get_status(&self, student_email: &str) -> Result<ProjectView, PortalError> {
        let email = normalize_email(student_email);
        if email.is_empty() {
            return Ok(ProjectView::not_started());
        }
        Ok(self
            .projects
            .get_project(&email)
            .await?
            .map_or_else(ProjectView::not_started, ProjectView::from))
    }

    /// All projects matching `filter`, most recently updated first
    pub async fn list_all(&self, filter: &ProjectFilter) -> Result<Vec<Project>, PortalError> {
        let mut projects: Vec<Project> = self
            .projects
            .list_projects(filter.status)
            .await?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();
        projects.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.student_email.cmp(&b.student_email))
        });
        Ok(projects)
    }
}
