use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stage labels the portal recognises. Anything else is accepted as free text.
pub const KNOWN_STAGES: &[&str] = &[
    "Proposal",
    "Chapter 1",
    "Chapter 2",
    "Chapter 3",
    "Final Thesis",
];

pub fn is_known_stage(stage: &str) -> bool {
    KNOWN_STAGES.iter().any(|s| s.eq_ignore_ascii_case(stage))
}

/// Lower-case, trimmed form used as the lookup key for users and projects.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reg_number: String,
    pub program: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub reg_number: String,
    pub program: String,
}

// ========== PROJECT ==========
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    #[default]
    #[serde(rename = "Pending Review")]
    PendingReview,
    Approved,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::PendingReview => "Pending Review",
            ProjectStatus::Approved => "Approved",
            ProjectStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("Pending Review") {
            Ok(ProjectStatus::PendingReview)
        } else if s.eq_ignore_ascii_case("Approved") {
            Ok(ProjectStatus::Approved)
        } else if s.eq_ignore_ascii_case("Rejected") {
            Ok(ProjectStatus::Rejected)
        } else {
            Err(format!("unknown status: {}", s))
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Submission {
    pub stage: String,
    pub file_url: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Project {
    pub student_email: String,
    pub student_name: String,
    pub reg_number: String,
    pub program: String,
    pub submissions: Vec<Submission>,
    pub comments: Vec<Comment>,
    pub current_stage: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn latest_submission(&self) -> Option<&Submission> {
        self.submissions.last()
    }

    /// Most recent reviewer comment, exposed to students as the current feedback.
    pub fn feedback(&self) -> Option<&str> {
        self.comments.last().map(|c| c.text.as_str())
    }
}

/// Response shape for `GET /api/status/{email}`
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProjectView {
    Active(ActiveProjectView),
    NotStarted(NotStartedView),
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ActiveProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub feedback: Option<String>,
    pub latest_submission: Option<Submission>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NotStartedView {
    pub status: &'static str,
    pub submissions: Vec<Submission>,
    pub comments: Vec<Comment>,
}

impl ProjectView {
    pub const NOT_STARTED: &'static str = "Not Started";

    pub fn not_started() -> Self {
        ProjectView::NotStarted(NotStartedView {
            status: Self::NOT_STARTED,
            submissions: Vec::new(),
            comments: Vec::new(),
        })
    }

    pub fn is_started(&self) -> bool {
        matches!(self, ProjectView::Active(_))
    }
}

impl From<Project> for ProjectView {
    fn from(project: Project) -> Self {
        let feedback = project.feedback().map(|s| s.to_string());
        let latest_submission = project.latest_submission().cloned();
        ProjectView::Active(ActiveProjectView {
            project,
            feedback,
            latest_submission,
        })
    }
}

/// Reviewer-side listing filter
#[derive(Debug, Default, Clone)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(status) = self.status {
            if project.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                project.student_name.to_lowercase().contains(&needle)
                    || project.student_email.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

// ========== REQUESTS ==========
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub student_email: String,
    #[serde(default)]
    pub student_name: String,
    pub stage: String,
    /// Reference to an object already uploaded through a presigned URL
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_data: Option<String>, // base64 encoded
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub email: String,
    pub status: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub email: String,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub student_email: String,
    pub file_name: String,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_projects_default_to_pending_review() {
        assert_eq!(ProjectStatus::default(), ProjectStatus::PendingReview);
    }

    #[test]
    fn status_uses_display_labels_on_the_wire() {
        let json = serde_json::to_string(&ProjectStatus::PendingReview).unwrap();
        assert_eq!(json, "\"Pending Review\"");
        let parsed: ProjectStatus = serde_json::from_str("\"Rejected\"").unwrap();
        assert_eq!(parsed, ProjectStatus::Rejected);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "pending review".parse::<ProjectStatus>(),
            Ok(ProjectStatus::PendingReview)
        );
        assert_eq!(" APPROVED ".parse::<ProjectStatus>(), Ok(ProjectStatus::Approved));
        assert!("Not Started".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn not_started_view_serializes_as_sentinel() {
        let value = serde_json::to_value(ProjectView::not_started()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "Not Started", "submissions": [], "comments": []})
        );
    }

    #[test]
    fn filter_matches_name_or_email_substring() {
        let now = Utc::now();
        let project = Project {
            student_email: "ada@uni.edu".to_string(),
            student_name: "Ada Lovelace".to_string(),
            reg_number: "R-1".to_string(),
            program: "CS".to_string(),
            submissions: Vec::new(),
            comments: Vec::new(),
            current_stage: "Proposal".to_string(),
            status: ProjectStatus::Approved,
            created_at: now,
            updated_at: now,
        };

        let by_name = ProjectFilter {
            status: None,
            search: Some("LOVE".to_string()),
        };
        let by_email = ProjectFilter {
            status: Some(ProjectStatus::Approved),
            search: Some("uni.edu".to_string()),
        };
        let wrong_status = ProjectFilter {
            status: Some(ProjectStatus::Rejected),
            search: None,
        };

        assert!(by_name.matches(&project));
        assert!(by_email.matches(&project));
        assert!(!wrong_status.matches(&project));
        assert!(ProjectFilter::default().matches(&project));
    }
}
