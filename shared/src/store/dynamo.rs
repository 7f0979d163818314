use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, Utc};

use super::{missing_project, ProjectStore, StoreError, UserStore};
use crate::types::{Comment, Project, ProjectStatus, Role, Submission, User};

const PROJECT_PREFIX: &str = "PROJECT#";
const PROJECT_SK: &str = "PROJECT";
const USER_PREFIX: &str = "USER#";
const USER_SK: &str = "PROFILE";

type Item = HashMap<String, AttributeValue>;

/// Single-table DynamoDB store.
///
/// Projects live at `PK=PROJECT#<email>, SK=PROJECT` with submissions and
/// comments as native lists, so appends are `list_append` updates.
/// Users live at `PK=USER#<email>, SK=PROFILE`.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Run an `update_item` against an existing project and return the new image.
    async fn update_project(
        &self,
        email: &str,
        update_expression: &str,
        names: &[(&str, &str)],
        values: Vec<(&str, AttributeValue)>,
    ) -> Result<Project, StoreError> {
        let pk = format!("{}{}", PROJECT_PREFIX, email);

        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(PROJECT_SK.to_string()))
            .update_expression(update_expression)
            .condition_expression("attribute_exists(PK)")
            .return_values(ReturnValue::AllNew);

        for (k, v) in names {
            builder = builder.expression_attribute_names(*k, *v);
        }
        for (k, v) in values {
            builder = builder.expression_attribute_values(k, v);
        }

        match builder.send().await {
            Ok(output) => {
                let item = output
                    .attributes()
                    .ok_or_else(|| StoreError::Corrupt("update returned no attributes".into()))?;
                project_from_item(item)
            }
            Err(e) => {
                let conditional = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if conditional {
                    Err(missing_project(email))
                } else {
                    tracing::error!("DynamoDB update_item failed for {}: {:?}", email, e);
                    Err(StoreError::Backend(format!("update_item failed: {}", e)))
                }
            }
        }
    }
}

#[async_trait]
impl ProjectStore for DynamoStore {
    async fn get_project(&self, email: &str) -> Result<Option<Project>, StoreError> {
        let pk = format!("{}{}", PROJECT_PREFIX, email);

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(PROJECT_SK.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("DynamoDB get_item failed for {}: {:?}", email, e);
                StoreError::Backend(format!("get_item failed: {}", e))
            })?;

        result.item().map(project_from_item).transpose()
    }

    async fn create_project(&self, project: &Project) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(project_to_item(project)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let conditional = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if conditional {
                    Err(StoreError::AlreadyExists(format!(
                        "Project already exists for {}",
                        project.student_email
                    )))
                } else {
                    tracing::error!(
                        "DynamoDB put_item failed for project {}: {:?}",
                        project.student_email,
                        e
                    );
                    Err(StoreError::Backend(format!("put_item failed: {}", e)))
                }
            }
        }
    }

    async fn append_submission(
        &self,
        email: &str,
        submission: &Submission,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        self.update_project(
            email,
            "SET #submissions = list_append(#submissions, :new), #stage = :stage, #status = :pending, #updated = :now",
            &[
                ("#submissions", "submissions"),
                ("#stage", "current_stage"),
                ("#status", "status"),
                ("#updated", "updated_at"),
            ],
            vec![
                (":new", AttributeValue::L(vec![submission_to_attr(submission)])),
                (":stage", AttributeValue::S(submission.stage.clone())),
                (
                    ":pending",
                    AttributeValue::S(ProjectStatus::PendingReview.as_str().to_string()),
                ),
                (":now", AttributeValue::S(at.to_rfc3339())),
            ],
        )
        .await
    }

    async fn record_decision(
        &self,
        email: &str,
        status: ProjectStatus,
        comment: Option<&Comment>,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        let mut values = vec![
            (":status", AttributeValue::S(status.as_str().to_string())),
            (":now", AttributeValue::S(at.to_rfc3339())),
        ];

        match comment {
            Some(comment) => {
                values.push((":new", AttributeValue::L(vec![comment_to_attr(comment)])));
                self.update_project(
                    email,
                    "SET #status = :status, #updated = :now, #comments = list_append(#comments, :new)",
                    &[
                        ("#status", "status"),
                        ("#updated", "updated_at"),
                        ("#comments", "comments"),
                    ],
                    values,
                )
                .await
            }
            None => {
                self.update_project(
                    email,
                    "SET #status = :status, #updated = :now",
                    &[("#status", "status"), ("#updated", "updated_at")],
                    values,
                )
                .await
            }
        }
    }

    async fn append_comment(
        &self,
        email: &str,
        comment: &Comment,
        at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        self.update_project(
            email,
            "SET #comments = list_append(#comments, :new), #updated = :now",
            &[("#comments", "comments"), ("#updated", "updated_at")],
            vec![
                (":new", AttributeValue::L(vec![comment_to_attr(comment)])),
                (":now", AttributeValue::S(at.to_rfc3339())),
            ],
        )
        .await
    }

    async fn list_projects(
        &self,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>, StoreError> {
        let mut filter = "begins_with(PK, :prefix)".to_string();
        if status.is_some() {
            filter.push_str(" AND #status = :status");
        }

        let mut projects = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let mut req = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(&filter)
                .expression_attribute_values(
                    ":prefix",
                    AttributeValue::S(PROJECT_PREFIX.to_string()),
                )
                .set_exclusive_start_key(start_key.take());
            if let Some(status) = status {
                req = req
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":status",
                        AttributeValue::S(status.as_str().to_string()),
                    );
            }

            let resp = req.send().await.map_err(|e| {
                tracing::error!("DynamoDB scan failed: {:?}", e);
                StoreError::Backend(format!("scan failed: {}", e))
            })?;

            for item in resp.items() {
                projects.push(project_from_item(item)?);
            }

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::info!("Scanned {} projects", projects.len());
        Ok(projects)
    }
}

#[async_trait]
impl UserStore for DynamoStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        let pk = format!("{}{}", USER_PREFIX, email);

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(USER_SK.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("DynamoDB get_item failed for user {}: {:?}", email, e);
                StoreError::Backend(format!("get_item failed: {}", e))
            })?;

        result.item().map(user_from_item).transpose()
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let pk = format!("{}{}", USER_PREFIX, user.email);

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(pk))
            .item("SK", AttributeValue::S(USER_SK.to_string()))
            .item("email", AttributeValue::S(user.email.clone()))
            .item("first_name", AttributeValue::S(user.first_name.clone()))
            .item("last_name", AttributeValue::S(user.last_name.clone()))
            .item("reg_number", AttributeValue::S(user.reg_number.clone()))
            .item("program", AttributeValue::S(user.program.clone()))
            .item("role", AttributeValue::S(user.role.as_str().to_string()))
            .item("created_at", AttributeValue::S(user.created_at.to_rfc3339()))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let conditional = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if conditional {
                    Err(StoreError::AlreadyExists(format!(
                        "An account with {} already exists",
                        user.email
                    )))
                } else {
                    tracing::error!("DynamoDB put_item failed for user {}: {:?}", user.email, e);
                    Err(StoreError::Backend(format!("put_item failed: {}", e)))
                }
            }
        }
    }

    async fn delete_user(&self, email: &str) -> Result<(), StoreError> {
        let pk = format!("{}{}", USER_PREFIX, email);

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(USER_SK.to_string()))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("DynamoDB delete_item failed for user {}: {:?}", email, e);
                StoreError::Backend(format!("delete_item failed: {}", e))
            })?;

        Ok(())
    }
}

// ========== ITEM MAPPING ==========

fn project_to_item(project: &Project) -> Item {
    let pk = format!("{}{}", PROJECT_PREFIX, project.student_email);

    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk));
    item.insert("SK".to_string(), AttributeValue::S(PROJECT_SK.to_string()));
    item.insert(
        "student_email".to_string(),
        AttributeValue::S(project.student_email.clone()),
    );
    item.insert(
        "student_name".to_string(),
        AttributeValue::S(project.student_name.clone()),
    );
    item.insert(
        "reg_number".to_string(),
        AttributeValue::S(project.reg_number.clone()),
    );
    item.insert("program".to_string(), AttributeValue::S(project.program.clone()));
    item.insert(
        "submissions".to_string(),
        AttributeValue::L(project.submissions.iter().map(submission_to_attr).collect()),
    );
    item.insert(
        "comments".to_string(),
        AttributeValue::L(project.comments.iter().map(comment_to_attr).collect()),
    );
    item.insert(
        "current_stage".to_string(),
        AttributeValue::S(project.current_stage.clone()),
    );
    item.insert(
        "status".to_string(),
        AttributeValue::S(project.status.as_str().to_string()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(project.created_at.to_rfc3339()),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(project.updated_at.to_rfc3339()),
    );
    item
}

fn project_from_item(item: &Item) -> Result<Project, StoreError> {
    Ok(Project {
        student_email: get_s(item, "student_email")?,
        student_name: get_s(item, "student_name").unwrap_or_default(),
        reg_number: get_s(item, "reg_number").unwrap_or_default(),
        program: get_s(item, "program").unwrap_or_default(),
        submissions: get_list(item, "submissions")?
            .iter()
            .map(submission_from_attr)
            .collect::<Result<_, _>>()?,
        comments: get_list(item, "comments")?
            .iter()
            .map(comment_from_attr)
            .collect::<Result<_, _>>()?,
        current_stage: get_s(item, "current_stage").unwrap_or_default(),
        status: get_s(item, "status")?
            .parse()
            .map_err(StoreError::Corrupt)?,
        created_at: get_time(item, "created_at")?,
        updated_at: get_time(item, "updated_at")?,
    })
}

fn user_from_item(item: &Item) -> Result<User, StoreError> {
    Ok(User {
        email: get_s(item, "email")?,
        first_name: get_s(item, "first_name").unwrap_or_default(),
        last_name: get_s(item, "last_name").unwrap_or_default(),
        reg_number: get_s(item, "reg_number").unwrap_or_default(),
        program: get_s(item, "program").unwrap_or_default(),
        role: get_s(item, "role")?.parse().map_err(StoreError::Corrupt)?,
        created_at: get_time(item, "created_at")?,
    })
}

fn submission_to_attr(submission: &Submission) -> AttributeValue {
    let mut map = HashMap::new();
    map.insert("stage".to_string(), AttributeValue::S(submission.stage.clone()));
    map.insert(
        "file_url".to_string(),
        AttributeValue::S(submission.file_url.clone()),
    );
    map.insert(
        "submitted_at".to_string(),
        AttributeValue::S(submission.submitted_at.to_rfc3339()),
    );
    AttributeValue::M(map)
}

fn submission_from_attr(value: &AttributeValue) -> Result<Submission, StoreError> {
    let map = value
        .as_m()
        .map_err(|_| StoreError::Corrupt("submission is not a map".into()))?;
    Ok(Submission {
        stage: get_s(map, "stage")?,
        file_url: get_s(map, "file_url")?,
        submitted_at: get_time(map, "submitted_at")?,
    })
}

fn comment_to_attr(comment: &Comment) -> AttributeValue {
    let mut map = HashMap::new();
    map.insert("text".to_string(), AttributeValue::S(comment.text.clone()));
    map.insert("author".to_string(), AttributeValue::S(comment.author.clone()));
    map.insert(
        "created_at".to_string(),
        AttributeValue::S(comment.created_at.to_rfc3339()),
    );
    AttributeValue::M(map)
}

fn comment_from_attr(value: &AttributeValue) -> Result<Comment, StoreError> {
    let map = value
        .as_m()
        .map_err(|_| StoreError::Corrupt("comment is not a map".into()))?;
    Ok(Comment {
        text: get_s(map, "text")?,
        author: get_s(map, "author").unwrap_or_default(),
        created_at: get_time(map, "created_at")?,
    })
}

fn get_s(item: &Item, key: &str) -> Result<String, StoreError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| StoreError::Corrupt(format!("missing string attribute {}", key)))
}

fn get_list<'a>(item: &'a Item, key: &str) -> Result<&'a [AttributeValue], StoreError> {
    match item.get(key) {
        None => Ok(&[]),
        Some(v) => v
            .as_l()
            .map(|l| l.as_slice())
            .map_err(|_| StoreError::Corrupt(format!("attribute {} is not a list", key))),
    }
}

fn get_time(item: &Item, key: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = get_s(item, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp in {}: {}", key, e)))
}
