use base64::{engine::general_purpose, Engine as _};
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::error::PortalError;
use crate::http::{parse_body, respond};
use crate::policy::{can_review, can_upload_for, can_view, Identity};
use crate::storage::{submission_key, PresignedUpload};
use crate::types::{
    normalize_email, CommentRequest, Project, ProjectFilter, ProjectStatus, ProjectView,
    ReviewRequest, SubmitRequest, UploadUrlRequest,
};
use crate::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn forbidden(action: &str) -> PortalError {
    PortalError::Forbidden(format!("Not allowed to {}", action))
}

/// Decode an upload payload, accepting either bare base64 or a `data:` URL
fn decode_file_data(data: &str) -> Result<Vec<u8>, PortalError> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| PortalError::validation(format!("Failed to decode base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(PortalError::validation("Uploaded file is empty"));
    }
    Ok(bytes)
}

/// Submit a thesis document. The file is either uploaded inline (base64) or
/// was put through a presigned URL beforehand.
pub async fn submit(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let start = std::time::Instant::now();
    let result = submit_document(state, caller, body).await;
    tracing::info!("[SUBMIT] Completed in {:?}", start.elapsed());
    respond(StatusCode::CREATED, result)
}

async fn submit_document(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<Project, PortalError> {
    let req: SubmitRequest = parse_body(body)?;

    let email = normalize_email(&req.student_email);
    if email.is_empty() {
        return Err(PortalError::validation("Student email is required"));
    }
    if !can_upload_for(caller, &email) {
        tracing::warn!("{} tried to submit for {}", caller.email, email);
        return Err(forbidden("submit for another student"));
    }
    if req.stage.trim().is_empty() {
        return Err(PortalError::validation("Stage is required"));
    }

    let inline = req.file_data.as_deref().filter(|d| !d.trim().is_empty());
    let referenced = req.file_url.as_deref().map(str::trim).filter(|u| !u.is_empty());

    let file_url = match (inline, referenced) {
        (Some(data), None) => {
            let bytes = decode_file_data(data)?;
            let file_name = req.file_name.as_deref().unwrap_or_default();
            let content_type = req
                .content_type
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE);
            let key = submission_key(&email, file_name);
            tracing::info!("[SUBMIT] Uploading {} bytes for {} to {}", bytes.len(), email, key);
            state.storage.put_object(&key, bytes, content_type).await?
        }
        (None, Some(url)) => {
            if !state.storage.is_submission_reference(&email, url) {
                tracing::warn!("{} submitted a foreign file reference for {}", caller.email, email);
                return Err(PortalError::validation(format!(
                    "file_url must reference an upload made for {}",
                    email
                )));
            }
            url.to_string()
        }
        (Some(_), Some(_)) => {
            return Err(PortalError::validation(
                "Provide either file_data or file_url, not both",
            ))
        }
        (None, None) => return Err(PortalError::validation("A submitted file is required")),
    };

    let student_name = if req.student_name.trim().is_empty() && caller.email == email {
        caller.display_name.clone().unwrap_or_default()
    } else {
        req.student_name
    };

    state
        .lifecycle
        .submit(&email, &student_name, &req.stage, &file_url)
        .await
}

/// Presigned PUT for uploading a document straight to object storage
pub async fn upload_url(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, presign_upload(state, caller, body).await)
}

async fn presign_upload(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<PresignedUpload, PortalError> {
    let req: UploadUrlRequest = parse_body(body)?;

    let email = normalize_email(&req.student_email);
    if email.is_empty() {
        return Err(PortalError::validation("Student email is required"));
    }
    if !can_upload_for(caller, &email) {
        return Err(forbidden("upload for another student"));
    }
    if req.file_name.trim().is_empty() {
        return Err(PortalError::validation("file_name is required"));
    }
    let content_type = match req.content_type.trim() {
        "" => DEFAULT_CONTENT_TYPE,
        ct => ct,
    };

    let key = submission_key(&email, &req.file_name);
    let presigned = state
        .storage
        .presign_put(&key, content_type, state.config.presign_expiry)
        .await?;
    tracing::info!("Presigned upload for {} at {}", email, key);
    Ok(presigned)
}

pub async fn get_status(
    state: &AppState,
    caller: &Identity,
    student_email: &str,
) -> Result<Response<Body>, Error> {
    let result = if can_view(caller, student_email) {
        state.lifecycle.get_status(student_email).await
    } else {
        Err(forbidden("view another student's project"))
    };
    respond(StatusCode::OK, result)
}

/// Reviewer listing with optional `status` and `search` filters
pub async fn list_all(
    state: &AppState,
    caller: &Identity,
    status: Option<&str>,
    search: Option<&str>,
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, list_projects(state, caller, status, search).await)
}

async fn list_projects(
    state: &AppState,
    caller: &Identity,
    status: Option<&str>,
    search: Option<&str>,
) -> Result<Vec<Project>, PortalError> {
    if !can_review(caller) {
        return Err(forbidden("list all projects"));
    }

    let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<ProjectStatus>().map_err(|_| {
            PortalError::validation(format!("Unknown status filter: {}", raw))
        })?),
        None => None,
    };
    let filter = ProjectFilter {
        status,
        search: search.map(|s| s.to_string()),
    };

    let projects = state.lifecycle.list_all(&filter).await?;
    tracing::info!("Listed {} projects", projects.len());
    Ok(projects)
}

/// Approve or reject a student's latest work
pub async fn review(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, apply_review(state, caller, body).await)
}

async fn apply_review(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<ProjectView, PortalError> {
    if !can_review(caller) {
        return Err(forbidden("review projects"));
    }
    let req: ReviewRequest = parse_body(body)?;
    let reviewer = caller.author_label(&state.config.supervisor_name);

    let project = state
        .lifecycle
        .review_decision(&req.email, &req.status, req.comment.as_deref(), &reviewer)
        .await?;
    Ok(project.into())
}

pub async fn comment(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, add_comment(state, caller, body).await)
}

async fn add_comment(
    state: &AppState,
    caller: &Identity,
    body: &[u8],
) -> Result<ProjectView, PortalError> {
    if !can_review(caller) {
        return Err(forbidden("comment on projects"));
    }
    let req: CommentRequest = parse_body(body)?;
    let author = caller.author_label(&state.config.supervisor_name);

    let project = state
        .lifecycle
        .add_comment(&req.email, &author, &req.comment)
        .await?;
    Ok(project.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_harness, TestHarness, SUPERVISOR_EMAIL};
    use serde_json::{json, Value};

    fn student(email: &str) -> Identity {
        Identity::resolve(email, Some("Ada Lovelace".to_string()), SUPERVISOR_EMAIL)
    }

    fn supervisor() -> Identity {
        Identity::resolve(SUPERVISOR_EMAIL, Some("Dr. Hopper".to_string()), SUPERVISOR_EMAIL)
    }

    fn body(value: Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    fn read(resp: &Response<Body>) -> Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    fn inline_submission(email: &str, stage: &str) -> Vec<u8> {
        body(json!({
            "student_email": email,
            "stage": stage,
            "file_name": "thesis.pdf",
            "content_type": "application/pdf",
            "file_data": general_purpose::STANDARD.encode(b"%PDF-1.7 thesis"),
        }))
    }

    async fn submit_as(h: &TestHarness, caller: &Identity, payload: Vec<u8>) -> Response<Body> {
        submit(&h.state, caller, &payload).await.unwrap()
    }

    #[test]
    fn data_urls_are_unwrapped() {
        let encoded = general_purpose::STANDARD.encode(b"abc");
        assert_eq!(decode_file_data(&encoded).unwrap(), b"abc");
        let url = format!("data:application/pdf;base64,{}", encoded);
        assert_eq!(decode_file_data(&url).unwrap(), b"abc");
        assert!(decode_file_data("***").is_err());
        assert!(decode_file_data("").is_err());
    }

    #[tokio::test]
    async fn student_submits_own_document() {
        let h = test_harness();
        let ada = student("ada@x.com");

        let resp = submit_as(&h, &ada, inline_submission("Ada@X.com", "Proposal")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let project = read(&resp);
        assert_eq!(project["student_email"], "ada@x.com");
        assert_eq!(project["student_name"], "Ada Lovelace");
        assert_eq!(project["status"], "Pending Review");
        assert_eq!(project["reg_number"], "N/A");

        let puts = h.storage.puts();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].0.starts_with("submissions/ada@x.com/"));
        assert!(puts[0].0.ends_with(".pdf"));
        let url = project["submissions"][0]["file_url"].as_str().unwrap();
        assert!(url.ends_with(&puts[0].0));
    }

    #[tokio::test]
    async fn student_cannot_submit_for_someone_else() {
        let h = test_harness();
        let resp = submit_as(&h, &student("ada@x.com"), inline_submission("bob@x.com", "Proposal")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(h.storage.puts().is_empty());
    }

    #[tokio::test]
    async fn supervisor_may_submit_on_behalf_of_student() {
        let h = test_harness();
        let resp = submit_as(&h, &supervisor(), inline_submission("bob@x.com", "Chapter 1")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(read(&resp)["student_name"], "bob@x.com");
    }

    #[tokio::test]
    async fn submit_requires_exactly_one_file_source() {
        let h = test_harness();
        let ada = student("ada@x.com");

        let neither = body(json!({"student_email": "ada@x.com", "stage": "Proposal"}));
        let resp = submit_as(&h, &ada, neither).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let both = body(json!({
            "student_email": "ada@x.com",
            "stage": "Proposal",
            "file_url": "https://uploads.test/x.pdf",
            "file_data": general_purpose::STANDARD.encode(b"x"),
        }));
        let resp = submit_as(&h, &ada, both).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read(&resp)["error"], "ValidationError");
        assert!(h.storage.puts().is_empty());
    }

    #[tokio::test]
    async fn missing_stage_is_rejected_before_upload() {
        let h = test_harness();
        let resp = submit_as(&h, &student("ada@x.com"), inline_submission("ada@x.com", " ")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(h.storage.puts().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_records_nothing() {
        let h = test_harness();
        h.storage.fail_uploads();
        let ada = student("ada@x.com");

        let resp = submit_as(&h, &ada, inline_submission("ada@x.com", "Proposal")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let err = read(&resp);
        assert_eq!(err["error"], "UpstreamStorageError");
        assert!(!err["message"].as_str().unwrap().contains("bucket unavailable"));

        let resp = get_status(&h.state, &ada, "ada@x.com").await.unwrap();
        assert_eq!(read(&resp)["status"], "Not Started");
    }

    #[tokio::test]
    async fn presigned_upload_then_submit_by_reference() {
        let h = test_harness();
        let ada = student("ada@x.com");

        let req = body(json!({
            "student_email": "ada@x.com",
            "file_name": "chapter1.docx",
            "content_type": "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }));
        let resp = upload_url(&h.state, &ada, &req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let presigned = read(&resp);
        assert_eq!(presigned["method"], "PUT");
        assert_eq!(presigned["expires_in"], 900);
        let file_url = presigned["file_url"].as_str().unwrap().to_string();
        assert!(file_url.ends_with(".docx"));

        let resp = submit_as(
            &h,
            &ada,
            body(json!({"student_email": "ada@x.com", "stage": "Chapter 1", "file_url": file_url})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(read(&resp)["submissions"][0]["file_url"], file_url.as_str());
        assert!(h.storage.puts().is_empty());
    }

    #[tokio::test]
    async fn submit_refuses_references_outside_the_students_uploads() {
        let h = test_harness();
        let ada = student("ada@x.com");
        let bob = student("bob@x.com");

        let req = body(json!({"student_email": "ada@x.com", "file_name": "thesis.pdf", "content_type": "application/pdf"}));
        let resp = upload_url(&h.state, &ada, &req).await.unwrap();
        let adas_file = read(&resp)["file_url"].as_str().unwrap().to_string();

        for file_url in [
            adas_file.as_str(),
            "https://elsewhere.example/submissions/bob@x.com/thesis.pdf",
            "javascript:alert(1)",
        ] {
            let resp = submit_as(
                &h,
                &bob,
                body(json!({"student_email": "bob@x.com", "stage": "Proposal", "file_url": file_url})),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", file_url);
            assert_eq!(read(&resp)["error"], "ValidationError");
        }

        let resp = get_status(&h.state, &bob, "bob@x.com").await.unwrap();
        assert_eq!(read(&resp)["status"], "Not Started");
    }

    #[tokio::test]
    async fn upload_url_is_scoped_to_the_caller() {
        let h = test_harness();
        let req = body(json!({"student_email": "bob@x.com", "file_name": "a.pdf", "content_type": "application/pdf"}));
        let resp = upload_url(&h.state, &student("ada@x.com"), &req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn status_is_visible_to_owner_and_supervisor_only() {
        let h = test_harness();
        let ada = student("ada@x.com");
        submit_as(&h, &ada, inline_submission("ada@x.com", "Proposal")).await;

        let resp = get_status(&h.state, &ada, "ada@x.com").await.unwrap();
        let view = read(&resp);
        assert_eq!(view["status"], "Pending Review");
        assert_eq!(view["latest_submission"]["stage"], "Proposal");
        assert!(view["feedback"].is_null());

        let resp = get_status(&h.state, &supervisor(), "ada@x.com").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_status(&h.state, &student("bob@x.com"), "ada@x.com").await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rejection_feedback_reaches_the_student() {
        let h = test_harness();
        let ada = student("ada@x.com");
        submit_as(&h, &ada, inline_submission("ada@x.com", "Proposal")).await;

        let decision = body(json!({"email": "ada@x.com", "status": "Rejected", "comment": "Needs more detail"}));
        let resp = review(&h.state, &supervisor(), &decision).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let view = read(&resp);
        assert_eq!(view["status"], "Rejected");
        assert_eq!(view["feedback"], "Needs more detail");
        assert_eq!(view["comments"][0]["author"], "Dr. Hopper");

        let resp = submit_as(&h, &ada, inline_submission("ada@x.com", "Proposal")).await;
        let project = read(&resp);
        assert_eq!(project["status"], "Pending Review");
        assert_eq!(project["submissions"].as_array().unwrap().len(), 2);
        assert_eq!(project["comments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_without_feedback_is_a_validation_error() {
        let h = test_harness();
        submit_as(&h, &student("ada@x.com"), inline_submission("ada@x.com", "Proposal")).await;

        let decision = body(json!({"email": "ada@x.com", "status": "Rejected", "comment": "  "}));
        let resp = review(&h.state, &supervisor(), &decision).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get_status(&h.state, &supervisor(), "ada@x.com").await.unwrap();
        assert_eq!(read(&resp)["status"], "Pending Review");
    }

    #[tokio::test]
    async fn students_cannot_review_comment_or_list() {
        let h = test_harness();
        let ada = student("ada@x.com");
        submit_as(&h, &ada, inline_submission("ada@x.com", "Proposal")).await;

        let decision = body(json!({"email": "ada@x.com", "status": "Approved"}));
        let resp = review(&h.state, &ada, &decision).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let note = body(json!({"email": "ada@x.com", "comment": "self-approved"}));
        let resp = comment(&h.state, &ada, &note).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = list_all(&h.state, &ada, None, None).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn review_of_unknown_student_is_not_found() {
        let h = test_harness();
        let decision = body(json!({"email": "ghost@x.com", "status": "Approved"}));
        let resp = review(&h.state, &supervisor(), &decision).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(read(&resp)["error"], "NotFoundError");
    }

    #[tokio::test]
    async fn supervisor_comment_keeps_status() {
        let h = test_harness();
        submit_as(&h, &student("ada@x.com"), inline_submission("ada@x.com", "Proposal")).await;

        let note = body(json!({"email": "ada@x.com", "comment": "Looking at it this week"}));
        let resp = comment(&h.state, &supervisor(), &note).await.unwrap();
        let view = read(&resp);
        assert_eq!(view["status"], "Pending Review");
        assert_eq!(view["feedback"], "Looking at it this week");
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_search() {
        let h = test_harness();
        let prof = supervisor();
        for email in ["ada@x.com", "bob@x.com", "cy@x.com"] {
            submit_as(&h, &prof, inline_submission(email, "Proposal")).await;
        }
        let approve = |email: &str| body(json!({"email": email, "status": "Approved"}));
        review(&h.state, &prof, &approve("ada@x.com")).await.unwrap();
        review(&h.state, &prof, &approve("cy@x.com")).await.unwrap();

        let resp = list_all(&h.state, &prof, Some("approved"), None).await.unwrap();
        let listed = read(&resp);
        let emails: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["student_email"].as_str().unwrap())
            .collect();
        assert_eq!(emails, vec!["cy@x.com", "ada@x.com"]);

        let resp = list_all(&h.state, &prof, Some(""), Some("BOB")).await.unwrap();
        assert_eq!(read(&resp).as_array().unwrap().len(), 1);

        let resp = list_all(&h.state, &prof, Some("Archived"), None).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
