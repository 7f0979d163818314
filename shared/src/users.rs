use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};

use crate::error::PortalError;
use crate::http::{parse_body, respond};
use crate::identity::{AuthTokens, ResetDelivery};
use crate::policy::{role_for, Identity};
use crate::types::{normalize_email, RegisterRequest, Role, User};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub role: Role,
    pub user: Option<User>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct ForgotPasswordResponse {
    pub message: &'static str,
    pub delivery: ResetDelivery,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, PortalError> {
    let value = value.trim();
    if value.is_empty() {
        Err(PortalError::validation(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

fn require_email(value: &str) -> Result<String, PortalError> {
    let email = normalize_email(value);
    if email.is_empty() {
        return Err(PortalError::validation("email is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(PortalError::validation(format!("Invalid email address: {}", value.trim()))),
    }
}

/// Register a student: create the credential, then the profile record
pub async fn register(state: &AppState, body: &[u8]) -> Result<Response<Body>, Error> {
    tracing::info!("Signup request received");
    respond(StatusCode::CREATED, register_user(state, body).await)
}

async fn register_user(state: &AppState, body: &[u8]) -> Result<User, PortalError> {
    let req: RegisterRequest = parse_body(body)?;

    let email = require_email(&req.email)?;
    if req.password.is_empty() {
        return Err(PortalError::validation("password is required"));
    }
    let user = User {
        role: role_for(&email, &state.config.supervisor_email),
        email,
        first_name: require(&req.first_name, "first_name")?.to_string(),
        last_name: require(&req.last_name, "last_name")?.to_string(),
        reg_number: require(&req.reg_number, "reg_number")?.to_string(),
        program: require(&req.program, "program")?.to_string(),
        created_at: chrono::Utc::now(),
    };

    // Conditional put rejects duplicates; undone below if the credential fails
    state.users.create_user(&user).await?;

    if let Err(e) = state.identity.register(&user.email, &req.password).await {
        tracing::warn!("Credential creation failed for {}; removing profile", user.email);
        if let Err(cleanup) = state.users.delete_user(&user.email).await {
            tracing::error!("Failed to remove profile for {}: {}", user.email, cleanup);
        }
        return Err(e.into());
    }

    tracing::info!("Registered {} as {}", user.email, user.role.as_str());
    Ok(user)
}

pub async fn login(state: &AppState, body: &[u8]) -> Result<Response<Body>, Error> {
    tracing::info!("Login request received");
    respond(StatusCode::OK, login_user(state, body).await)
}

async fn login_user(state: &AppState, body: &[u8]) -> Result<LoginResponse, PortalError> {
    let req: LoginRequest = parse_body(body)?;
    let email = require_email(&req.email)?;

    let tokens = state.identity.authenticate(&email, &req.password).await?;
    let user = state.users.get_user(&email).await?;

    Ok(LoginResponse {
        tokens,
        role: role_for(&email, &state.config.supervisor_email),
        user,
    })
}

pub async fn forgot_password(state: &AppState, body: &[u8]) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, start_reset(state, body).await)
}

async fn start_reset(state: &AppState, body: &[u8]) -> Result<ForgotPasswordResponse, PortalError> {
    let req: ForgotPasswordRequest = parse_body(body)?;
    let email = require_email(&req.email)?;
    let delivery = state.identity.reset_credential(&email).await?;
    tracing::info!("Password reset code issued for {}", email);
    Ok(ForgotPasswordResponse {
        message: "A password reset code has been sent",
        delivery,
    })
}

pub async fn reset_password(state: &AppState, body: &[u8]) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, finish_reset(state, body).await)
}

async fn finish_reset(state: &AppState, body: &[u8]) -> Result<serde_json::Value, PortalError> {
    let req: ResetPasswordRequest = parse_body(body)?;
    let email = require_email(&req.email)?;
    let code = require(&req.code, "code")?;
    if req.new_password.is_empty() {
        return Err(PortalError::validation("new_password is required"));
    }
    state
        .identity
        .confirm_reset(&email, code, &req.new_password)
        .await?;
    Ok(serde_json::json!({"message": "Password has been reset"}))
}

/// Profile of the calling user
pub async fn get_me(state: &AppState, caller: &Identity) -> Result<Response<Body>, Error> {
    let result = match state.users.get_user(&caller.email).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(PortalError::not_found("User not found")),
        Err(e) => Err(e.into()),
    };
    respond(StatusCode::OK, result)
}
