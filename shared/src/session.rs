use lambda_http::{Request, RequestExt};

use crate::config::Config;
use crate::error::PortalError;
use crate::policy::Identity;

/// Resolve the caller from the request.
///
/// API Gateway's JWT authorizer supplies the `email` and `name` claims. When
/// `trust_identity_headers` is set, `X-User-Email` / `X-User-Name` take precedence
/// for local development.
pub fn caller_identity(event: &Request, config: &Config) -> Result<Identity, PortalError> {
    let header = |name: &str| {
        event
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    if config.trust_identity_headers {
        if let Some(email) = header("X-User-Email") {
            tracing::info!("Caller from X-User-Email header: {}", email);
            return Ok(Identity::resolve(
                &email,
                header("X-User-Name"),
                &config.supervisor_email,
            ));
        }
    }

    let claims = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .map(|jwt| &jwt.claims);

    match claims.and_then(|c| c.get("email")) {
        Some(email) if !email.trim().is_empty() => {
            let name = claims.and_then(|c| c.get("name")).cloned();
            Ok(Identity::resolve(email, name, &config.supervisor_email))
        }
        _ => {
            tracing::warn!("Could not extract caller email from JWT claims or headers");
            Err(PortalError::Unauthorized(
                "Missing or invalid credentials".to_string(),
            ))
        }
    }
}
