use lambda_http::{http::Method, Body, Error, Request, RequestExt, Response};
use std::sync::Arc;
use thesis_shared::error::PortalError;
use thesis_shared::session::caller_identity;
use thesis_shared::{http, projects, users, AppState};

/// Routes that need a resolved caller
fn is_protected_route(parts: &[&str]) -> bool {
    matches!(
        parts,
        ["api", "me"]
            | ["api", "submit"]
            | ["api", "upload-url"]
            | ["api", "status", _]
            | ["api", "projects", "all"]
            | ["api", "admin", "projects"]
            | ["api", "admin", "update"]
            | ["api", "admin", "comment"]
    )
}

/// Main Lambda handler - routes portal requests
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("Thesis API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if *method == Method::OPTIONS {
        return http::preflight();
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Auth endpoints (no caller identity)
    match (method, parts.as_slice()) {
        (&Method::POST, ["api", "register"]) => return users::register(&state, body).await,
        (&Method::POST, ["api", "login"]) => return users::login(&state, body).await,
        (&Method::POST, ["api", "forgot-password"]) => {
            return users::forgot_password(&state, body).await
        }
        (&Method::POST, ["api", "reset-password"]) => {
            return users::reset_password(&state, body).await
        }
        (_, ["api", "register" | "login" | "forgot-password" | "reset-password"]) => {
            return http::method_not_allowed()
        }
        _ => {}
    }

    if !is_protected_route(&parts) {
        return http::not_found();
    }

    let caller = match caller_identity(&event, &state.config) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };
    tracing::info!("Caller: {} ({})", caller.email, caller.role.as_str());

    match (method, parts.as_slice()) {
        (&Method::GET, ["api", "me"]) => users::get_me(&state, &caller).await,

        // --- SUBMISSIONS ---
        (&Method::POST, ["api", "submit"]) => projects::submit(&state, &caller, body).await,
        (&Method::POST, ["api", "upload-url"]) => {
            projects::upload_url(&state, &caller, body).await
        }
        (&Method::GET, ["api", "status", raw_email]) => match urlencoding::decode(raw_email) {
            Ok(email) => projects::get_status(&state, &caller, &email).await,
            Err(e) => PortalError::validation(format!("Invalid email in path: {}", e))
                .into_response(),
        },

        // --- REVIEW ---
        (&Method::GET, ["api", "projects", "all"]) | (&Method::GET, ["api", "admin", "projects"]) => {
            let query = event.query_string_parameters_ref();
            let status = query.and_then(|q| q.first("status"));
            let search = query.and_then(|q| q.first("search"));
            projects::list_all(&state, &caller, status, search).await
        }
        (&Method::POST, ["api", "admin", "update"]) => {
            projects::review(&state, &caller, body).await
        }
        (&Method::POST, ["api", "admin", "comment"]) => {
            projects::comment(&state, &caller, body).await
        }

        _ => http::method_not_allowed(),
    }
}
