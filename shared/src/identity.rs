use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("identity provider: {0}")]
    Provider(String),
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AuthTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

/// Where the provider sent the password reset code
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResetDelivery {
    pub destination: Option<String>,
    pub medium: Option<String>,
}

/// Credential operations. Profiles live in the `UserStore`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<(), IdentityError>;

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError>;

    async fn reset_credential(&self, email: &str) -> Result<ResetDelivery, IdentityError>;

    async fn confirm_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
pub fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = <HmacSha256 as Mac>::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    general_purpose::STANDARD.encode(result.into_bytes())
}

pub struct CognitoIdentityStore {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
    user_pool_id: Option<String>,
}

impl CognitoIdentityStore {
    pub fn new(
        client: CognitoClient,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_pool_id: Option<String>,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_pool_id,
        }
    }

    fn secret_hash(&self, username: &str) -> String {
        compute_secret_hash(username, &self.client_id, &self.client_secret)
    }
}

#[async_trait]
impl IdentityStore for CognitoIdentityStore {
    async fn register(&self, email: &str, password: &str) -> Result<(), IdentityError> {
        let email_attr = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| IdentityError::Provider(format!("Failed to build attribute: {}", e)))?;

        let result = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .secret_hash(self.secret_hash(email))
            .user_attributes(email_attr)
            .send()
            .await;

        if let Err(e) = result {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito signup error: {}", error_message);

            return Err(if error_message.contains("InvalidPasswordException") {
                IdentityError::InvalidInput(
                    "Password must contain at least 8 characters with uppercase, lowercase, number, and special character".to_string(),
                )
            } else if error_message.contains("UsernameExistsException") {
                IdentityError::AlreadyExists("An account with this email already exists".to_string())
            } else if error_message.contains("InvalidParameterException") {
                IdentityError::InvalidInput("Invalid email or password format".to_string())
            } else {
                IdentityError::Provider(error_message)
            });
        }

        tracing::info!("Signup successful for user: {}", email);

        match &self.user_pool_id {
            Some(user_pool_id) => {
                // The account is usable even when this fails; the user can confirm by email.
                if let Err(e) = self
                    .client
                    .admin_confirm_sign_up()
                    .user_pool_id(user_pool_id)
                    .username(email)
                    .send()
                    .await
                {
                    tracing::error!("Failed to auto-confirm user: {:?}", e);
                } else {
                    tracing::info!("User auto-confirmed: {}", email);
                }
            }
            None => tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm"),
        }

        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError> {
        tracing::info!("Authenticating user: {}", email);

        let response = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", self.secret_hash(email))
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito authentication error: {}", error_message);

                if error_message.contains("NotAuthorizedException") {
                    IdentityError::InvalidCredentials("Incorrect email or password".to_string())
                } else if error_message.contains("UserNotConfirmedException") {
                    IdentityError::InvalidCredentials(
                        "Please verify your email before logging in".to_string(),
                    )
                } else if error_message.contains("UserNotFoundException") {
                    IdentityError::InvalidCredentials("No account found with this email".to_string())
                } else if error_message.contains("PasswordResetRequiredException") {
                    IdentityError::InvalidCredentials("Password reset required".to_string())
                } else if error_message.contains("TooManyRequestsException") {
                    IdentityError::InvalidCredentials(
                        "Too many login attempts. Please try again later".to_string(),
                    )
                } else {
                    IdentityError::Provider(error_message)
                }
            })?;

        let auth_result = response.authentication_result().ok_or_else(|| {
            tracing::error!("No authentication result returned");
            IdentityError::InvalidCredentials("No authentication result returned".to_string())
        })?;

        tracing::info!("Authentication successful for user: {}", email);

        Ok(AuthTokens {
            id_token: auth_result.id_token().unwrap_or_default().to_string(),
            access_token: auth_result.access_token().unwrap_or_default().to_string(),
            refresh_token: auth_result.refresh_token().unwrap_or_default().to_string(),
            expires_in: auth_result.expires_in(),
        })
    }

    async fn reset_credential(&self, email: &str) -> Result<ResetDelivery, IdentityError> {
        let response = self
            .client
            .forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .secret_hash(self.secret_hash(email))
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito forgot_password error: {}", error_message);

                if error_message.contains("UserNotFoundException") {
                    IdentityError::NotFound("No account found with this email".to_string())
                } else if error_message.contains("LimitExceededException") {
                    IdentityError::InvalidInput(
                        "Too many reset attempts. Please try again later".to_string(),
                    )
                } else {
                    IdentityError::Provider(error_message)
                }
            })?;

        let details = response.code_delivery_details();
        Ok(ResetDelivery {
            destination: details
                .and_then(|d| d.destination())
                .map(|s| s.to_string()),
            medium: details
                .and_then(|d| d.delivery_medium())
                .map(|m| m.as_str().to_string()),
        })
    }

    async fn confirm_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.client
            .confirm_forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .confirmation_code(code)
            .password(new_password)
            .secret_hash(self.secret_hash(email))
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito confirm_forgot_password error: {}", error_message);

                if error_message.contains("CodeMismatchException") {
                    IdentityError::InvalidInput("Invalid reset code".to_string())
                } else if error_message.contains("ExpiredCodeException") {
                    IdentityError::InvalidInput("Reset code has expired".to_string())
                } else if error_message.contains("InvalidPasswordException") {
                    IdentityError::InvalidInput(
                        "Password must contain at least 8 characters with uppercase, lowercase, number, and special character".to_string(),
                    )
                } else if error_message.contains("UserNotFoundException") {
                    IdentityError::NotFound("No account found with this email".to_string())
                } else {
                    IdentityError::Provider(error_message)
                }
            })?;

        tracing::info!("Password reset confirmed for user: {}", email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_matches_hmac_sha256_of_username_and_client_id() {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(b"secret").unwrap();
        mac.update(b"a@x.comclient");
        let expected = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(compute_secret_hash("a@x.com", "client", "secret"), expected);
    }

    #[test]
    fn secret_hash_depends_on_username() {
        assert_ne!(
            compute_secret_hash("a@x.com", "client", "secret"),
            compute_secret_hash("b@x.com", "client", "secret")
        );
    }
}
