use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings, read once at cold start
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub upload_bucket: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_user_pool_id: Option<String>,
    pub supervisor_email: String,
    pub supervisor_name: String,
    /// Accept `X-User-Email` in place of JWT claims. Local development only.
    pub trust_identity_headers: bool,
    pub presign_expiry: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));
        let with_default = |key: &str, default: &str| {
            var(key).unwrap_or_else(|| {
                tracing::info!("{} not set, using default: {}", key, default);
                default.to_string()
            })
        };

        let trust_identity_headers = match var("TRUST_IDENTITY_HEADERS") {
            None => false,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TRUST_IDENTITY_HEADERS",
                        value: v,
                    })
                }
            },
        };

        let presign_expiry = match var("PRESIGN_EXPIRY_SECS") {
            None => Duration::from_secs(3600),
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PRESIGN_EXPIRY_SECS",
                        value: v,
                    })
                }
            },
        };

        if trust_identity_headers {
            tracing::warn!("TRUST_IDENTITY_HEADERS enabled; caller identity is taken from headers");
        }

        Ok(Self {
            table_name: with_default("TABLE_NAME", "thesis-portal"),
            upload_bucket: with_default("UPLOAD_BUCKET", "thesis-portal-uploads"),
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            cognito_user_pool_id: var("COGNITO_USER_POOL_ID"),
            supervisor_email: crate::types::normalize_email(&required("SUPERVISOR_EMAIL")?),
            supervisor_name: with_default("SUPERVISOR_NAME", "Supervisor"),
            trust_identity_headers,
            presign_expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("COGNITO_CLIENT_ID", "client"),
        ("COGNITO_CLIENT_SECRET", "secret"),
        ("SUPERVISOR_EMAIL", " Prof@Uni.EDU "),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.table_name, "thesis-portal");
        assert_eq!(config.upload_bucket, "thesis-portal-uploads");
        assert_eq!(config.supervisor_email, "prof@uni.edu");
        assert_eq!(config.supervisor_name, "Supervisor");
        assert!(!config.trust_identity_headers);
        assert_eq!(config.presign_expiry, Duration::from_secs(3600));
        assert!(config.cognito_user_pool_id.is_none());
    }

    #[test]
    fn missing_required_var_is_reported() {
        let err = Config::from_lookup(lookup(&[("COGNITO_CLIENT_ID", "client")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("COGNITO_CLIENT_SECRET"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PRESIGN_EXPIRY_SECS", "soon"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid {
                key: "PRESIGN_EXPIRY_SECS",
                ..
            })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TRUST_IDENTITY_HEADERS", "maybe"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn identity_headers_can_be_enabled() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TRUST_IDENTITY_HEADERS", "true"));
        pairs.push(("PRESIGN_EXPIRY_SECS", "600"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.trust_identity_headers);
        assert_eq!(config.presign_expiry, Duration::from_secs(600));
    }
}
