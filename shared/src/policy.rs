//! Authorization policy for the portal.
//!
//! The caller's identity is resolved once per request and handed to every
//! operation that needs it. All role decisions go through the functions here.

use crate::types::{normalize_email, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Build an identity for `email`, granting `Admin` iff it matches the supervisor address
    pub fn resolve(email: &str, display_name: Option<String>, supervisor_email: &str) -> Self {
        let email = normalize_email(email);
        Self {
            role: role_for(&email, supervisor_email),
            email,
            display_name: display_name.filter(|n| !n.trim().is_empty()),
        }
    }

    /// Label used as the author of reviewer comments
    pub fn author_label(&self, fallback: &str) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

pub fn role_for(email: &str, supervisor_email: &str) -> Role {
    if !supervisor_email.trim().is_empty()
        && normalize_email(email) == normalize_email(supervisor_email)
    {
        Role::Admin
    } else {
        Role::Student
    }
}

pub fn can_review(identity: &Identity) -> bool {
    identity.role == Role::Admin
}

pub fn can_upload_for(identity: &Identity, target_email: &str) -> bool {
    can_review(identity) || identity.email == normalize_email(target_email)
}

pub fn can_view(identity: &Identity, target_email: &str) -> bool {
    can_upload_for(identity, target_email)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPERVISOR: &str = "prof@uni.edu";

    #[test]
    fn supervisor_email_is_admin_regardless_of_case() {
        let id = Identity::resolve("  PROF@uni.edu", None, SUPERVISOR);
        assert_eq!(id.role, Role::Admin);
        assert!(can_review(&id));
    }

    #[test]
    fn everyone_else_is_a_student() {
        let id = Identity::resolve("a@x.com", Some("Ada".into()), SUPERVISOR);
        assert_eq!(id.role, Role::Student);
        assert!(!can_review(&id));
    }

    #[test]
    fn empty_supervisor_address_grants_nobody_admin() {
        assert_eq!(role_for("", ""), Role::Student);
    }

    #[test]
    fn students_may_only_upload_for_themselves() {
        let id = Identity::resolve("a@x.com", None, SUPERVISOR);
        assert!(can_upload_for(&id, "A@X.com"));
        assert!(!can_upload_for(&id, "b@x.com"));
        assert!(!can_view(&id, "b@x.com"));
    }

    #[test]
    fn admin_may_act_for_anyone() {
        let id = Identity::resolve(SUPERVISOR, None, SUPERVISOR);
        assert!(can_upload_for(&id, "b@x.com"));
        assert!(can_view(&id, "b@x.com"));
    }

    #[test]
    fn author_label_falls_back_when_name_is_blank() {
        let id = Identity::resolve(SUPERVISOR, Some("  ".into()), SUPERVISOR);
        assert_eq!(id.author_label("Supervisor"), "Supervisor");
        let named = Identity::resolve(SUPERVISOR, Some("Dr. Hopper".into()), SUPERVISOR);
        assert_eq!(named.author_label("Supervisor"), "Dr. Hopper");
    }
}
