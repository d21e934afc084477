use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub company_id: Option<String>,
    pub permissions: HashMap<String, bool>,
    pub status: UserStatus,
}

/// The authenticated user performing an action.
pub type Viewer = UserProfile;

impl UserProfile {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn has_permission(&self, module: &str) -> bool {
        self.permissions.get(module).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInError {
    InvalidCredentials,
    InactiveUser,
    Unavailable(String),
}

/// Maps a sign-in failure to the user-facing message. Callers never patch the
/// auth client to intercept errors; they match on the returned variant.
pub fn sign_in_error_message(error: &SignInError) -> String {
    match error {
        SignInError::InvalidCredentials => "E-mail ou senha inválidos.".to_string(),
        SignInError::InactiveUser => {
            "Usuário inativo. Entre em contato com o administrador.".to_string()
        }
        SignInError::Unavailable(_) => {
            "Não foi possível entrar no momento. Tente novamente.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_messages_hide_internal_detail() {
        let message = sign_in_error_message(&SignInError::Unavailable("tcp reset".to_string()));
        assert!(!message.contains("tcp reset"));
    }

    #[test]
    fn permission_defaults_to_denied() {
        let profile = UserProfile {
            user_id: "u-1".to_string(),
            full_name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: Role::User,
            company_id: None,
            permissions: HashMap::new(),
            status: UserStatus::Active,
        };
        assert!(!profile.has_permission("surveys"));
    }
}
