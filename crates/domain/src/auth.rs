use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Developer,
    Admin,
    User,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "developer" => Some(Role::Developer),
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn is_developer(&self) -> bool {
        matches!(self, Role::Developer)
    }

    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Developer | Role::Admin)
    }
}
