use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Contractor,
    Surveyor,
    Managerial,
    Finance,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] =
        [Role::Contractor, Role::Surveyor, Role::Managerial, Role::Finance, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contractor => "contractor",
            Self::Surveyor => "surveyor",
            Self::Managerial => "managerial",
            Self::Finance => "finance",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contractor" => Ok(Self::Contractor),
            "surveyor" => Ok(Self::Surveyor),
            "managerial" => Ok(Self::Managerial),
            "finance" => Ok(Self::Finance),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::validation(
                "role",
                format!("unknown role `{other}` (expected contractor|surveyor|managerial|finance|admin)"),
            )),
        }
    }
}

/// The caller identity supplied by the authentication collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub display_name: Option<String>,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { user_id: user_id.into(), display_name: None, roles: roles.into_iter().collect() }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Passes when the actor holds at least one of `required`.
    pub fn require_any(&self, required: &[Role]) -> Result<(), DomainError> {
        if required.iter().any(|role| self.has_role(*role)) {
            return Ok(());
        }

        Err(DomainError::Permission { actor: self.user_id.clone(), required: required.to_vec() })
    }

    pub fn require(&self, role: Role) -> Result<(), DomainError> {
        self.require_any(&[role])
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// Parses a comma separated role list such as `"managerial, finance"`.
pub fn parse_roles(raw: &str) -> Result<BTreeSet<Role>, DomainError> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Role::from_str)
        .collect()
}
