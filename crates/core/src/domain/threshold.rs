use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThresholdId(pub String);

impl ThresholdId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ThresholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named maximum variance, in percent, between contractor and surveyor figures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub id: ThresholdId,
    pub name: String,
    pub limit_value: Decimal,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdInput {
    pub name: String,
    pub limit_value: Decimal,
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub name: Option<String>,
    pub limit_value: Option<Decimal>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

impl Threshold {
    pub fn create(input: ThresholdInput, now: DateTime<Utc>) -> Result<Self, DomainError> {
        validate_fields(&input.name, input.limit_value)?;

        Ok(Self {
            id: ThresholdId::generate(),
            name: input.name.trim().to_owned(),
            limit_value: input.limit_value,
            description: normalize_description(input.description),
            active: input.active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the updated copy; `self` is left untouched if validation fails.
    pub fn apply(&self, update: ThresholdUpdate, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            next.name = name.trim().to_owned();
        }
        if let Some(limit_value) = update.limit_value {
            next.limit_value = limit_value;
        }
        if update.description.is_some() {
            next.description = normalize_description(update.description);
        }
        if let Some(active) = update.active {
            next.active = active;
        }

        validate_fields(&next.name, next.limit_value)?;
        next.updated_at = now;
        Ok(next)
    }
}

fn validate_fields(name: &str, limit_value: Decimal) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name", "threshold name must not be blank"));
    }
    if limit_value.is_sign_negative() && !limit_value.is_zero() {
        return Err(DomainError::validation(
            "limit_value",
            format!("{limit_value} must be greater than or equal to zero"),
        ));
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}
