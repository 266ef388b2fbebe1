use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::claim::ClaimId;
use crate::domain::identity::Role;
use crate::errors::DomainError;

/// Where the signature image lives: inline payload or an uploaded file handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureSource {
    Inline { data: String },
    File { reference: String },
}

impl SignatureSource {
    /// Exactly one of the two inputs must be present and non-blank.
    pub fn from_parts(inline: Option<String>, file: Option<String>) -> Result<Self, DomainError> {
        let inline = inline.filter(|value| !value.trim().is_empty());
        let file = file.filter(|value| !value.trim().is_empty());

        match (inline, file) {
            (Some(data), None) => Ok(Self::Inline { data }),
            (None, Some(reference)) => Ok(Self::File { reference }),
            (Some(_), Some(_)) => Err(DomainError::validation(
                "signature_source",
                "provide either an inline signature or a file reference, not both",
            )),
            (None, None) => Err(DomainError::validation(
                "signature_source",
                "an inline signature or a file reference is required",
            )),
        }
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::Inline { data } => {
                hasher.update(b"inline:");
                hasher.update(data.as_bytes());
            }
            Self::File { reference } => {
                hasher.update(b"file:");
                hasher.update(reference.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub claim_id: ClaimId,
    pub role: Role,
    pub source: SignatureSource,
    pub signer_user_id: String,
    pub signer_name: String,
    pub digest: String,
    pub signed_at: DateTime<Utc>,
}

impl Signature {
    pub fn new(
        claim_id: ClaimId,
        role: Role,
        source: SignatureSource,
        signer_user_id: impl Into<String>,
        signer_name: impl Into<String>,
        signed_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if role == Role::Admin {
            return Err(DomainError::validation("role", "admin does not sign certificates"));
        }

        let digest = source.digest();
        Ok(Self {
            claim_id,
            role,
            source,
            signer_user_id: signer_user_id.into(),
            signer_name: signer_name.into(),
            digest,
            signed_at,
        })
    }
}
