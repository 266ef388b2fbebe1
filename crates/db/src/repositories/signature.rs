use overburden_core::domain::claim::ClaimId;
use overburden_core::domain::identity::Role;
use overburden_core::domain::signature::{Signature, SignatureSource};
use overburden_core::repository::{RepositoryError, SignatureRepository};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_label, parse_timestamp, DbError};
use crate::DbPool;

const SIGNATURE_COLUMNS: &str = "SELECT
        claim_id,
        role,
        source_kind,
        source_value,
        signer_user_id,
        signer_name,
        digest,
        signed_at
     FROM claim_signature";

pub struct SqlSignatureRepository {
    pool: DbPool,
}

impl SqlSignatureRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn put_inner(&self, signature: Signature) -> Result<(), DbError> {
        let (source_kind, source_value) = match &signature.source {
            SignatureSource::Inline { data } => ("inline", data.as_str()),
            SignatureSource::File { reference } => ("file", reference.as_str()),
        };

        sqlx::query(
            "INSERT INTO claim_signature (
                claim_id,
                role,
                source_kind,
                source_value,
                signer_user_id,
                signer_name,
                digest,
                signed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(claim_id, role) DO UPDATE SET
                source_kind = excluded.source_kind,
                source_value = excluded.source_value,
                signer_user_id = excluded.signer_user_id,
                signer_name = excluded.signer_name,
                digest = excluded.digest,
                signed_at = excluded.signed_at",
        )
        .bind(&signature.claim_id.0)
        .bind(signature.role.as_str())
        .bind(source_kind)
        .bind(source_value)
        .bind(&signature.signer_user_id)
        .bind(&signature.signer_name)
        .bind(&signature.digest)
        .bind(signature.signed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_inner(&self, claim_id: &ClaimId, role: Role) -> Result<Option<Signature>, DbError> {
        let row = sqlx::query(&format!("{SIGNATURE_COLUMNS} WHERE claim_id = ? AND role = ?"))
            .bind(&claim_id.0)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(signature_from_row).transpose()
    }

    async fn list_inner(&self, claim_id: &ClaimId) -> Result<Vec<Signature>, DbError> {
        let rows =
            sqlx::query(&format!("{SIGNATURE_COLUMNS} WHERE claim_id = ? ORDER BY signed_at ASC"))
                .bind(&claim_id.0)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(signature_from_row).collect()
    }
}

#[async_trait::async_trait]
impl SignatureRepository for SqlSignatureRepository {
    async fn put(&self, signature: Signature) -> Result<(), RepositoryError> {
        Ok(self.put_inner(signature).await?)
    }

    async fn get(
        &self,
        claim_id: &ClaimId,
        role: Role,
    ) -> Result<Option<Signature>, RepositoryError> {
        Ok(self.get_inner(claim_id, role).await?)
    }

    async fn list(&self, claim_id: &ClaimId) -> Result<Vec<Signature>, RepositoryError> {
        Ok(self.list_inner(claim_id).await?)
    }
}

fn signature_from_row(row: &SqliteRow) -> Result<Signature, DbError> {
    let source_kind = row.try_get::<String, _>("source_kind")?;
    let source_value = row.try_get::<String, _>("source_value")?;
    let source = match source_kind.as_str() {
        "inline" => SignatureSource::Inline { data: source_value },
        "file" => SignatureSource::File { reference: source_value },
        other => return Err(DbError::Decode(format!("unknown signature source `{other}`"))),
    };

    Ok(Signature {
        claim_id: ClaimId(row.try_get("claim_id")?),
        role: parse_label::<Role>("role", row.try_get("role")?)?,
        source,
        signer_user_id: row.try_get("signer_user_id")?,
        signer_name: row.try_get("signer_name")?,
        digest: row.try_get("digest")?,
        signed_at: parse_timestamp("signed_at", row.try_get("signed_at")?)?,
    })
}
