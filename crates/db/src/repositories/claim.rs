use overburden_core::chrono::{DateTime, Utc};
use overburden_core::domain::claim::{
    Claim, ClaimId, ClaimLine, EvidenceRef, Material, PartyRole,
};
use overburden_core::domain::reference::{BlockId, PitId, SiteId};
use overburden_core::domain::threshold::ThresholdId;
use overburden_core::reconciliation::{ReconciliationReport, ReconciliationSnapshot};
use overburden_core::repository::{
    ClaimCommit, ClaimFilter, ClaimRepository, ClaimTransition, RepositoryError,
};
use overburden_core::workflow::ClaimStatus;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::{
    parse_date, parse_decimal, parse_i32, parse_label, parse_timestamp, parse_u32, DbError,
    DATE_FORMAT,
};
use crate::DbPool;

const CLAIM_COLUMNS: &str = "SELECT
        id,
        claim_number,
        version,
        supersedes,
        party_role,
        site_id,
        pit_id,
        period_month,
        period_year,
        job_type,
        status,
        linked_claim_id,
        created_at,
        created_by
     FROM claim";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_claim(&self, row: SqliteRow) -> Result<Claim, DbError> {
        let mut claim = claim_from_row(&row)?;
        claim.lines = self.load_lines(&claim.id).await?;
        Ok(claim)
    }

    async fn load_claims(&self, rows: Vec<SqliteRow>) -> Result<Vec<Claim>, DbError> {
        let mut claims = Vec::with_capacity(rows.len());
        for row in rows {
            claims.push(self.load_claim(row).await?);
        }
        Ok(claims)
    }

    async fn load_lines(&self, claim_id: &ClaimId) -> Result<Vec<ClaimLine>, DbError> {
        let rows = sqlx::query(
            "SELECT line_no, block_id, bcm, amount, work_date, note, evidence_ref
             FROM claim_line
             WHERE claim_id = ?
             ORDER BY line_no ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        let material_rows = sqlx::query(
            "SELECT line_no, material_name
             FROM claim_line_material
             WHERE claim_id = ?
             ORDER BY line_no ASC, position ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line_no = row.try_get::<i64, _>("line_no")?;
            let materials = material_rows
                .iter()
                .filter(|material| material.try_get::<i64, _>("line_no").ok() == Some(line_no))
                .map(|material| -> Result<Material, DbError> {
                    Ok(Material { material_name: material.try_get("material_name")? })
                })
                .collect::<Result<Vec<_>, DbError>>()?;

            lines.push(ClaimLine {
                block_id: BlockId(row.try_get("block_id")?),
                bcm: parse_decimal("bcm", row.try_get("bcm")?)?,
                amount: parse_decimal("amount", row.try_get("amount")?)?,
                date: parse_date("work_date", row.try_get("work_date")?)?,
                note: row.try_get("note")?,
                materials,
                evidence_ref: row.try_get::<Option<String>, _>("evidence_ref")?.map(EvidenceRef),
            });
        }
        Ok(lines)
    }

    async fn find_claim_inner(&self, id: &ClaimId) -> Result<Option<Claim>, DbError> {
        let row = sqlx::query(&format!("{CLAIM_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load_claim(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_claims_inner(&self, filter: &ClaimFilter) -> Result<Vec<Claim>, DbError> {
        let mut query = QueryBuilder::<Sqlite>::new(CLAIM_COLUMNS);
        query.push(" WHERE 1 = 1");
        if let Some(party_role) = filter.party_role {
            query.push(" AND party_role = ").push_bind(party_role.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(site_id) = &filter.site_id {
            query.push(" AND site_id = ").push_bind(site_id.0.clone());
        }
        if let Some(pit_id) = &filter.pit_id {
            query.push(" AND pit_id = ").push_bind(pit_id.0.clone());
        }
        if let Some(month) = filter.period_month {
            query.push(" AND period_month = ").push_bind(i64::from(month));
        }
        if let Some(year) = filter.period_year {
            query.push(" AND period_year = ").push_bind(i64::from(year));
        }
        if let Some(created_by) = &filter.created_by {
            query.push(" AND created_by = ").push_bind(created_by.clone());
        }
        if let Some(supersedes) = &filter.supersedes {
            query.push(" AND supersedes = ").push_bind(supersedes.0.clone());
        }
        query.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        self.load_claims(rows).await
    }

    async fn commit_inner(&self, commit: ClaimCommit) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        if let Some(new_claim) = &commit.new_claim {
            insert_claim(&mut tx, &new_claim.claim).await?;
            for transition in &new_claim.history {
                insert_transition(&mut tx, transition).await?;
            }
        }

        for transition in &commit.transitions {
            compare_and_swap(&mut tx, transition).await?;
            insert_transition(&mut tx, transition).await?;
        }

        if let Some(snapshot) = &commit.snapshot {
            upsert_snapshot(&mut tx, snapshot).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_transitions_inner(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ClaimTransition>, DbError> {
        let rows = sqlx::query(
            "SELECT claim_id, from_status, to_status, event, actor_id, correlation_id, occurred_at
             FROM claim_transition
             WHERE claim_id = ?
             ORDER BY id ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transition_from_row).collect()
    }

    async fn find_reconciliation_inner(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Option<ReconciliationSnapshot>, DbError> {
        let row = sqlx::query(
            "SELECT report_json, reconciled_by, reconciled_at
             FROM claim_reconciliation
             WHERE contractor_claim_id = ?",
        )
        .bind(&contractor_claim_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| snapshot_from_row(&row)).transpose()
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn find_claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        Ok(self.find_claim_inner(id).await?)
    }

    async fn find_linked_claims(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{CLAIM_COLUMNS} WHERE linked_claim_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(&contractor_claim_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(self.load_claims(rows).await?)
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>, RepositoryError> {
        Ok(self.list_claims_inner(filter).await?)
    }

    async fn count_claims_in_period(
        &self,
        party_role: PartyRole,
        site_id: &SiteId,
        period_year: i32,
        period_month: u32,
    ) -> Result<usize, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count
             FROM claim
             WHERE party_role = ? AND site_id = ? AND period_year = ? AND period_month = ?
               AND version = 1",
        )
        .bind(party_role.as_str())
        .bind(&site_id.0)
        .bind(i64::from(period_year))
        .bind(i64::from(period_month))
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get::<i64, _>("count"))
        .map_err(DbError::from)?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        Ok(self.commit_inner(commit).await?)
    }

    async fn list_transitions(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ClaimTransition>, RepositoryError> {
        Ok(self.list_transitions_inner(claim_id).await?)
    }

    async fn find_reconciliation(
        &self,
        contractor_claim_id: &ClaimId,
    ) -> Result<Option<ReconciliationSnapshot>, RepositoryError> {
        Ok(self.find_reconciliation_inner(contractor_claim_id).await?)
    }

    async fn count_reviews_pinned_to(
        &self,
        threshold_id: &ThresholdId,
    ) -> Result<usize, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count
             FROM claim_reconciliation r
             JOIN claim c ON c.id = r.contractor_claim_id
             WHERE r.threshold_id = ? AND c.status = ?",
        )
        .bind(&threshold_id.0)
        .bind(ClaimStatus::NeedsReview.as_str())
        .fetch_one(&self.pool)
        .await
        .and_then(|row| row.try_get::<i64, _>("count"))
        .map_err(DbError::from)?;

        Ok(usize::try_from(count).unwrap_or_default())
    }
}

async fn insert_claim(conn: &mut SqliteConnection, claim: &Claim) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO claim (
            id,
            claim_number,
            version,
            supersedes,
            party_role,
            site_id,
            pit_id,
            period_month,
            period_year,
            job_type,
            status,
            linked_claim_id,
            created_at,
            created_by
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&claim.id.0)
    .bind(&claim.claim_number)
    .bind(i64::from(claim.version))
    .bind(claim.supersedes.as_ref().map(|id| id.0.as_str()))
    .bind(claim.party_role.as_str())
    .bind(&claim.site_id.0)
    .bind(&claim.pit_id.0)
    .bind(i64::from(claim.period_month))
    .bind(i64::from(claim.period_year))
    .bind(&claim.job_type)
    .bind(claim.status.as_str())
    .bind(claim.linked_claim_id.as_ref().map(|id| id.0.as_str()))
    .bind(claim.created_at.to_rfc3339())
    .bind(&claim.created_by)
    .execute(&mut *conn)
    .await?;

    for (line_no, line) in claim.lines.iter().enumerate() {
        let line_no = line_no as i64;
        sqlx::query(
            "INSERT INTO claim_line (
                claim_id, line_no, block_id, bcm, amount, work_date, note, evidence_ref
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&claim.id.0)
        .bind(line_no)
        .bind(&line.block_id.0)
        .bind(line.bcm.to_string())
        .bind(line.amount.to_string())
        .bind(line.date.format(DATE_FORMAT).to_string())
        .bind(line.note.as_deref())
        .bind(line.evidence_ref.as_ref().map(|evidence| evidence.0.as_str()))
        .execute(&mut *conn)
        .await?;

        for (position, material) in line.materials.iter().enumerate() {
            sqlx::query(
                "INSERT INTO claim_line_material (claim_id, line_no, position, material_name)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&claim.id.0)
            .bind(line_no)
            .bind(position as i64)
            .bind(&material.material_name)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Moves the stored status from `transition.from` to `transition.to`, or fails
/// without writing when another writer got there first.
async fn compare_and_swap(
    conn: &mut SqliteConnection,
    transition: &ClaimTransition,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE claim
         SET status = ?, state_version = state_version + 1
         WHERE id = ? AND status = ?",
    )
    .bind(transition.to.as_str())
    .bind(&transition.claim_id.0)
    .bind(transition.from.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let current = sqlx::query("SELECT status FROM claim WHERE id = ?")
        .bind(&transition.claim_id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        None => Err(RepositoryError::not_found("claim", transition.claim_id.0.clone()).into()),
        Some(row) => {
            let found = row.try_get::<String, _>("status")?;
            Err(RepositoryError::conflict(
                "claim",
                transition.claim_id.0.clone(),
                format!("expected status `{}`, found `{found}`", transition.from),
            )
            .into())
        }
    }
}

async fn insert_transition(
    conn: &mut SqliteConnection,
    transition: &ClaimTransition,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO claim_transition (
            claim_id, from_status, to_status, event, actor_id, correlation_id, occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transition.claim_id.0)
    .bind(transition.from.as_str())
    .bind(transition.to.as_str())
    .bind(transition.event.as_str())
    .bind(&transition.actor_id)
    .bind(&transition.correlation_id)
    .bind(transition.occurred_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn upsert_snapshot(
    conn: &mut SqliteConnection,
    snapshot: &ReconciliationSnapshot,
) -> Result<(), DbError> {
    let report = &snapshot.report;
    let report_json = serde_json::to_string(report)
        .map_err(|error| DbError::Decode(format!("cannot encode reconciliation report: {error}")))?;

    sqlx::query(
        "INSERT INTO claim_reconciliation (
            contractor_claim_id,
            surveyor_claim_id,
            threshold_id,
            recommendation,
            report_json,
            reconciled_by,
            reconciled_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(contractor_claim_id) DO UPDATE SET
            surveyor_claim_id = excluded.surveyor_claim_id,
            threshold_id = excluded.threshold_id,
            recommendation = excluded.recommendation,
            report_json = excluded.report_json,
            reconciled_by = excluded.reconciled_by,
            reconciled_at = excluded.reconciled_at",
    )
    .bind(&report.contractor_claim_id.0)
    .bind(&report.surveyor_claim_id.0)
    .bind(report.threshold.threshold_id.as_ref().map(|id| id.0.as_str()))
    .bind(report.recommendation.as_str())
    .bind(report_json)
    .bind(&snapshot.reconciled_by)
    .bind(snapshot.reconciled_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn claim_from_row(row: &SqliteRow) -> Result<Claim, DbError> {
    Ok(Claim {
        id: ClaimId(row.try_get("id")?),
        claim_number: row.try_get("claim_number")?,
        version: parse_u32("version", row.try_get("version")?)?,
        supersedes: row.try_get::<Option<String>, _>("supersedes")?.map(ClaimId),
        party_role: parse_label::<PartyRole>("party_role", row.try_get("party_role")?)?,
        site_id: SiteId(row.try_get("site_id")?),
        pit_id: PitId(row.try_get("pit_id")?),
        period_month: parse_u32("period_month", row.try_get("period_month")?)?,
        period_year: parse_i32("period_year", row.try_get("period_year")?)?,
        job_type: row.try_get("job_type")?,
        lines: Vec::new(),
        status: parse_label::<ClaimStatus>("status", row.try_get("status")?)?,
        linked_claim_id: row.try_get::<Option<String>, _>("linked_claim_id")?.map(ClaimId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        created_by: row.try_get("created_by")?,
    })
}

fn transition_from_row(row: &SqliteRow) -> Result<ClaimTransition, DbError> {
    Ok(ClaimTransition {
        claim_id: ClaimId(row.try_get("claim_id")?),
        from: parse_label("from_status", row.try_get("from_status")?)?,
        to: parse_label("to_status", row.try_get("to_status")?)?,
        event: parse_label("event", row.try_get("event")?)?,
        actor_id: row.try_get("actor_id")?,
        correlation_id: row.try_get("correlation_id")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<ReconciliationSnapshot, DbError> {
    let report_json = row.try_get::<String, _>("report_json")?;
    let report: ReconciliationReport = serde_json::from_str(&report_json)
        .map_err(|error| DbError::Decode(format!("invalid `report_json`: {error}")))?;
    let reconciled_at: DateTime<Utc> =
        parse_timestamp("reconciled_at", row.try_get("reconciled_at")?)?;

    Ok(ReconciliationSnapshot {
        report,
        reconciled_by: row.try_get("reconciled_by")?,
        reconciled_at,
    })
}

#[cfg(test)]
mod tests {
    use overburden_core::chrono::{DateTime, NaiveDate, Utc};
    use overburden_core::domain::claim::{
        Claim, ClaimDraft, ClaimLine, EvidenceRef, Material, PartyRole,
    };
    use overburden_core::domain::reference::{BlockId, PitId, SiteId};
    use overburden_core::repository::{
        ClaimCommit, ClaimFilter, ClaimRepository, ClaimTransition, NewClaim, RepositoryError,
    };
    use overburden_core::rust_decimal::Decimal;
    use overburden_core::workflow::{ClaimEvent, ClaimStatus};

    use super::SqlClaimRepository;
    use crate::fixtures::DemoDataset;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool).await.expect("seed reference data");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }

    fn contractor_claim(number: &str, created_at: &str) -> Claim {
        Claim::submit(
            ClaimDraft {
                party_role: PartyRole::Contractor,
                site_id: SiteId("site-ktb".to_owned()),
                pit_id: PitId("pit-ktb-1".to_owned()),
                period_month: 5,
                period_year: 2024,
                job_type: "overburden removal".to_owned(),
                lines: vec![
                    ClaimLine {
                        block_id: BlockId("blk-pa-01".to_owned()),
                        bcm: Decimal::new(100_050, 2),
                        amount: Decimal::new(25_012_500, 0),
                        date: NaiveDate::from_ymd_opt(2024, 5, 14).expect("date"),
                        note: Some("north face".to_owned()),
                        materials: vec![
                            Material { material_name: "clay".to_owned() },
                            Material { material_name: "sandstone".to_owned() },
                        ],
                        evidence_ref: Some(EvidenceRef("evidence/blk-pa-01.pdf".to_owned())),
                    },
                    ClaimLine {
                        block_id: BlockId("blk-pa-02".to_owned()),
                        bcm: Decimal::new(500, 0),
                        amount: Decimal::ZERO,
                        date: NaiveDate::from_ymd_opt(2024, 5, 15).expect("date"),
                        note: None,
                        materials: Vec::new(),
                        evidence_ref: None,
                    },
                ],
                linked_claim_id: None,
            },
            number.to_owned(),
            "ctr-1",
            parse_ts(created_at),
        )
        .expect("valid claim")
    }

    fn submitted(claim: &Claim) -> NewClaim {
        NewClaim {
            claim: claim.clone(),
            history: vec![ClaimTransition {
                claim_id: claim.id.clone(),
                from: ClaimStatus::Draft,
                to: ClaimStatus::Submitted,
                event: ClaimEvent::Submit,
                actor_id: "ctr-1".to_owned(),
                correlation_id: "req-1".to_owned(),
                occurred_at: claim.created_at,
            }],
        }
    }

    #[tokio::test]
    async fn claim_round_trips_with_lines_and_materials() {
        let pool = setup_pool().await;
        let repo = SqlClaimRepository::new(pool.clone());
        let claim = contractor_claim("CTR-202405-KTB-0001", "2024-05-20T09:00:00Z");

        repo.commit(ClaimCommit { new_claim: Some(submitted(&claim)), ..ClaimCommit::default() })
            .await
            .expect("insert claim");

        let found = repo.find_claim(&claim.id).await.expect("find claim");
        assert_eq!(found, Some(claim.clone()));

        let transitions = repo.list_transitions(&claim.id).await.expect("transitions");
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, ClaimStatus::Submitted);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_transition_is_rejected_and_nothing_is_written() {
        let pool = setup_pool().await;
        let repo = SqlClaimRepository::new(pool.clone());
        let claim = contractor_claim("CTR-202405-KTB-0001", "2024-05-20T09:00:00Z");
        repo.commit(ClaimCommit { new_claim: Some(submitted(&claim)), ..ClaimCommit::default() })
            .await
            .expect("insert claim");

        let stale = ClaimTransition {
            claim_id: claim.id.clone(),
            from: ClaimStatus::NeedsReview,
            to: ClaimStatus::ApprovedManagerial,
            event: ClaimEvent::ManagerialApproved,
            actor_id: "mgr-1".to_owned(),
            correlation_id: "req-2".to_owned(),
            occurred_at: parse_ts("2024-05-21T09:00:00Z"),
        };
        let error = repo.append_status_transition(stale).await.expect_err("stale from status");

        assert!(matches!(error, RepositoryError::Conflict { ref entity, .. } if entity == "claim"));
        let stored = repo.find_claim(&claim.id).await.expect("find").expect("present");
        assert_eq!(stored.status, ClaimStatus::Submitted);
        assert_eq!(repo.list_transitions(&claim.id).await.expect("transitions").len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_claim_number_is_a_conflict() {
        let pool = setup_pool().await;
        let repo = SqlClaimRepository::new(pool.clone());
        let first = contractor_claim("CTR-202405-KTB-0001", "2024-05-20T09:00:00Z");
        let second = contractor_claim("CTR-202405-KTB-0001", "2024-05-20T10:00:00Z");

        repo.commit(ClaimCommit { new_claim: Some(submitted(&first)), ..ClaimCommit::default() })
            .await
            .expect("first insert");
        let error = repo
            .commit(ClaimCommit { new_claim: Some(submitted(&second)), ..ClaimCommit::default() })
            .await
            .expect_err("duplicate number");

        assert!(matches!(error, RepositoryError::Conflict { .. }));
        assert_eq!(repo.find_claim(&second.id).await.expect("find"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_counts_first_versions() {
        let pool = setup_pool().await;
        let repo = SqlClaimRepository::new(pool.clone());
        let older = contractor_claim("CTR-202405-KTB-0001", "2024-05-20T09:00:00Z");
        let newer = contractor_claim("CTR-202405-KTB-0002", "2024-05-22T09:00:00Z");
        for claim in [&older, &newer] {
            repo.commit(ClaimCommit { new_claim: Some(submitted(claim)), ..ClaimCommit::default() })
                .await
                .expect("insert");
        }

        let listed = repo
            .list_claims(&ClaimFilter { period_month: Some(5), ..ClaimFilter::default() })
            .await
            .expect("list");
        let ids: Vec<_> = listed.iter().map(|claim| claim.id.clone()).collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);

        let count = repo
            .count_claims_in_period(PartyRole::Contractor, &SiteId("site-ktb".to_owned()), 2024, 5)
            .await
            .expect("count");
        assert_eq!(count, 2);

        let none = repo
            .list_claims(&ClaimFilter { status: Some(ClaimStatus::NeedsReview), ..ClaimFilter::default() })
            .await
            .expect("list");
        assert!(none.is_empty());

        pool.close().await;
    }
}
