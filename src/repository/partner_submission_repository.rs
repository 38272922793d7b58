use sqlx::{query, query_as, query_scalar, FromRow, Pool, Sqlite};
use tracing::warn;

use crate::{
    models::{
        types::UtcDateTime, Partner, PartnerId, PartnerSubmission, PartnerSubmissionId, Submission,
        SubmissionId, SubmissionState,
    },
    repository::conversion::DBConvertible,
};

use super::{
    conversion::{DBFromConversionError, DBToConversionError},
    partner_repository::SqlPartner,
};

pub struct PartnerSubmissionRepository {
    pool: Pool<Sqlite>,
}

/// A pending partner submission together with the submission it points to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPartnerSubmission {
    pub partner_submission: PartnerSubmission,
    pub submission: Submission,
}

impl PartnerSubmissionRepository {
    pub fn new(pool: Pool<Sqlite>) -> PartnerSubmissionRepository {
        PartnerSubmissionRepository { pool }
    }

    pub async fn exists_for(
        &self,
        submission_id: SubmissionId,
        partner_id: PartnerId,
    ) -> Result<bool, anyhow::Error> {
        let exists: bool = query_scalar(
            r#"
                SELECT EXISTS(
                    SELECT 1 FROM partner_submissions
                    WHERE submission_id = $1 AND partner_id = $2
                )
            "#,
        )
        .bind(submission_id.to_db()?)
        .bind(partner_id.to_db()?)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Pairs the submission with the partner unless they are already paired.
    ///
    /// Returns `true` if a new row has been inserted.
    pub async fn create(
        &self,
        submission_id: SubmissionId,
        partner_id: PartnerId,
    ) -> Result<bool, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let created_at = UtcDateTime::now().to_db()?;
        let query_result = query(
            r#"
                INSERT INTO partner_submissions (submission_id, partner_id, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (submission_id, partner_id) DO NOTHING
            "#,
        )
        .bind(submission_id.to_db()?)
        .bind(partner_id.to_db()?)
        .bind(created_at)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(query_result.rows_affected() > 0)
    }

    pub async fn get_for_partner(
        &self,
        partner_id: PartnerId,
    ) -> Result<Vec<PartnerSubmission>, anyhow::Error> {
        let rows = query_as::<_, SqlPartnerSubmission>(
            r#"
                SELECT id, submission_id, partner_id, notified_at, created_at
                FROM partner_submissions
                WHERE partner_id = $1
                ORDER BY id
            "#,
        )
        .bind(partner_id.to_db()?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| PartnerSubmission::from_db(row).map_err(anyhow::Error::from))
            .collect()
    }

    pub async fn get_for_submission(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Vec<PartnerSubmission>, anyhow::Error> {
        let rows = query_as::<_, SqlPartnerSubmission>(
            r#"
                SELECT id, submission_id, partner_id, notified_at, created_at
                FROM partner_submissions
                WHERE submission_id = $1
                ORDER BY id
            "#,
        )
        .bind(submission_id.to_db()?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| PartnerSubmission::from_db(row).map_err(anyhow::Error::from))
            .collect()
    }

    /// Partners having at least one pending row whose submission is still approved.
    pub async fn get_partners_with_pending(&self) -> Result<Vec<Partner>, anyhow::Error> {
        let partners = query_as::<_, SqlPartner>(
            r#"
                SELECT DISTINCT p.id, p.name, p.external_id, p.created_at
                FROM partners p
                JOIN partner_submissions ps ON ps.partner_id = p.id
                JOIN submissions s ON s.id = ps.submission_id
                WHERE ps.notified_at IS NULL AND s.state = $1
                ORDER BY p.id
            "#,
        )
        .bind(SubmissionState::Approved.to_db()?)
        .fetch_all(&self.pool)
        .await?;

        partners
            .iter()
            .map(|p| Partner::from_db(p).map_err(anyhow::Error::from))
            .collect()
    }

    /// Pending rows of the partner whose submission is still approved, in creation order.
    pub async fn get_pending_for_partner(
        &self,
        partner_id: PartnerId,
    ) -> Result<Vec<PendingPartnerSubmission>, anyhow::Error> {
        let rows = query_as::<_, SqlPendingPartnerSubmission>(
            r#"
                SELECT
                    ps.id,
                    ps.submission_id,
                    ps.partner_id,
                    ps.notified_at,
                    ps.created_at,
                    s.state AS submission_state,
                    s.artist_id AS submission_artist_id,
                    s.user_id AS submission_user_id,
                    s.title AS submission_title,
                    s.year AS submission_year,
                    s.created_at AS submission_created_at
                FROM partner_submissions ps
                JOIN submissions s ON s.id = ps.submission_id
                WHERE ps.partner_id = $1 AND ps.notified_at IS NULL AND s.state = $2
                ORDER BY ps.id
            "#,
        )
        .bind(partner_id.to_db()?)
        .bind(SubmissionState::Approved.to_db()?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| PendingPartnerSubmission::from_db(row).map_err(anyhow::Error::from))
            .collect()
    }

    /// Sets `notified_at` on the given rows in a single transaction.
    ///
    /// Rows that have already been notified keep their first timestamp.
    /// Returns the number of rows updated.
    pub async fn mark_notified(
        &self,
        ids: &[PartnerSubmissionId],
        notified_at: UtcDateTime,
    ) -> Result<u64, anyhow::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.pool.begin().await?;

        let notified_at = notified_at.to_db()?;
        let mut updated = 0;
        for id in ids {
            updated += query(
                r#"
                    UPDATE partner_submissions
                    SET notified_at = $1
                    WHERE id = $2 AND notified_at IS NULL
                "#,
            )
            .bind(&notified_at)
            .bind(id.to_db()?)
            .execute(&mut *transaction)
            .await?
            .rows_affected();
        }

        transaction.commit().await?;

        if updated < ids.len() as u64 {
            warn!(
                "Only {updated} of {} partner submissions were still pending",
                ids.len()
            );
        }

        Ok(updated)
    }
}

#[derive(Debug, FromRow)]
pub struct SqlPartnerSubmission {
    id: i64,
    submission_id: i64,
    partner_id: i64,
    notified_at: Option<String>,
    created_at: String,
}

impl DBConvertible for PartnerSubmission {
    type DBType = SqlPartnerSubmission;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlPartnerSubmission {
            id: self.id.to_db()?,
            submission_id: self.submission_id.to_db()?,
            partner_id: self.partner_id.to_db()?,
            notified_at: self.notified_at.to_db()?,
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(PartnerSubmission {
            id: PartnerSubmissionId::from_db(&value.id)?,
            submission_id: SubmissionId::from_db(&value.submission_id)?,
            partner_id: PartnerId::from_db(&value.partner_id)?,
            notified_at: Option::<UtcDateTime>::from_db(&value.notified_at)?,
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SqlPendingPartnerSubmission {
    id: i64,
    submission_id: i64,
    partner_id: i64,
    notified_at: Option<String>,
    created_at: String,
    submission_state: String,
    submission_artist_id: String,
    submission_user_id: String,
    submission_title: Option<String>,
    submission_year: Option<String>,
    submission_created_at: String,
}

impl DBConvertible for PendingPartnerSubmission {
    type DBType = SqlPendingPartnerSubmission;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        let submission = &self.submission;

        Ok(SqlPendingPartnerSubmission {
            id: self.partner_submission.id.to_db()?,
            submission_id: submission.id.to_db()?,
            partner_id: self.partner_submission.partner_id.to_db()?,
            notified_at: self.partner_submission.notified_at.to_db()?,
            created_at: self.partner_submission.created_at.to_db()?,
            submission_state: submission.state.to_db()?,
            submission_artist_id: submission.artist_id.clone(),
            submission_user_id: submission.user_id.clone(),
            submission_title: submission.title.clone(),
            submission_year: submission.year.clone(),
            submission_created_at: submission.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        let submission_id = SubmissionId::from_db(&value.submission_id)?;

        Ok(PendingPartnerSubmission {
            partner_submission: PartnerSubmission {
                id: PartnerSubmissionId::from_db(&value.id)?,
                submission_id,
                partner_id: PartnerId::from_db(&value.partner_id)?,
                notified_at: Option::<UtcDateTime>::from_db(&value.notified_at)?,
                created_at: UtcDateTime::from_db(&value.created_at)?,
            },
            submission: Submission {
                id: submission_id,
                state: SubmissionState::from_db(&value.submission_state)?,
                artist_id: value.submission_artist_id.clone(),
                user_id: value.submission_user_id.clone(),
                title: value.submission_title.clone(),
                year: value.submission_year.clone(),
                created_at: UtcDateTime::from_db(&value.submission_created_at)?,
            },
        })
    }
}
