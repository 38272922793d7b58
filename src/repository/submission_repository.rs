use sqlx::{query, query_as, query_scalar, FromRow, Pool, QueryBuilder, Sqlite};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::debug;

use crate::{
    models::{types::UtcDateTime, NewSubmission, Submission, SubmissionId, SubmissionState},
    repository::conversion::DBConvertible,
};

use super::conversion::{DBFromConversionError, DBToConversionError};

#[derive(Debug)]
pub struct SubmissionRepository {
    pool: Pool<Sqlite>,
    events: Sender<SubmissionStorageEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionStorageEvent {
    SubmissionApproved(SubmissionId),
}

/// Criteria for [`SubmissionRepository::find_submissions`]. `None` leaves a criterion
/// out; an empty list matches nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub ids: Option<Vec<SubmissionId>>,
    pub user_ids: Option<Vec<String>>,
}

impl SubmissionRepository {
    pub fn new(pool: Pool<Sqlite>) -> SubmissionRepository {
        SubmissionRepository {
            pool,
            events: broadcast::channel(128).0,
        }
    }

    pub async fn create_submission(
        &self,
        new_submission: &NewSubmission,
    ) -> Result<Submission, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let created = {
            let state = new_submission.state.to_db()?;
            let created_at = UtcDateTime::now().to_db()?;

            query_as::<_, SqlSubmission>(
                r#"
                    INSERT INTO submissions (state, artist_id, user_id, title, year, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id, state, artist_id, user_id, title, year, created_at
                "#,
            )
            .bind(state)
            .bind(&new_submission.artist_id)
            .bind(&new_submission.user_id)
            .bind(&new_submission.title)
            .bind(&new_submission.year)
            .bind(created_at)
            .fetch_one(&mut *transaction)
            .await?
        };

        transaction.commit().await?;

        Ok(Submission::from_db(&created)?)
    }

    pub async fn get_submission(
        &self,
        id: SubmissionId,
    ) -> Result<Option<Submission>, anyhow::Error> {
        let id = id.to_db()?;

        let submission = query_as::<_, SqlSubmission>(
            r#"
                SELECT id, state, artist_id, user_id, title, year, created_at
                FROM submissions
                WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match submission {
            Some(submission) => Ok(Some(Submission::from_db(&submission)?)),
            None => Ok(None),
        }
    }

    /// Looks up several submissions at once. Unknown ids are ignored.
    pub async fn get_submissions_by_ids(
        &self,
        ids: &[SubmissionId],
    ) -> Result<Vec<Submission>, anyhow::Error> {
        self.find_submissions(&SubmissionFilter {
            ids: Some(ids.to_vec()),
            ..Default::default()
        })
        .await
    }

    /// Lists the submissions made by any of `user_ids`. Unknown users are ignored.
    pub async fn get_submissions_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<Submission>, anyhow::Error> {
        self.find_submissions(&SubmissionFilter {
            user_ids: Some(user_ids.to_vec()),
            ..Default::default()
        })
        .await
    }

    /// Lists the submissions matching every set criterion of `filter`, in id order.
    pub async fn find_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, anyhow::Error> {
        let ids = match &filter.ids {
            Some(ids) => Some(
                ids.iter()
                    .map(|id| id.to_db())
                    .collect::<Result<Vec<i64>, _>>()?,
            ),
            None => None,
        };

        if ids.as_ref().is_some_and(|ids| ids.is_empty())
            || filter.user_ids.as_ref().is_some_and(|ids| ids.is_empty())
        {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
                SELECT id, state, artist_id, user_id, title, year, created_at
                FROM submissions
                WHERE 1 = 1
            "#,
        );

        if let Some(ids) = ids {
            builder.push(" AND id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
        }

        if let Some(user_ids) = &filter.user_ids {
            builder.push(" AND user_id IN (");
            let mut separated = builder.separated(", ");
            for user_id in user_ids {
                separated.push_bind(user_id.clone());
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY id");

        let submissions = builder
            .build_query_as::<SqlSubmission>()
            .fetch_all(&self.pool)
            .await?;

        submissions
            .iter()
            .map(|s| Submission::from_db(s).map_err(anyhow::Error::from))
            .collect()
    }

    pub async fn get_approved_submissions(&self) -> Result<Vec<Submission>, anyhow::Error> {
        let approved = SubmissionState::Approved.to_db()?;

        let submissions = query_as::<_, SqlSubmission>(
            r#"
                SELECT id, state, artist_id, user_id, title, year, created_at
                FROM submissions
                WHERE state = $1
                ORDER BY id
            "#,
        )
        .bind(approved)
        .fetch_all(&self.pool)
        .await?;

        submissions
            .iter()
            .map(|s| Submission::from_db(s).map_err(anyhow::Error::from))
            .collect()
    }

    /// Moves the submission into `state`. Returns `false` if there is no such submission.
    ///
    /// Subscribers are notified when the submission enters the approved state.
    pub async fn update_state(
        &self,
        id: SubmissionId,
        state: SubmissionState,
    ) -> Result<bool, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let db_id = id.to_db()?;

        let previous_state: Option<String> =
            query_scalar(r#"SELECT state FROM submissions WHERE id = $1"#)
                .bind(db_id)
                .fetch_optional(&mut *transaction)
                .await?;

        let previous_state = match previous_state {
            Some(previous_state) => SubmissionState::from_db(&previous_state)?,
            None => return Ok(false),
        };

        query(r#"UPDATE submissions SET state = $1 WHERE id = $2"#)
            .bind(state.to_db()?)
            .bind(db_id)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        debug!("Submission {id:?} moved from {previous_state} to {state}");

        if previous_state != SubmissionState::Approved && state == SubmissionState::Approved {
            let _ = self
                .events
                .send(SubmissionStorageEvent::SubmissionApproved(id)); // Nobody may be listening
        }

        Ok(true)
    }

    pub fn subscribe(&self) -> Receiver<SubmissionStorageEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, FromRow)]
pub struct SqlSubmission {
    id: i64,
    state: String,
    artist_id: String,
    user_id: String,
    title: Option<String>,
    year: Option<String>,
    created_at: String,
}

impl DBConvertible for Submission {
    type DBType = SqlSubmission;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlSubmission {
            id: self.id.to_db()?,
            state: self.state.to_db()?,
            artist_id: self.artist_id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            year: self.year.clone(),
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(Submission {
            id: SubmissionId::from_db(&value.id)?,
            state: SubmissionState::from_db(&value.state)?,
            artist_id: value.artist_id.clone(),
            user_id: value.user_id.clone(),
            title: value.title.clone(),
            year: value.year.clone(),
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::{SubmissionFilter, SubmissionRepository, SubmissionStorageEvent};
    use crate::{
        models::{NewSubmission, SubmissionId, SubmissionState},
        repository::test_pool,
    };

    fn new_submission(state: SubmissionState, title: &str) -> NewSubmission {
        submission_by("userid", state, title)
    }

    fn submission_by(user_id: &str, state: SubmissionState, title: &str) -> NewSubmission {
        NewSubmission {
            state,
            artist_id: "artistid".to_string(),
            user_id: user_id.to_string(),
            title: Some(title.to_string()),
            year: Some("1992".to_string()),
        }
    }

    #[test(tokio::test)]
    async fn only_approved_submissions_are_listed_as_approved() {
        let repository = SubmissionRepository::new(test_pool().await);

        let approved = repository
            .create_submission(&new_submission(SubmissionState::Approved, "Approved"))
            .await
            .unwrap();
        repository
            .create_submission(&new_submission(SubmissionState::Submitted, "Submitted"))
            .await
            .unwrap();
        repository
            .create_submission(&new_submission(SubmissionState::Rejected, "Rejected"))
            .await
            .unwrap();

        let listed = repository.get_approved_submissions().await.unwrap();
        assert_eq!(listed, vec![approved]);
    }

    #[test(tokio::test)]
    async fn missing_submission_is_none() {
        let repository = SubmissionRepository::new(test_pool().await);

        assert_eq!(repository.get_submission(SubmissionId(42)).await.unwrap(), None);
        assert!(!repository
            .update_state(SubmissionId(42), SubmissionState::Approved)
            .await
            .unwrap());
    }

    #[test(tokio::test)]
    async fn approval_is_broadcast_once() {
        let repository = SubmissionRepository::new(test_pool().await);
        let mut events = repository.subscribe();

        let submission = repository
            .create_submission(&new_submission(SubmissionState::Submitted, "Artwork"))
            .await
            .unwrap();

        assert!(repository
            .update_state(submission.id, SubmissionState::Approved)
            .await
            .unwrap());
        // Already approved, nothing new to announce.
        assert!(repository
            .update_state(submission.id, SubmissionState::Approved)
            .await
            .unwrap());

        assert_eq!(
            events.try_recv().unwrap(),
            SubmissionStorageEvent::SubmissionApproved(submission.id)
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        let stored = repository.get_submission(submission.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SubmissionState::Approved);
    }

    #[test(tokio::test)]
    async fn rejection_is_not_broadcast() {
        let repository = SubmissionRepository::new(test_pool().await);
        let mut events = repository.subscribe();

        let submission = repository
            .create_submission(&new_submission(SubmissionState::Approved, "Artwork"))
            .await
            .unwrap();
        repository
            .update_state(submission.id, SubmissionState::Rejected)
            .await
            .unwrap();

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test(tokio::test)]
    async fn lookup_by_ids_skips_unknown_ids() {
        let repository = SubmissionRepository::new(test_pool().await);

        let first = repository
            .create_submission(&new_submission(SubmissionState::Draft, "First"))
            .await
            .unwrap();
        let second = repository
            .create_submission(&new_submission(SubmissionState::Submitted, "Second"))
            .await
            .unwrap();

        let found = repository
            .get_submissions_by_ids(&[second.id, SubmissionId(1000), first.id])
            .await
            .unwrap();
        assert_eq!(found, vec![first, second]);
    }

    #[test(tokio::test)]
    async fn lookup_by_ids_ignores_duplicates_and_empty_lists() {
        let repository = SubmissionRepository::new(test_pool().await);

        let submission = repository
            .create_submission(&new_submission(SubmissionState::Approved, "Only"))
            .await
            .unwrap();

        assert_eq!(
            repository
                .get_submissions_by_ids(&[submission.id, submission.id])
                .await
                .unwrap(),
            vec![submission]
        );
        assert!(repository.get_submissions_by_ids(&[]).await.unwrap().is_empty());
    }

    #[test(tokio::test)]
    async fn lookup_by_users_excludes_other_users() {
        let repository = SubmissionRepository::new(test_pool().await);

        let first = repository
            .create_submission(&submission_by("userid", SubmissionState::Draft, "First"))
            .await
            .unwrap();
        repository
            .create_submission(&submission_by("otheruser", SubmissionState::Approved, "Other"))
            .await
            .unwrap();
        let second = repository
            .create_submission(&submission_by("userid", SubmissionState::Approved, "Second"))
            .await
            .unwrap();

        let found = repository
            .get_submissions_for_users(&["userid".to_string(), "invalid".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec![first, second]);

        assert!(repository
            .get_submissions_for_users(&["invalid".to_string()])
            .await
            .unwrap()
            .is_empty());
    }

    #[test(tokio::test)]
    async fn filter_criteria_are_combined() {
        let repository = SubmissionRepository::new(test_pool().await);

        let mine = repository
            .create_submission(&submission_by("userid", SubmissionState::Draft, "Mine"))
            .await
            .unwrap();
        let theirs = repository
            .create_submission(&submission_by("otheruser", SubmissionState::Draft, "Theirs"))
            .await
            .unwrap();

        let found = repository
            .find_submissions(&SubmissionFilter {
                ids: Some(vec![mine.id, theirs.id]),
                user_ids: Some(vec!["otheruser".to_string()]),
            })
            .await
            .unwrap();
        assert_eq!(found, vec![theirs]);

        let everything = repository
            .find_submissions(&SubmissionFilter::default())
            .await
            .unwrap();
        assert_eq!(everything.len(), 2);
    }
}
