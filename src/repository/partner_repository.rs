use sqlx::{query_as, FromRow, Pool, QueryBuilder, Sqlite};
use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::{
    models::{types::UtcDateTime, NewPartner, Partner, PartnerId},
    repository::conversion::DBConvertible,
    utils::name_search::{search_key, PrefixQuery},
};

use super::conversion::{DBFromConversionError, DBToConversionError};

#[derive(Debug)]
pub struct PartnerRepository {
    pool: Pool<Sqlite>,
    events: Sender<PartnerStorageEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartnerStorageEvent {
    PartnerCreated(Partner),
}

impl PartnerRepository {
    pub fn new(pool: Pool<Sqlite>) -> PartnerRepository {
        PartnerRepository {
            pool,
            events: broadcast::channel(128).0,
        }
    }

    pub async fn create_partner(&self, new_partner: &NewPartner) -> Result<Partner, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let created = {
            let created_at = UtcDateTime::now().to_db()?;

            query_as::<_, SqlPartner>(
                r#"
                    INSERT INTO partners (name, search_name, external_id, created_at)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, name, external_id, created_at
                "#,
            )
            .bind(&new_partner.name)
            .bind(search_key(&new_partner.name))
            .bind(&new_partner.external_id)
            .bind(created_at)
            .fetch_one(&mut *transaction)
            .await?
        };

        transaction.commit().await?;

        let partner = Partner::from_db(&created)?;

        let _ = self
            .events
            .send(PartnerStorageEvent::PartnerCreated(partner.clone())); // Nobody may be listening

        Ok(partner)
    }

    pub async fn get_partner(&self, id: PartnerId) -> Result<Option<Partner>, anyhow::Error> {
        let id = id.to_db()?;

        let partner = query_as::<_, SqlPartner>(
            r#"SELECT id, name, external_id, created_at FROM partners WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match partner {
            Some(partner) => Ok(Some(Partner::from_db(&partner)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all_partners(&self) -> Result<Vec<Partner>, anyhow::Error> {
        let partners = query_as::<_, SqlPartner>(
            r#"SELECT id, name, external_id, created_at FROM partners ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        partners
            .iter()
            .map(|p| Partner::from_db(p).map_err(anyhow::Error::from))
            .collect()
    }

    /// Finds partners whose name has a word starting with every word of `query`,
    /// ignoring case and diacritics. Results are ordered by name.
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<Partner>, anyhow::Error> {
        let query = PrefixQuery::parse(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
                SELECT id, name, external_id, created_at
                FROM partners
                WHERE 1 = 1
            "#,
        );

        // Query words are plain `[a-z0-9]+`, so they carry no LIKE wildcards.
        for word in query.words() {
            builder.push(" AND (' ' || search_name) LIKE ");
            builder.push_bind(format!("% {word}%"));
        }

        builder.push(" ORDER BY name, id");

        let partners = builder
            .build_query_as::<SqlPartner>()
            .fetch_all(&self.pool)
            .await?;

        let partners = partners
            .iter()
            .map(Partner::from_db)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(partners
            .into_iter()
            .filter(|partner| query.matches(&partner.name))
            .collect())
    }

    pub fn subscribe(&self) -> Receiver<PartnerStorageEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, FromRow)]
pub struct SqlPartner {
    id: i64,
    name: String,
    external_id: String,
    created_at: String,
}

impl DBConvertible for Partner {
    type DBType = SqlPartner;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlPartner {
            id: self.id.to_db()?,
            name: self.name.clone(),
            external_id: self.external_id.clone(),
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(Partner {
            id: PartnerId::from_db(&value.id)?,
            name: value.name.clone(),
            external_id: value.external_id.clone(),
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}
