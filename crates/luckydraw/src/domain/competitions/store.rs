use log::{debug, info, warn};
use luckydraw_core::{Competition, Competitor, ServiceOrigin};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqlitePool};
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::db::{
        format_datetime, is_transient, is_unique_violation, parse_optional_datetime,
        parse_required_blob_json, parse_required_datetime, to_blob_json, DBConnection,
    },
};

const COMPETITION_COLUMNS: &str = "id, service_url, tenant_id, team_id, channel_id, gift, \
    gift_image_url, winner_count, planned_draw_time, locale, offset_hours, creator_id, \
    creator_name, main_activity_id, competitors, is_completed, winner_ids, created_at, \
    drawn_at, result_activity_id, version";

/// A competition together with the row version it was read at
#[derive(Debug, Clone)]
pub struct StoredCompetition {
    pub competition: Competition,
    pub version: i64,
}

impl FromRow<'_, SqliteRow> for StoredCompetition {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let winner_count: i64 = row.try_get("winner_count")?;

        Ok(StoredCompetition {
            competition: Competition {
                id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "id".to_string(),
                    source: Box::new(e),
                })?,
                origin: ServiceOrigin {
                    service_url: row.try_get("service_url")?,
                    tenant_id: row.try_get("tenant_id")?,
                    team_id: row.try_get("team_id")?,
                    channel_id: row.try_get("channel_id")?,
                },
                gift: row.try_get("gift")?,
                gift_image_url: row.try_get("gift_image_url")?,
                winner_count: u32::try_from(winner_count).map_err(|e| {
                    sqlx::Error::ColumnDecode {
                        index: "winner_count".to_string(),
                        source: Box::new(e),
                    }
                })?,
                planned_draw_time: parse_required_datetime(row, "planned_draw_time")?,
                locale: row.try_get("locale")?,
                offset_hours: row.try_get("offset_hours")?,
                creator: Competitor {
                    participant_id: row.try_get("creator_id")?,
                    display_name: row.try_get("creator_name")?,
                },
                main_activity_id: row.try_get("main_activity_id")?,
                competitors: parse_required_blob_json(row, "competitors")?,
                is_completed: row.try_get("is_completed")?,
                winner_ids: parse_required_blob_json(row, "winner_ids")?,
                created_at: parse_required_datetime(row, "created_at")?,
                drawn_at: parse_optional_datetime(row, "drawn_at")?,
                result_activity_id: row.try_get("result_activity_id")?,
            },
            version: row.try_get("version")?,
        })
    }
}

/// Result of a read-modify-write. `changed` is false when the transform left the
/// competition alone and nothing was written.
#[derive(Debug, Clone)]
pub struct Mutated {
    pub competition: Competition,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct CompetitionStore {
    db_connection: DBConnection,
    max_mutate_attempts: u32,
}

impl CompetitionStore {
    pub fn new(db_connection: DBConnection, max_mutate_attempts: u32) -> Self {
        Self {
            db_connection,
            max_mutate_attempts,
        }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn close(&self) {
        self.db_connection.close().await;
    }

    pub async fn insert(&self, competition: &Competition) -> Result<Competition, Error> {
        let query = format!(
            "INSERT INTO competitions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
            COMPETITION_COLUMNS
        );
        let result = sqlx::query(&query)
            .bind(competition.id.to_string())
            .bind(&competition.origin.service_url)
            .bind(&competition.origin.tenant_id)
            .bind(&competition.origin.team_id)
            .bind(&competition.origin.channel_id)
            .bind(&competition.gift)
            .bind(&competition.gift_image_url)
            .bind(i64::from(competition.winner_count))
            .bind(format_datetime(&competition.planned_draw_time)?)
            .bind(&competition.locale)
            .bind(competition.offset_hours)
            .bind(&competition.creator.participant_id)
            .bind(&competition.creator.display_name)
            .bind(&competition.main_activity_id)
            .bind(to_blob_json(&competition.competitors)?)
            .bind(competition.is_completed)
            .bind(to_blob_json(&competition.winner_ids)?)
            .bind(format_datetime(&competition.created_at)?)
            .bind(
                competition
                    .drawn_at
                    .as_ref()
                    .map(format_datetime)
                    .transpose()?,
            )
            .bind(&competition.result_activity_id)
            .execute(self.db_connection.write())
            .await;

        match result {
            Ok(_) => {
                info!("competition {} stored", competition.id);
                Ok(competition.clone())
            }
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists(format!(
                "competition {}",
                competition.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Competition, Error> {
        self.load(id, self.db_connection.read())
            .await
            .map(|stored| stored.competition)
    }

    /// Open competitions, soonest draw first
    pub async fn list_open(&self) -> Result<Vec<Competition>, Error> {
        let query = format!(
            "SELECT {} FROM competitions WHERE is_completed = 0 ORDER BY planned_draw_time",
            COMPETITION_COLUMNS
        );
        let rows: Vec<StoredCompetition> = sqlx::query_as(&query)
            .fetch_all(self.db_connection.read())
            .await?;
        Ok(rows.into_iter().map(|stored| stored.competition).collect())
    }

    /// Loads the competition, applies `transform` and writes the result back only if
    /// the row still has the version that was loaded. On a lost race or a busy
    /// database the whole transform is re-run against a fresh copy.
    ///
    /// `transform` returns whether it changed anything; when it didn't, nothing is
    /// written and the loaded state is returned as is.
    pub async fn mutate<F>(&self, id: Uuid, mut transform: F) -> Result<Mutated, Error>
    where
        F: FnMut(&mut Competition) -> bool + Send,
    {
        for attempt in 1..=self.max_mutate_attempts {
            let StoredCompetition {
                mut competition,
                version,
            } = match self.load(id, self.db_connection.write()).await {
                Ok(stored) => stored,
                Err(Error::DbError(e)) if is_transient(&e) => {
                    warn!(
                        "loading competition {} failed on attempt {}/{}: {}",
                        id, attempt, self.max_mutate_attempts, e
                    );
                    backoff(attempt).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !transform(&mut competition) {
                debug!("competition {} left unchanged at version {}", id, version);
                return Ok(Mutated {
                    competition,
                    changed: false,
                });
            }

            match self.compare_and_swap(&competition, version).await {
                Ok(true) => {
                    debug!("competition {} written at version {}", id, version + 1);
                    return Ok(Mutated {
                        competition,
                        changed: true,
                    });
                }
                Ok(false) => warn!(
                    "competition {} changed since version {}, retrying ({}/{})",
                    id, version, attempt, self.max_mutate_attempts
                ),
                Err(e) if is_transient(&e) => warn!(
                    "writing competition {} failed on attempt {}/{}: {}",
                    id, attempt, self.max_mutate_attempts, e
                ),
                Err(e) => return Err(e.into()),
            }
            backoff(attempt).await;
        }

        Err(Error::Conflict(id.to_string()))
    }

    async fn load(&self, id: Uuid, pool: &SqlitePool) -> Result<StoredCompetition, Error> {
        let query = format!("SELECT {} FROM competitions WHERE id = ?", COMPETITION_COLUMNS);
        sqlx::query_as::<_, StoredCompetition>(&query)
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("competition {}", id)))
    }

    /// Only the columns that may change after creation are written
    async fn compare_and_swap(
        &self,
        competition: &Competition,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE competitions
             SET main_activity_id = ?,
                 competitors = ?,
                 is_completed = ?,
                 winner_ids = ?,
                 drawn_at = ?,
                 result_activity_id = ?,
                 version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&competition.main_activity_id)
        .bind(to_blob_json(&competition.competitors)?)
        .bind(competition.is_completed)
        .bind(to_blob_json(&competition.winner_ids)?)
        .bind(
            competition
                .drawn_at
                .as_ref()
                .map(format_datetime)
                .transpose()?,
        )
        .bind(&competition.result_activity_id)
        .bind(competition.id.to_string())
        .bind(expected_version)
        .execute(self.db_connection.write())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(StdDuration::from_millis(5 * u64::from(attempt.min(20)))).await;
}
