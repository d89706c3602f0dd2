use log::{debug, error, info, warn};
use luckydraw_core::{Competition, NewCompetition};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{CompetitionStore, Mutated};
use crate::{domain::Error, infra::scheduler::DrawScheduler};

/// Owns the competition rules: creating, joining and drawing all go through here
pub struct CompetitionService {
    store: CompetitionStore,
    scheduler: Arc<dyn DrawScheduler>,
    past_tolerance: Duration,
}

impl CompetitionService {
    pub fn new(
        store: CompetitionStore,
        scheduler: Arc<dyn DrawScheduler>,
        past_tolerance: Duration,
    ) -> Self {
        Self {
            store,
            scheduler,
            past_tolerance,
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.store.ping().await.map_err(Error::DbError)
    }

    /// Closes the database pools once in-flight queries finish
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Validates and stores a new open competition, then asks the scheduler for
    /// the draw callback. If scheduling fails the competition stays stored and
    /// the error is returned.
    pub async fn create(&self, new_competition: NewCompetition) -> Result<Competition, Error> {
        let now = OffsetDateTime::now_utc();
        let competition =
            Competition::open(Uuid::now_v7(), new_competition, now, self.past_tolerance)?;
        let competition = self.store.insert(&competition).await?;

        self.scheduler
            .schedule_draw(competition.id, competition.planned_draw_time)
            .await
            .map_err(|e| {
                error!(
                    "competition {} created but its draw was not scheduled: {}",
                    competition.id, e
                );
                e
            })?;

        info!(
            "competition {} created by {} for '{}', {} winner(s) at {}",
            competition.id,
            competition.creator.participant_id,
            competition.gift,
            competition.winner_count,
            competition.planned_draw_time
        );
        Ok(competition)
    }

    /// Joining twice, or joining a completed competition, returns the competition unchanged
    pub async fn add_competitor(
        &self,
        competition_id: Uuid,
        participant_id: &str,
        display_name: &str,
    ) -> Result<Competition, Error> {
        let mutated = self
            .store
            .mutate(competition_id, |competition| {
                competition.add_competitor(participant_id, display_name)
            })
            .await?;

        if mutated.changed {
            info!("{} joined competition {}", participant_id, competition_id);
        } else {
            debug!(
                "{} not added to competition {}: already joined or completed",
                participant_id, competition_id
            );
        }
        Ok(mutated.competition)
    }

    pub async fn get_competition(&self, competition_id: Uuid) -> Result<Competition, Error> {
        self.store.get(competition_id).await
    }

    /// Picks the winners once. Repeated or late triggers find the competition
    /// completed and get the stored result back with `changed` unset.
    pub async fn draw(&self, competition_id: Uuid) -> Result<Mutated, Error> {
        let now = OffsetDateTime::now_utc();
        let mutated = self
            .store
            .mutate(competition_id, |competition| {
                competition.draw(&mut rand::rng(), now)
            })
            .await?;

        if mutated.changed {
            let competition = &mutated.competition;
            if now < competition.planned_draw_time {
                warn!(
                    "competition {} drawn before its planned time {}",
                    competition_id, competition.planned_draw_time
                );
            }
            info!(
                "competition {} drawn: {} winner(s) out of {} competitor(s)",
                competition_id,
                competition.winner_ids.len(),
                competition.competitors.len()
            );
        } else {
            debug!("competition {} was already drawn", competition_id);
        }
        Ok(mutated)
    }

    /// Remembers which message announces the competition; later calls keep the first id
    pub async fn update_main_activity(
        &self,
        competition_id: Uuid,
        activity_id: &str,
    ) -> Result<Competition, Error> {
        let mutated = self
            .store
            .mutate(competition_id, |competition| {
                competition.set_main_activity(activity_id)
            })
            .await?;
        Ok(mutated.competition)
    }

    /// Marks the winners as announced; later calls keep the first id
    pub async fn update_result_activity(
        &self,
        competition_id: Uuid,
        activity_id: &str,
    ) -> Result<Competition, Error> {
        let mutated = self
            .store
            .mutate(competition_id, |competition| {
                competition.set_result_activity(activity_id)
            })
            .await?;
        Ok(mutated.competition)
    }

    /// Asks the scheduler again for every competition still waiting on its draw.
    /// Used at startup when timers live in process memory.
    pub async fn reschedule_open(&self) -> Result<usize, Error> {
        let open = self.store.list_open().await?;
        let mut scheduled = 0;
        for competition in &open {
            match self
                .scheduler
                .schedule_draw(competition.id, competition.planned_draw_time)
                .await
            {
                Ok(()) => scheduled += 1,
                Err(e) => error!(
                    "failed to reschedule draw for competition {}: {}",
                    competition.id, e
                ),
            }
        }
        info!("rescheduled {}/{} open competitions", scheduled, open.len());
        Ok(scheduled)
    }
}
