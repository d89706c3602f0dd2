//! Competition aggregate and the values that hang off it

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{select_winners, validate_new_competition, CompetitionCommand, CoreError};

/// Someone taking part in a competition, identified by their directory object id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub participant_id: String,
    pub display_name: String,
}

impl Competitor {
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Where a competition was created, and so where updates about it are delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrigin {
    pub service_url: String,
    pub tenant_id: String,
    pub team_id: String,
    pub channel_id: String,
}

/// Everything needed to open a competition
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompetition {
    pub origin: ServiceOrigin,
    pub locale: String,
    pub creator: Competitor,
    pub command: CompetitionCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: Uuid,
    pub origin: ServiceOrigin,
    pub gift: String,
    pub gift_image_url: Option<String>,
    pub winner_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub planned_draw_time: OffsetDateTime,
    pub locale: String,
    /// Creator's UTC offset, only used to display times back to them
    pub offset_hours: f64,
    pub creator: Competitor,
    /// Id of the announcement message, set once after it is first posted
    pub main_activity_id: Option<String>,
    /// Join order is preserved
    pub competitors: Vec<Competitor>,
    pub is_completed: bool,
    pub winner_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub drawn_at: Option<OffsetDateTime>,
    /// Id of the result message; unset on a drawn competition until the winners are announced
    #[serde(default)]
    pub result_activity_id: Option<String>,
}

impl Competition {
    /// Validates the creation parameters and builds an open competition with no competitors
    pub fn open(
        id: Uuid,
        new_competition: NewCompetition,
        now: OffsetDateTime,
        past_tolerance: Duration,
    ) -> Result<Self, CoreError> {
        let winner_count = validate_new_competition(&new_competition.command, now, past_tolerance)?;
        let NewCompetition {
            origin,
            locale,
            creator,
            command,
        } = new_competition;

        Ok(Self {
            id,
            origin,
            gift: command.gift,
            gift_image_url: command.gift_image_url,
            winner_count,
            planned_draw_time: command.planned_draw_time,
            locale,
            offset_hours: command.offset_hours,
            creator,
            main_activity_id: None,
            competitors: vec![],
            is_completed: false,
            winner_ids: vec![],
            created_at: now,
            drawn_at: None,
            result_activity_id: None,
        })
    }

    pub fn has_competitor(&self, participant_id: &str) -> bool {
        self.competitors
            .iter()
            .any(|c| c.participant_id == participant_id)
    }

    /// Appends a competitor while the competition is open.
    /// Returns false when nothing changed: already completed or already joined.
    pub fn add_competitor(&mut self, participant_id: &str, display_name: &str) -> bool {
        if self.is_completed || self.has_competitor(participant_id) {
            return false;
        }
        self.competitors
            .push(Competitor::new(participant_id, display_name));
        true
    }

    /// Records the announcement message id; the first recorded id wins
    pub fn set_main_activity(&mut self, activity_id: &str) -> bool {
        if self.main_activity_id.is_some() {
            return false;
        }
        self.main_activity_id = Some(activity_id.to_string());
        true
    }

    /// Picks the winners and closes the competition in one step.
    /// A completed competition is left untouched and false is returned, so
    /// repeated or late draw triggers never change the winners.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, now: OffsetDateTime) -> bool {
        if self.is_completed {
            return false;
        }
        self.winner_ids = select_winners(&self.competitors, self.winner_count, rng);
        self.is_completed = true;
        self.drawn_at = Some(now);
        true
    }

    /// Records the result message once the competition is drawn; the first id wins
    pub fn set_result_activity(&mut self, activity_id: &str) -> bool {
        if !self.is_completed || self.result_activity_id.is_some() {
            return false;
        }
        self.result_activity_id = Some(activity_id.to_string());
        true
    }

    pub fn needs_result_announcement(&self) -> bool {
        self.is_completed && self.result_activity_id.is_none()
    }

    /// Winning competitors in draw order
    pub fn winners(&self) -> Vec<&Competitor> {
        self.winner_ids
            .iter()
            .filter_map(|id| self.competitors.iter().find(|c| &c.participant_id == id))
            .collect()
    }
}
