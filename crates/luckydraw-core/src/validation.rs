//! Validation of new competitions

use time::{Duration, OffsetDateTime};

use crate::{CompetitionCommand, CoreError};

/// Checks the creation parameters and returns the winner count as a `u32`.
///
/// The draw time may lie at most `past_tolerance` before `now`.
pub fn validate_new_competition(
    command: &CompetitionCommand,
    now: OffsetDateTime,
    past_tolerance: Duration,
) -> Result<u32, CoreError> {
    if command.gift.trim().is_empty() {
        return Err(CoreError::Validation("gift cannot be empty".into()));
    }

    let winner_count = u32::try_from(command.winner_count)
        .ok()
        .filter(|count| *count >= 1)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "winner count must be at least 1, got {}",
                command.winner_count
            ))
        })?;

    // A tolerance reaching past the earliest representable instant accepts any time
    let too_early = now
        .checked_sub(past_tolerance)
        .is_some_and(|earliest| command.planned_draw_time < earliest);
    if too_early {
        return Err(CoreError::Validation(format!(
            "planned draw time {} is in the past",
            command.planned_draw_time
        )));
    }

    Ok(winner_count)
}
