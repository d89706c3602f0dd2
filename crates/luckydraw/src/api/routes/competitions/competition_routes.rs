use axum::{
    extract::{Path, State},
    response::ErrorResponse,
    Json,
};
use log::{debug, error, info, warn};
use luckydraw_core::Competition;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{Error, Mutated},
    startup::AppState,
};

pub async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
) -> Result<Json<Competition>, ErrorResponse> {
    state
        .competitions
        .get_competition(competition_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting competition {}: {:?}", competition_id, e);
            e.into()
        })
}

/// Called by the draw scheduler, possibly more than once and possibly late.
/// The winners are posted until one post succeeds; later calls only return them.
pub async fn draw_competition(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
) -> Result<Json<Competition>, ErrorResponse> {
    draw_and_announce(&state, competition_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error drawing competition {}: {:?}", competition_id, e);
            e.into()
        })
}

async fn draw_and_announce(state: &AppState, competition_id: Uuid) -> Result<Competition, Error> {
    let Mutated {
        competition,
        changed,
    } = state.competitions.draw(competition_id).await?;

    if !competition.needs_result_announcement() {
        debug!(
            "competition {} already announced, skipping cards",
            competition_id
        );
        return Ok(competition);
    }
    if !changed {
        warn!(
            "competition {} was drawn earlier but its results were never posted",
            competition_id
        );
    }

    let result = state.cards.result_activity(&competition);
    let result_activity_id = state
        .connector
        .send_activity(
            &competition.origin.service_url,
            &competition.origin.channel_id,
            &result,
        )
        .await?;
    let competition = state
        .competitions
        .update_result_activity(competition_id, &result_activity_id)
        .await?;
    refresh_main_activity(state, &competition).await?;
    info!("competition {} results announced", competition_id);

    Ok(competition)
}

/// Re-renders the announcement card in place, if it was ever posted
pub(crate) async fn refresh_main_activity(
    state: &AppState,
    competition: &Competition,
) -> Result<(), Error> {
    let Some(activity_id) = competition.main_activity_id.as_deref() else {
        debug!(
            "competition {} has no announcement to update",
            competition.id
        );
        return Ok(());
    };

    let card = state.cards.main_activity(competition);
    state
        .connector
        .update_activity(
            &competition.origin.service_url,
            &competition.origin.channel_id,
            activity_id,
            &card,
        )
        .await?;
    Ok(())
}
