use axum::{
    extract::State,
    http::StatusCode,
    response::{ErrorResponse, IntoResponse, Response},
    Json,
};
use log::{debug, error, info};
use luckydraw_core::{parse_command, CommandContext, NewCompetition};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::{
    api::{
        activity::{Activity, InvokeAction, INVOKE_ACTIVITY, MESSAGE_ACTIVITY},
        routes::competitions::refresh_main_activity,
    },
    domain::Error,
    startup::AppState,
};

/// Bot Framework messaging endpoint. Everything outside Teams is acknowledged and dropped.
pub async fn receive_activity(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<Activity>,
) -> Result<Response, ErrorResponse> {
    if !activity.is_from_teams() {
        debug!("ignoring activity from channel '{}'", activity.channel_id);
        return Ok(StatusCode::OK.into_response());
    }

    let result = match activity.activity_type.as_str() {
        MESSAGE_ACTIVITY => handle_message(&state, &activity).await,
        INVOKE_ACTIVITY => handle_invoke(&state, &activity).await,
        other => {
            debug!("ignoring '{}' activity", other);
            Ok(StatusCode::OK.into_response())
        }
    };

    result.map_err(|e| {
        error!(
            "error handling {} activity {:?}: {:?}",
            activity.activity_type, activity.id, e
        );
        e.into()
    })
}

async fn handle_message(state: &AppState, activity: &Activity) -> Result<Response, Error> {
    let text = activity.text.as_deref().unwrap_or_default();
    let mut context = CommandContext::new(
        activity.locale(),
        activity.local_offset(),
        OffsetDateTime::now_utc(),
    );
    context.default_draw_delay = state.competition_settings.default_draw_delay();

    let Some(command) = parse_command(text, &context) else {
        debug!("'{}' is not a creation command, replying with help", text);
        return reply_with_help(state, activity).await;
    };

    let created = state
        .competitions
        .create(NewCompetition {
            origin: activity.service_origin()?,
            locale: activity.locale().to_string(),
            creator: activity.sender(),
            command,
        })
        .await;
    let competition = match created {
        Ok(competition) => competition,
        Err(Error::Validation(reason)) => {
            info!("rejected competition from '{}': {}", text, reason);
            return reply_with_help(state, activity).await;
        }
        Err(e) => return Err(e),
    };

    let card = state.cards.main_activity(&competition);
    let activity_id = state
        .connector
        .send_activity(
            &competition.origin.service_url,
            &competition.origin.channel_id,
            &card,
        )
        .await?;
    let competition = state
        .competitions
        .update_main_activity(competition.id, &activity_id)
        .await?;
    info!(
        "competition {} announced as activity {}",
        competition.id, activity_id
    );

    Ok(Json(competition).into_response())
}

async fn reply_with_help(state: &AppState, activity: &Activity) -> Result<Response, Error> {
    let conversation = activity
        .conversation
        .clone()
        .ok_or_else(|| Error::BadRequest(String::from("message has no conversation")))?;

    let reply = state
        .cards
        .help_activity(
            activity.locale(),
            Some(conversation.clone()),
            activity.id.clone(),
        );
    state
        .connector
        .send_activity(&activity.service_url, &conversation.id, &reply)
        .await?;
    Ok(StatusCode::OK.into_response())
}

async fn handle_invoke(state: &AppState, activity: &Activity) -> Result<Response, Error> {
    match InvokeAction::try_from(activity)? {
        InvokeAction::Join { competition_id } => {
            let sender = activity.sender();
            let competition = state
                .competitions
                .add_competitor(competition_id, &sender.participant_id, &sender.display_name)
                .await?;
            refresh_main_activity(state, &competition).await?;
            Ok(StatusCode::OK.into_response())
        }
        InvokeAction::ViewDetail { competition_id } => {
            let competition = state.competitions.get_competition(competition_id).await?;
            Ok(Json(state.cards.detail_task_module(&competition)).into_response())
        }
    }
}
