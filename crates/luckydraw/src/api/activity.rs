//! Inbound Bot Framework activities and the invoke actions carried by card buttons

use luckydraw_core::{Competitor, ServiceOrigin};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::domain::Error;

pub const MSTEAMS_CHANNEL: &str = "msteams";
pub const MESSAGE_ACTIVITY: &str = "message";
pub const INVOKE_ACTIVITY: &str = "invoke";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub channel_id: String,
    pub service_url: String,
    pub text: Option<String>,
    pub locale: Option<String>,
    /// Sender's local time, only the offset is used
    pub local_timestamp: Option<String>,
    pub from: ChannelAccount,
    pub conversation: Option<ConversationAccount>,
    pub channel_data: Option<TeamsChannelData>,
    pub value: Option<serde_json::Value>,
}

impl Activity {
    pub fn is_from_teams(&self) -> bool {
        self.channel_id == MSTEAMS_CHANNEL
    }

    pub fn local_offset(&self) -> Option<UtcOffset> {
        self.local_timestamp
            .as_deref()
            .and_then(|timestamp| OffsetDateTime::parse(timestamp, &Rfc3339).ok())
            .map(|timestamp| timestamp.offset())
    }

    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or("en-US")
    }

    /// The sender as a competitor, keyed by directory object id when present
    pub fn sender(&self) -> Competitor {
        let participant_id = self
            .from
            .aad_object_id
            .clone()
            .unwrap_or_else(|| self.from.id.clone());
        Competitor::new(participant_id, self.from.name.clone())
    }

    /// Where the message was posted, from the Teams channel data
    pub fn service_origin(&self) -> Result<ServiceOrigin, Error> {
        let channel_data = self
            .channel_data
            .as_ref()
            .ok_or_else(|| Error::BadRequest(String::from("activity has no channel data")))?;
        let channel_id = channel_data
            .channel
            .as_ref()
            .map(|c| c.id.clone())
            .or_else(|| self.conversation.as_ref().map(|c| c.id.clone()))
            .ok_or_else(|| Error::BadRequest(String::from("activity has no channel")))?;

        Ok(ServiceOrigin {
            service_url: self.service_url.clone(),
            tenant_id: channel_data
                .tenant
                .as_ref()
                .map(|t| t.id.clone())
                .unwrap_or_default(),
            team_id: channel_data
                .team
                .as_ref()
                .map(|t| t.id.clone())
                .unwrap_or_default(),
            channel_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelAccount {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationAccount {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamsChannelData {
    pub tenant: Option<TeamsEntity>,
    pub team: Option<TeamsEntity>,
    pub channel: Option<TeamsEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamsEntity {
    pub id: String,
}

/// Payload attached to card buttons, echoed back on invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeValue {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub invoke_type: Option<String>,
    #[serde(default)]
    pub user_action: String,
    #[serde(default)]
    pub competition_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeActionKind {
    Join,
    ViewDetail,
}

impl InvokeActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvokeActionKind::Join => "Join",
            InvokeActionKind::ViewDetail => "ViewDetail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeAction {
    Join { competition_id: Uuid },
    ViewDetail { competition_id: Uuid },
}

impl TryFrom<InvokeValue> for InvokeAction {
    type Error = Error;

    fn try_from(value: InvokeValue) -> Result<Self, Self::Error> {
        let kind = match value.user_action.as_str() {
            "Join" => InvokeActionKind::Join,
            "ViewDetail" => InvokeActionKind::ViewDetail,
            other => return Err(Error::UnrecognizedAction(other.to_string())),
        };
        let competition_id = value.competition_id.ok_or_else(|| {
            Error::BadRequest(format!("{} action has no competition id", kind.as_str()))
        })?;

        Ok(match kind {
            InvokeActionKind::Join => InvokeAction::Join { competition_id },
            InvokeActionKind::ViewDetail => InvokeAction::ViewDetail { competition_id },
        })
    }
}

impl TryFrom<&Activity> for InvokeAction {
    type Error = Error;

    /// `task/fetch` invokes wrap the button payload in `value.data`
    fn try_from(activity: &Activity) -> Result<Self, Self::Error> {
        let value = activity
            .value
            .as_ref()
            .ok_or_else(|| Error::BadRequest(String::from("invoke activity has no value")))?;
        let payload = if activity.name.as_deref() == Some(crate::api::cards::TASK_FETCH) {
            value.get("data").cloned().unwrap_or_default()
        } else {
            value.clone()
        };

        let invoke_value: InvokeValue = serde_json::from_value(payload)
            .map_err(|e| Error::BadRequest(format!("invalid invoke value: {}", e)))?;
        InvokeAction::try_from(invoke_value)
    }
}
