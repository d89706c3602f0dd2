use async_trait::async_trait;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use log::{debug, error, info};
use mime::APPLICATION_JSON;
use reqwest_middleware::{
    reqwest::{Method, StatusCode, Url},
    ClientWithMiddleware,
};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::api::cards::OutgoingActivity;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("invalid service url: {0}")]
    InvalidUrl(String),
    #[error("problem sending request to chat connector: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("problem reading chat connector response: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("chat connector answered with status {0}: {1}")]
    Rejected(StatusCode, String),
    #[error("chat connector returned no activity id: {0}")]
    MissingActivityId(String),
}

/// Posts and updates activities in a chat conversation
#[async_trait]
pub trait ChatConnector: Send + Sync {
    /// Returns the id of the new activity
    async fn send_activity(
        &self,
        service_url: &str,
        conversation_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<String, ConnectorError>;

    async fn update_activity(
        &self,
        service_url: &str,
        conversation_id: &str,
        activity_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<(), ConnectorError>;
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: String,
}

/// The id of a freshly posted activity, which later updates are addressed to
pub fn parse_activity_id(body: &[u8]) -> Result<String, ConnectorError> {
    let response: ResourceResponse = serde_json::from_slice(body).map_err(|e| {
        ConnectorError::MissingActivityId(format!(
            "{}: {}",
            e,
            String::from_utf8_lossy(body)
        ))
    })?;
    if response.id.trim().is_empty() {
        return Err(ConnectorError::MissingActivityId(
            String::from_utf8_lossy(body).to_string(),
        ));
    }
    Ok(response.id)
}

/// Bot Connector REST client, `{serviceUrl}/v3/conversations/{id}/activities`
pub struct BotConnectorClient {
    client: ClientWithMiddleware,
    bearer_token: Option<String>,
}

impl BotConnectorClient {
    pub fn new(client: ClientWithMiddleware, bearer_token: Option<String>) -> Self {
        Self {
            client,
            bearer_token,
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        activity: &OutgoingActivity,
    ) -> Result<Vec<u8>, ConnectorError> {
        let mut request = self
            .client
            .request(method, url.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON.to_string())
            .json(activity);
        if let Some(token) = &self.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            error!("error sending to chat connector {}: {}", url, e);
            ConnectorError::SendRetry(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Rejected(status, body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Each id becomes a single path segment, `/` `?` and `#` inside it are escaped
pub fn activities_url(
    service_url: &str,
    conversation_id: &str,
    activity_id: Option<&str>,
) -> Result<Url, ConnectorError> {
    let mut url = Url::parse(service_url)
        .map_err(|e| ConnectorError::InvalidUrl(format!("{}: {}", service_url, e)))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ConnectorError::InvalidUrl(service_url.to_string()))?;
        segments
            .pop_if_empty()
            .extend(["v3", "conversations", conversation_id, "activities"]);
        if let Some(activity_id) = activity_id {
            segments.push(activity_id);
        }
    }
    Ok(url)
}

#[async_trait]
impl ChatConnector for BotConnectorClient {
    async fn send_activity(
        &self,
        service_url: &str,
        conversation_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<String, ConnectorError> {
        let url = activities_url(service_url, conversation_id, None)?;
        let body = self.send(Method::POST, url, activity).await?;
        let activity_id = parse_activity_id(&body)?;
        info!(
            "posted activity {} to conversation {}",
            activity_id, conversation_id
        );
        Ok(activity_id)
    }

    async fn update_activity(
        &self,
        service_url: &str,
        conversation_id: &str,
        activity_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<(), ConnectorError> {
        let url = activities_url(service_url, conversation_id, Some(activity_id))?;
        // Updates often come back with an empty body, nothing in it is needed
        self.send(Method::PUT, url, activity).await?;
        debug!("updated activity {} in {}", activity_id, conversation_id);
        Ok(())
    }
}

/// Used when outbound chat calls are disabled; logs the card and hands out fresh ids
#[derive(Debug, Default)]
pub struct NoopConnector;

#[async_trait]
impl ChatConnector for NoopConnector {
    async fn send_activity(
        &self,
        _service_url: &str,
        conversation_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<String, ConnectorError> {
        let id = format!("noop-{}", Uuid::now_v7());
        debug!(
            "connector disabled, not posting {} to {}: {:?}",
            id, conversation_id, activity
        );
        Ok(id)
    }

    async fn update_activity(
        &self,
        _service_url: &str,
        conversation_id: &str,
        activity_id: &str,
        activity: &OutgoingActivity,
    ) -> Result<(), ConnectorError> {
        debug!(
            "connector disabled, not updating {} in {}: {:?}",
            activity_id, conversation_id, activity
        );
        Ok(())
    }
}
