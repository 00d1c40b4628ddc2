//! Client for a remote registry service speaking the `/jobs` HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use delta_core::{CaptureState, Job, JobDefinition, ValidationError};

use crate::api::{ErrorBody, LifecycleResponse, UpdateStateRequest};
use crate::{JobRegistry, RegistryError};

/// How a 400 from the service should be surfaced.
#[derive(Clone, Copy)]
enum BadRequest {
    Definition,
    State,
}

pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(
        resp: Response,
        id: Option<Uuid>,
        bad_request: BadRequest,
    ) -> Result<T, RegistryError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        debug!(%status, %message, "registry request rejected");

        match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(RegistryError::NotFound(id)),
            (StatusCode::BAD_REQUEST, _) => match bad_request {
                BadRequest::Definition => {
                    Err(RegistryError::Validation(ValidationError::Malformed(message)))
                }
                BadRequest::State => Err(RegistryError::InvalidState(message)),
            },
            _ => Err(RegistryError::Transport(format!("{status}: {message}"))),
        }
    }
}

#[async_trait]
impl JobRegistry for HttpRegistry {
    async fn create(&self, definition: JobDefinition) -> Result<Job, RegistryError> {
        definition.validate()?;
        let resp = self
            .client
            .post(self.url("/jobs"))
            .json(&definition)
            .send()
            .await?;
        Self::read(resp, None, BadRequest::Definition).await
    }

    async fn get(&self, id: Uuid) -> Result<Job, RegistryError> {
        let resp = self.client.get(self.url(&format!("/jobs/{id}"))).send().await?;
        Self::read(resp, Some(id), BadRequest::Definition).await
    }

    async fn list(&self) -> Result<Vec<Job>, RegistryError> {
        let resp = self.client.get(self.url("/jobs")).send().await?;
        Self::read(resp, None, BadRequest::Definition).await
    }

    async fn start(&self, id: Uuid) -> Result<Job, RegistryError> {
        let resp = self
            .client
            .post(self.url(&format!("/jobs/{id}/start")))
            .send()
            .await?;
        let body: LifecycleResponse = Self::read(resp, Some(id), BadRequest::Definition).await?;
        Ok(body.job)
    }

    async fn stop(&self, id: Uuid) -> Result<Job, RegistryError> {
        let resp = self
            .client
            .post(self.url(&format!("/jobs/{id}/stop")))
            .send()
            .await?;
        let body: LifecycleResponse = Self::read(resp, Some(id), BadRequest::Definition).await?;
        Ok(body.job)
    }

    async fn update_state(&self, id: Uuid, state: CaptureState) -> Result<(), RegistryError> {
        let resp = self
            .client
            .post(self.url(&format!("/jobs/{id}/_update_state")))
            .json(&UpdateStateRequest { state: Some(state) })
            .send()
            .await?;
        let _: serde_json::Value = Self::read(resp, Some(id), BadRequest::State).await?;
        Ok(())
    }
}
