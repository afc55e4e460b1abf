//! REST implementation of [`RemoteApi`] over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::api::{Page, PageRequest, RecordBody, RemoteApi, RemoteRecord};
use super::error::ApiError;
use super::kind::EntityKind;

/// Timeout for the reachability check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to the story server's `/api` routes with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpApi {
    server_url: String,
    api_key: String,
    client: Client,
}

impl HttpApi {
    pub fn new(server_url: String, api_key: String) -> Self {
        Self {
            server_url,
            api_key,
            client: Client::new(),
        }
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        build_http_url(&self.server_url, &format!("/api/{}", kind.collection()))
    }

    fn record_url(&self, kind: EntityKind, server_id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), server_id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

/// Turns a response into `R`, mapping 404 to [`ApiError::NotFound`].
async fn read_json<R: DeserializeOwned>(response: Response, what: &str) -> Result<R, ApiError> {
    let response = check_status(response, what).await?;
    response
        .json()
        .await
        .map_err(|e| ApiError::InvalidPayload(e.to_string()))
}

async fn check_status(response: Response, what: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        });
    }
    Ok(response)
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn create(&self, kind: EntityKind, body: RecordBody) -> Result<RemoteRecord, ApiError> {
        let url = self.collection_url(kind);
        let response = self.send(self.client.post(&url).json(&body)).await?;
        read_json(response, &url).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        server_id: &str,
        body: RecordBody,
    ) -> Result<RemoteRecord, ApiError> {
        let url = self.record_url(kind, server_id);
        let response = self.send(self.client.put(&url).json(&body)).await?;
        read_json(response, server_id).await
    }

    async fn delete(&self, kind: EntityKind, server_id: &str) -> Result<(), ApiError> {
        let url = self.record_url(kind, server_id);
        let response = self.send(self.client.delete(&url)).await?;
        check_status(response, server_id).await?;
        Ok(())
    }

    async fn get(&self, kind: EntityKind, server_id: &str) -> Result<RemoteRecord, ApiError> {
        let url = self.record_url(kind, server_id);
        let response = self.send(self.client.get(&url)).await?;
        read_json(response, server_id).await
    }

    async fn list(&self, kind: EntityKind, page: PageRequest) -> Result<Page, ApiError> {
        let url = self.collection_url(kind);
        let mut query = vec![("limit", page.limit.to_string())];
        if let Some(cursor) = page.cursor {
            query.push(("cursor", cursor));
        }
        let response = self.send(self.client.get(&url).query(&query)).await?;
        read_json(response, &url).await
    }
}

/// Builds an HTTP URL for a given path, defaulting to `http://`.
fn build_http_url(server_url: &str, path: &str) -> String {
    let base_url = if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Returns true when the server answers its health endpoint.
pub async fn check_server(server_url: &str) -> bool {
    let url = build_http_url(server_url, "/health");
    let client = Client::new();
    match tokio::time::timeout(HEALTH_TIMEOUT, client.get(&url).send()).await {
        Ok(Ok(response)) => response.status().is_success(),
        Ok(Err(e)) => {
            tracing::debug!("Health check failed: {}", e);
            false
        }
        Err(_) => {
            tracing::debug!("Health check timed out after {:?}", HEALTH_TIMEOUT);
            false
        }
    }
}
