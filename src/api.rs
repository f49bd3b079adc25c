use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContentType, Message, Session};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("{0}")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything the chat controller needs from a store of record.
///
/// Each call is one request and one response: no retries, no caching.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_sessions(&self) -> ApiResult<Vec<Session>>;
    async fn create_session(&self, title: &str) -> ApiResult<Session>;
    async fn delete_session(&self, session_id: &str) -> ApiResult<()>;
    async fn list_messages(&self, session_id: &str) -> ApiResult<Vec<Message>>;
    /// Returns the assistant's reply; the user turn is stored by the backend.
    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiResult<Message>;
    async fn download(&self, message_id: &str) -> ApiResult<Vec<u8>>;
    async fn ping(&self) -> ApiResult<String>;
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    message_type: ContentType,
}

#[derive(Deserialize)]
struct ServiceBanner {
    message: String,
}

/// HTTP client for the chat service's `/api` surface
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_base: String,
}

impl ApiClient {
    /// `api_base` already includes the `/api` suffix
    pub fn new(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!(%method, %url, "api request");
        self.client.request(method, url)
    }

    async fn execute(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!(status = status.as_u16(), url = %response.url(), "api response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "api error response");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
        self.json(self.request(Method::GET, "/sessions")).await
    }

    async fn create_session(&self, title: &str) -> ApiResult<Session> {
        let body = CreateSessionRequest { title };
        self.json(self.request(Method::POST, "/sessions").json(&body))
            .await
    }

    async fn delete_session(&self, session_id: &str) -> ApiResult<()> {
        let path = format!("/sessions/{}", session_id);
        self.execute(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> ApiResult<Vec<Message>> {
        let path = format!("/sessions/{}/messages", session_id);
        self.json(self.request(Method::GET, &path)).await
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        content_type: ContentType,
    ) -> ApiResult<Message> {
        let path = format!("/sessions/{}/messages", session_id);
        let body = SendMessageRequest {
            content,
            message_type: content_type,
        };
        self.json(self.request(Method::POST, &path).json(&body)).await
    }

    async fn download(&self, message_id: &str) -> ApiResult<Vec<u8>> {
        let path = format!("/download/{}", message_id);
        let response = self.execute(self.request(Method::GET, &path)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn ping(&self) -> ApiResult<String> {
        let banner: ServiceBanner = self.json(self.request(Method::GET, "/")).await?;
        Ok(banner.message)
    }
}
