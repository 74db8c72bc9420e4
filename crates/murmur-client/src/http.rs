//! HTTP implementation of [`RestApi`] backed by `reqwest`.

use async_trait::async_trait;
use murmur_proto::{HistoryPage, MessageRecord, RoomKey};
use serde::Serialize;

use crate::{error::ApiError, rest::RestApi};

/// REST client for the chat server.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct PostBody<'a> {
    message: &'a str,
    client_ref: u64,
}

impl HttpApi {
    /// Create a client for `base_url` (e.g. `https://chat.example/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url, token: None }
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn room_url(&self, room: RoomKey, suffix: &str) -> String {
        format!("{}/workspaces/{}/rooms/{}/{suffix}", self.base_url, room.workspace_id, room.room_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map a non-2xx response to `ApiError::Status`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl RestApi for HttpApi {
    async fn fetch_history(
        &self,
        room: RoomKey,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, ApiError> {
        let request = self
            .client
            .get(self.room_url(room, "messages"))
            .query(&[("limit", limit), ("offset", offset)]);

        let response = check(self.authorize(request).send().await?).await?;
        response.json::<HistoryPage>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_message(
        &self,
        room: RoomKey,
        body: &str,
        client_ref: u64,
    ) -> Result<MessageRecord, ApiError> {
        let request = self
            .client
            .post(self.room_url(room, "messages"))
            .json(&PostBody { message: body, client_ref });

        let response = check(self.authorize(request).send().await?).await?;
        response.json::<MessageRecord>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn mark_read(&self, room: RoomKey) -> Result<(), ApiError> {
        let request = self.client.post(self.room_url(room, "read"));
        check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status { status: status.as_u16(), body: err.to_string() },
            None if err.is_decode() => Self::Decode(err.to_string()),
            None => Self::Http(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_urls_include_workspace() {
        let api = HttpApi::new("https://chat.example/api/");
        let room = RoomKey::new(3, 42);

        assert_eq!(api.room_url(room, "messages"), "https://chat.example/api/workspaces/3/rooms/42/messages");
        assert_eq!(api.room_url(room, "read"), "https://chat.example/api/workspaces/3/rooms/42/read");
    }

    #[test]
    fn post_body_shape() {
        let body = serde_json::to_string(&PostBody { message: "hi", client_ref: 7 }).unwrap();
        assert_eq!(body, r#"{"message":"hi","client_ref":7}"#);
    }
}
