//! reqwest implementation of [`ChatGateway`] against the chat REST API.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ChatEnvelope, ChatId, ChatsEnvelope, CreateChatRequest, CreateChatResponse, Message,
    MessageId, MessagePage, MessagesEnvelope, OutgoingMessage, PinChatRequest,
    SendMessageResponse, UserId,
};
use crate::services::gateway::ChatGateway;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpChatGateway {
    client: Client,
    /// e.g. "http://localhost:3000/api"
    api_root: String,
    /// Replaced at run time by whoever owns authentication
    token: RwLock<String>,
}

impl HttpChatGateway {
    pub fn new(
        api_root: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_root: api_root.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token.into()),
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.api_root.clone(),
            config.bearer_token.clone(),
            config.request_timeout(),
        )
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().clone();
        request.bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        let response = self.authorized(request).send().await.map_err(|e| {
            warn!(error = %e, "chat api request failed");
            AppError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "chat api returned error");
        Err(error_from_response(status, &body))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| AppError::Transport {
            status: None,
            message: format!("invalid response body: {e}"),
        })
    }

    async fn execute(&self, request: RequestBuilder) -> AppResult<()> {
        self.send(request).await.map(|_| ())
    }
}

fn error_from_response(status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound;
    }
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    AppError::Transport {
        status: Some(status.as_u16()),
        message,
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn create_chat(
        &self,
        target_user_id: UserId,
        is_ephemeral: bool,
    ) -> AppResult<CreateChatResponse> {
        let body = CreateChatRequest {
            target_user_id,
            is_ephemeral,
        };
        self.fetch(self.client.post(self.url("/chats")).json(&body))
            .await
    }

    async fn list_chats(&self) -> AppResult<Vec<Chat>> {
        let envelope: ChatsEnvelope = self.fetch(self.client.get(self.url("/chats"))).await?;
        Ok(envelope.chats)
    }

    async fn get_chat(&self, chat_id: ChatId) -> AppResult<Chat> {
        let envelope: ChatEnvelope = self
            .fetch(self.client.get(self.url(&format!("/chats/{chat_id}"))))
            .await?;
        Ok(envelope.chat)
    }

    async fn list_messages(&self, chat_id: ChatId, page: MessagePage) -> AppResult<Vec<Message>> {
        let request = self
            .client
            .get(self.url(&format!("/chats/{chat_id}/messages")))
            .query(&[("limit", page.limit), ("offset", page.offset)]);
        let envelope: MessagesEnvelope = self.fetch(request).await?;
        Ok(envelope.messages)
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> AppResult<SendMessageResponse> {
        self.fetch(
            self.client
                .post(self.url(&format!("/chats/{chat_id}/messages")))
                .json(message),
        )
        .await
    }

    async fn mark_read(&self, message_id: MessageId) -> AppResult<()> {
        self.execute(
            self.client
                .post(self.url(&format!("/messages/{message_id}/read"))),
        )
        .await
    }

    async fn burn_message(&self, message_id: MessageId) -> AppResult<()> {
        self.execute(
            self.client
                .delete(self.url(&format!("/messages/{message_id}/burn"))),
        )
        .await
    }

    async fn delete_message(&self, message_id: MessageId) -> AppResult<()> {
        self.execute(self.client.delete(self.url(&format!("/messages/{message_id}"))))
            .await
    }

    async fn pin_chat(&self, chat_id: ChatId, pinned: bool) -> AppResult<()> {
        let body = PinChatRequest { is_pinned: pinned };
        self.execute(
            self.client
                .post(self.url(&format!("/chats/{chat_id}/pin")))
                .json(&body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_surfaced() {
        let err = error_from_response(
            StatusCode::FORBIDDEN,
            r#"{"success":false,"message":"not a member"}"#,
        );
        assert_eq!(
            err,
            AppError::Transport {
                status: Some(403),
                message: "not a member".into()
            }
        );
    }

    #[test]
    fn non_json_body_falls_back_to_reason() {
        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(
            err,
            AppError::Transport {
                status: Some(502),
                message: "Bad Gateway".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_maps_to_variant() {
        assert_eq!(
            error_from_response(StatusCode::NOT_FOUND, "{}"),
            AppError::NotFound
        );
    }

    #[test]
    fn api_root_trailing_slash_is_ignored() {
        let gateway =
            HttpChatGateway::new("http://localhost:3000/api/", "t", Duration::from_secs(1))
                .unwrap();
        assert_eq!(gateway.url("/chats"), "http://localhost:3000/api/chats");
    }
}
