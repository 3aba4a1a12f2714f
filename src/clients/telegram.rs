//! Telegram Bot API client: channel membership checks and user messages.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{status_error, MembershipOracle, Notifier, OracleError};
use crate::config::TelegramConfig;

/// Chat member statuses that count as membership.
const MEMBER_STATUSES: [&str; 3] = ["member", "administrator", "creator"];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

pub fn is_member_status(status: &str) -> bool {
    MEMBER_STATUSES.contains(&status)
}

/// reqwest-backed [`MembershipOracle`] and [`Notifier`].
pub struct TelegramClient {
    client: Client,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }
}

#[async_trait]
impl MembershipOracle for TelegramClient {
    async fn is_member(&self, channel_id: &str, external_user_id: i64) -> Result<bool, OracleError> {
        if !self.config.is_enabled() {
            return Err(OracleError::NotConfigured("telegram.bot_token"));
        }

        let user_id = external_user_id.to_string();
        let response = self
            .client
            .get(self.method_url("getChatMember"))
            .query(&[("chat_id", channel_id), ("user_id", user_id.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        // 400 "user not found" comes back with ok=false; that is a plain "no".
        let body: ApiResponse<ChatMember> = response.json().await?;
        if !body.ok {
            debug!(
                channel_id,
                external_user_id,
                description = body.description.as_deref().unwrap_or(""),
                "getChatMember returned ok=false"
            );
            return Ok(false);
        }

        Ok(body
            .result
            .is_some_and(|member| is_member_status(&member.status)))
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, external_user_id: i64, text: &str) -> Result<(), OracleError> {
        if !self.config.is_enabled() {
            debug!(external_user_id, "Telegram disabled, dropping notification");
            return Ok(());
        }

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": external_user_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_statuses() {
        assert!(is_member_status("member"));
        assert!(is_member_status("administrator"));
        assert!(is_member_status("creator"));
        assert!(!is_member_status("left"));
        assert!(!is_member_status("kicked"));
        assert!(!is_member_status("restricted"));
    }

    #[test]
    fn test_method_url_strips_trailing_slash() {
        let client = TelegramClient::new(TelegramConfig {
            api_base: "https://api.telegram.org/".to_string(),
            bot_token: "123:abc".to_string(),
            ..TelegramConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_disabled_client() {
        let client = TelegramClient::new(TelegramConfig::default()).unwrap();
        assert!(matches!(
            client.is_member("@koth", 1).await,
            Err(OracleError::NotConfigured(_))
        ));
        assert!(client.notify(1, "hi").await.is_ok());
    }
}
