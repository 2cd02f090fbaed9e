// src/sink/discord.rs
use async_trait::async_trait;
use log::info;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::config::Config;
use super::{ChannelApi, ChannelError, ChannelInfo, GUILD_VOICE};

// Permission bits
const ADMINISTRATOR: u64 = 1 << 3;
const MANAGE_CHANNELS: u64 = 1 << 4;
const VIEW_CHANNEL: u64 = 1 << 10;
const CONNECT: u64 = 1 << 20;

const OVERWRITE_ROLE: u8 = 0;
const OVERWRITE_MEMBER: u8 = 1;

#[derive(Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: u8,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct Role {
    id: String,
    #[serde(default)]
    permissions: String,
}

impl Role {
    fn is_admin(&self) -> bool {
        self.permissions
            .parse::<u64>()
            .map_or(false, |bits| bits & ADMINISTRATOR != 0)
    }
}

#[derive(Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: f64,
}

/// Discord REST client authenticated as a bot.
pub struct DiscordClient {
    http: Client,
    base_url: String,
    bot_user_id: OnceCell<String>,
}

impl DiscordClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        // An unusable token only fails at connect(), not here.
        if let Ok(value) = HeaderValue::from_str(&format!("Bot {}", config.discord_token)) {
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.fetch_timeout())
            .user_agent(concat!("DiscordBot (bmsync, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;

        Ok(Self {
            http,
            base_url: config.discord_api_url.trim_end_matches('/').to_string(),
            bot_user_id: OnceCell::new(),
        })
    }

    async fn current_user(&self) -> Result<User, ChannelError> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.base_url))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Validates the bot session and remembers the bot's user id.
    pub async fn connect(&self) -> Result<String, ChannelError> {
        let user = self.current_user().await?;
        info!("Authenticated with Discord as {} ({})", user.username, user.id);

        let id = self.bot_user_id.get_or_init(move || async move { user.id }).await;
        Ok(id.clone())
    }

    async fn bot_id(&self) -> Result<&str, ChannelError> {
        let id = self
            .bot_user_id
            .get_or_try_init(|| async { Ok::<_, ChannelError>(self.current_user().await?.id) })
            .await?;
        Ok(id.as_str())
    }

    /// Roles holding ADMINISTRATOR, other than @everyone.
    async fn admin_role_ids(&self, guild_id: &str) -> Result<Vec<String>, ChannelError> {
        let response = self
            .http
            .get(format!("{}/guilds/{}/roles", self.base_url, guild_id))
            .send()
            .await?;
        let roles: Vec<Role> = check(response).await?.json().await?;
        Ok(roles
            .into_iter()
            .filter(|role| role.id != guild_id && role.is_admin())
            .map(|role| role.id)
            .collect())
    }
}

async fn check(response: Response) -> Result<Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .json::<RateLimitBody>()
                .await
                .map(|b| b.retry_after)
                .unwrap_or_default();
            Err(ChannelError::RateLimited { retry_after })
        }
        StatusCode::FORBIDDEN => Err(ChannelError::Forbidden(response.text().await.unwrap_or_default())),
        _ => Err(ChannelError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl ChannelApi for DiscordClient {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ChannelError> {
        let response = self
            .http
            .get(format!("{}/channels/{}", self.base_url, channel_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let channel: Channel = check(response).await?.json().await?;
        Ok(Some(ChannelInfo {
            name: channel.name.unwrap_or_default(),
            kind: channel.kind,
            guild_id: channel.guild_id,
        }))
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError> {
        let response = self
            .http
            .patch(format!("{}/channels/{}", self.base_url, channel_id))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn create_channel(
        &self,
        guild_id: &str,
        category_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<String, ChannelError> {
        let bot_id = self.bot_id().await?;

        // @everyone shares the guild's id.
        let mut overwrites = vec![
            json!({
                "id": guild_id,
                "type": OVERWRITE_ROLE,
                "allow": VIEW_CHANNEL.to_string(),
                "deny": CONNECT.to_string(),
            }),
            json!({
                "id": bot_id,
                "type": OVERWRITE_MEMBER,
                "allow": (CONNECT | MANAGE_CHANNELS | VIEW_CHANNEL).to_string(),
                "deny": "0",
            }),
        ];
        for role_id in self.admin_role_ids(guild_id).await? {
            overwrites.push(json!({
                "id": role_id,
                "type": OVERWRITE_ROLE,
                "allow": VIEW_CHANNEL.to_string(),
                "deny": CONNECT.to_string(),
            }));
        }

        let response = self
            .http
            .post(format!("{}/guilds/{}/channels", self.base_url, guild_id))
            .header("X-Audit-Log-Reason", reason)
            .json(&json!({
                "name": name,
                "type": GUILD_VOICE,
                "parent_id": category_id,
                "permission_overwrites": overwrites,
            }))
            .send()
            .await?;

        let channel: Channel = check(response).await?.json().await?;
        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), ChannelError> {
        let response = self
            .http
            .delete(format!("{}/channels/{}", self.base_url, channel_id))
            .header("X-Audit-Log-Reason", reason)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
