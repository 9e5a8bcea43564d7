use std::fmt;

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result, Service, external_api_error};

#[derive(Deserialize)]
struct Channel {
    id: String,
}

#[derive(Deserialize)]
struct CreatedChannel {
    channel: Channel,
}

/// Client for the Slack Web API.
#[derive(Clone)]
pub struct SlackClient {
    http: HttpClient,
    base_url: Url,
    token: String,
}

impl fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackClient").field("base_url", &self.base_url.as_str()).finish_non_exhaustive()
    }
}

impl SlackClient {
    /// Create a client for the given API root.
    pub fn new(base_url: Url, token: String) -> Self {
        Self { http: HttpClient::new(), base_url, token }
    }

    /// Call a Web API method. Succeeds only on a 200 response whose body has `ok: true`.
    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method, "calling slack");
        let url =
            Url::parse(&format!("{}/{method}", self.base_url.as_str().trim_end_matches('/')))?;
        let resp = self.http.post(url).bearer_auth(&self.token).json(body).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(external_api_error(Service::Slack, resp).await);
        }

        let value = resp.json::<Value>().await?;
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            let message =
                value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_owned();
            return Err(Error::ExternalApi { service: Service::Slack, status, message });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Create a private channel and return its id.
    pub async fn create_channel(&self, name: &str) -> Result<String> {
        let created: CreatedChannel =
            self.call("conversations.create", &json!({"name": name, "is_private": true})).await?;
        Ok(created.channel.id)
    }

    /// Join a channel.
    pub async fn join_channel(&self, channel_id: &str) -> Result<()> {
        self.call::<_, Value>("conversations.join", &json!({"channel": channel_id})).await?;
        Ok(())
    }

    /// Invite users to a channel.
    pub async fn invite(&self, channel_id: &str, user_ids: &[String]) -> Result<()> {
        let body = json!({"channel": channel_id, "users": user_ids.join(","), "force": true});
        self.call::<_, Value>("conversations.invite", &body).await?;
        Ok(())
    }

    /// Post a message to a channel.
    pub async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        self.call::<_, Value>("chat.postMessage", &json!({"channel": channel_id, "text": text}))
            .await?;
        Ok(())
    }
}
