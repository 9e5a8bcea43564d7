use clients::SlackClient;
use models::{Host, Team};
use tracing::{error, info, warn};
use url::Url;

/// Result of notifying about one incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Nobody to invite, so no channel was created.
    NoRecipients,
    /// The channel could not be created; nothing else was attempted.
    ChannelFailed,
    /// The channel exists; each later step reports whether it succeeded.
    Sent {
        /// Chat channel id
        channel_id: String,
        /// Bot joined the channel
        joined: bool,
        /// Recipients were invited
        invited: bool,
        /// Incident link was posted
        posted: bool,
    },
}

/// Opens a chat channel per incident and points the responsible people at it.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    slack: SlackClient,
    frontend_url: Url,
}

impl NotificationDispatcher {
    /// Create a dispatcher posting links under `frontend_url`.
    pub const fn new(slack: SlackClient, frontend_url: Url) -> Self {
        Self { slack, frontend_url }
    }

    /// Name of the channel dedicated to an incident.
    pub fn channel_name(incident_uuid: &str) -> String {
        format!("incident-{incident_uuid}")
    }

    /// Frontend link to an incident.
    pub fn incident_url(&self, incident_uuid: &str) -> String {
        format!("{}/incidents/{incident_uuid}", self.frontend_url.as_str().trim_end_matches('/'))
    }

    /// Chat identities of every member of the hosts' teams and of `teams`, once each.
    /// Members without a chat identity are skipped.
    pub fn recipients<'a>(hosts: &'a [Host], teams: impl IntoIterator<Item = &'a Team>) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let members = hosts.iter().map(|h| &h.team).chain(teams).flat_map(|t| &t.users);
        for id in members.filter_map(|m| m.chat_identity()) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_owned());
            }
        }
        ids
    }

    /// Create the incident channel, join it, invite `recipients` and post the incident link.
    ///
    /// Only channel creation gates the rest; join, invite and post failures are logged and
    /// the remaining steps are still attempted.
    pub async fn dispatch(&self, incident_uuid: &str, recipients: &[String]) -> Delivery {
        if recipients.is_empty() {
            warn!(incident_id = incident_uuid, "no chat identities to invite, skipping notification");
            return Delivery::NoRecipients;
        }

        let channel_id = match self.slack.create_channel(&Self::channel_name(incident_uuid)).await {
            Ok(id) => id,
            Err(e) => {
                error!(incident_id = incident_uuid, error = %e, "failed to create incident channel");
                return Delivery::ChannelFailed;
            }
        };

        let joined = match self.slack.join_channel(&channel_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(incident_id = incident_uuid, channel_id = %channel_id, error = %e, "failed to join channel");
                false
            }
        };

        let invited = match self.slack.invite(&channel_id, recipients).await {
            Ok(()) => true,
            Err(e) => {
                error!(incident_id = incident_uuid, channel_id = %channel_id, error = %e, "failed to invite members");
                false
            }
        };

        let text = format!("New incident: {}", self.incident_url(incident_uuid));
        let posted = match self.slack.post_message(&channel_id, &text).await {
            Ok(()) => true,
            Err(e) => {
                error!(incident_id = incident_uuid, channel_id = %channel_id, error = %e, "failed to post incident link");
                false
            }
        };

        info!(incident_id = incident_uuid, channel_id = %channel_id, joined, invited, posted, "notified incident");
        Delivery::Sent { channel_id, joined, invited, posted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server, ServerGuard};
    use models::Member;
    use serde_json::json;

    fn member(chat_id: Option<&str>) -> Member {
        Member { uuid: None, chat_id: chat_id.map(str::to_owned) }
    }

    fn team(uuid: &str, users: Vec<Member>) -> Team {
        Team { uuid: uuid.to_owned(), name: uuid.to_owned(), users }
    }

    fn dispatcher(server: &ServerGuard) -> NotificationDispatcher {
        NotificationDispatcher::new(
            SlackClient::new(server.url().parse().unwrap(), "xoxb".into()),
            "https://aims.example.com/".parse().unwrap(),
        )
    }

    async fn ok(server: &mut ServerGuard, method: &str, body: &str) -> mockito::Mock {
        server
            .mock("POST", format!("/{method}").as_str())
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    #[test]
    fn recipients_are_unique_and_skip_missing_identities() {
        let owner = team("t1", vec![member(Some("U1")), member(None), member(Some(" "))]);
        let hosts = [Host { uuid: "h1".into(), hostname: "web-1".into(), team: owner.clone() }];
        let other = team("t2", vec![member(Some("U2")), member(Some("U1"))]);

        assert_eq!(NotificationDispatcher::recipients(&hosts, [&owner, &other]), vec!["U1", "U2"]);
    }

    #[test]
    fn incident_url_has_no_double_slash() {
        let server_url: Url = "http://localhost:1".parse().unwrap();
        let d = NotificationDispatcher::new(SlackClient::new(server_url, "x".into()), "http://localhost:3000".parse().unwrap());
        assert_eq!(d.incident_url("abc"), "http://localhost:3000/incidents/abc");
        assert_eq!(NotificationDispatcher::channel_name("abc"), "incident-abc");
    }

    #[tokio::test]
    async fn full_sequence_posts_incident_link() {
        let mut server = Server::new_async().await;
        let create = ok(&mut server, "conversations.create", r#"{"ok":true,"channel":{"id":"C1"}}"#).await;
        let join = ok(&mut server, "conversations.join", r#"{"ok":true}"#).await;
        let invite = ok(&mut server, "conversations.invite", r#"{"ok":true}"#).await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::Json(json!({
                "channel": "C1",
                "text": "New incident: https://aims.example.com/incidents/i1"
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let delivery = dispatcher(&server).dispatch("i1", &["U1".to_owned()]).await;

        assert_eq!(delivery, Delivery::Sent {
            channel_id: "C1".into(),
            joined: true,
            invited: true,
            posted: true
        });
        create.assert_async().await;
        join.assert_async().await;
        invite.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn failed_invite_still_posts() {
        let mut server = Server::new_async().await;
        let _create = ok(&mut server, "conversations.create", r#"{"ok":true,"channel":{"id":"C1"}}"#).await;
        let _join = ok(&mut server, "conversations.join", r#"{"ok":true}"#).await;
        let _invite = ok(&mut server, "conversations.invite", r#"{"ok":false,"error":"cant_invite"}"#).await;
        let post = ok(&mut server, "chat.postMessage", r#"{"ok":true}"#).await;

        let delivery = dispatcher(&server).dispatch("i1", &["U1".to_owned()]).await;

        assert_eq!(delivery, Delivery::Sent {
            channel_id: "C1".into(),
            joined: true,
            invited: false,
            posted: true
        });
        post.assert_async().await;
    }

    #[tokio::test]
    async fn failed_channel_creation_stops_the_sequence() {
        let mut server = Server::new_async().await;
        let _create = ok(&mut server, "conversations.create", r#"{"ok":false,"error":"name_taken"}"#).await;
        let post = server.mock("POST", "/chat.postMessage").expect(0).create_async().await;

        let delivery = dispatcher(&server).dispatch("i1", &["U1".to_owned()]).await;

        assert_eq!(delivery, Delivery::ChannelFailed);
        post.assert_async().await;
    }

    #[tokio::test]
    async fn no_recipients_creates_no_channel() {
        let mut server = Server::new_async().await;
        let create = server.mock("POST", "/conversations.create").expect(0).create_async().await;

        assert_eq!(dispatcher(&server).dispatch("i1", &[]).await, Delivery::NoRecipients);
        create.assert_async().await;
    }
}
