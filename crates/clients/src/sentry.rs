use std::fmt;

use models::{
    ContextLine, EventPage, MonitoringEvent, PaginationCursor, StackFrame, Tag, parse_link_header,
};
use reqwest::{Client as HttpClient, StatusCode, header::LINK};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{Error, Result, Service, external_api_error},
    retry::retry_op,
};

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    culprit: Option<String>,
    #[serde(default)]
    tags: Vec<RawTag>,
    #[serde(default)]
    errors: Vec<RawError>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawTag {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    data: Option<RawErrorData>,
}

#[derive(Deserialize)]
struct RawErrorData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RawException {
    #[serde(default)]
    values: Vec<RawExceptionValue>,
}

#[derive(Deserialize)]
struct RawExceptionValue {
    #[serde(default)]
    stacktrace: Option<RawStacktrace>,
}

#[derive(Deserialize)]
struct RawStacktrace {
    #[serde(default)]
    frames: Vec<RawFrame>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    abs_path: Option<String>,
    #[serde(default)]
    context: Vec<(u32, Option<String>)>,
}

impl From<RawFrame> for StackFrame {
    fn from(raw: RawFrame) -> Self {
        Self {
            filename: raw.filename,
            abs_path: raw.abs_path,
            context: raw
                .context
                .into_iter()
                .map(|(line_no, text)| ContextLine { line_no, text: text.unwrap_or_default() })
                .collect(),
        }
    }
}

impl From<RawEvent> for MonitoringEvent {
    fn from(raw: RawEvent) -> Self {
        let origin_file =
            raw.errors.into_iter().next().and_then(|e| e.data).and_then(|d| d.url);

        let mut frames = Vec::new();
        for entry in raw.entries.into_iter().filter(|e| e.kind == "exception") {
            match serde_json::from_value::<RawException>(entry.data) {
                Ok(exception) => frames.extend(
                    exception
                        .values
                        .into_iter()
                        .filter_map(|v| v.stacktrace)
                        .flat_map(|st| st.frames)
                        .map(StackFrame::from),
                ),
                Err(e) => warn!(event_id = %raw.id, error = %e, "skipping malformed exception entry"),
            }
        }

        Self {
            id: raw.id,
            title: raw.title,
            culprit: raw.culprit.unwrap_or_default(),
            tags: raw.tags.into_iter().map(|t| Tag::new(t.key, t.value)).collect(),
            frames,
            origin_file,
        }
    }
}

/// Client for the Sentry events API.
#[derive(Clone)]
pub struct SentryClient {
    http: HttpClient,
    base_url: Url,
    token: String,
}

impl fmt::Debug for SentryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentryClient").field("base_url", &self.base_url.as_str()).finish_non_exhaustive()
    }
}

impl SentryClient {
    /// Create a client for the given API root.
    pub fn new(base_url: Url, token: String) -> Self {
        Self { http: HttpClient::new(), base_url, token }
    }

    fn events_url(&self, org_slug: &str, project_slug: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/projects/{org_slug}/{project_slug}/events/",
            self.base_url.as_str().trim_end_matches('/')
        ))?)
    }

    /// Fetch one page of events, retrying transient failures.
    pub async fn fetch_events(
        &self,
        org_slug: &str,
        project_slug: &str,
        cursor: PaginationCursor,
    ) -> Result<EventPage> {
        retry_op(|| self.fetch_events_once(org_slug, project_slug, cursor)).await
    }

    async fn fetch_events_once(
        &self,
        org_slug: &str,
        project_slug: &str,
        cursor: PaginationCursor,
    ) -> Result<EventPage> {
        debug!(org_slug, project_slug, offset = cursor.offset, "fetching sentry events");
        let url = self.events_url(org_slug, project_slug)?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("full", "true".to_owned()), ("cursor", cursor.to_query())])
            .send()
            .await?;

        let status = resp.status();
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                return Err(Error::ExternalApi {
                    service: Service::Sentry,
                    status,
                    message: "invalid bearer token".to_owned(),
                });
            }
            StatusCode::FORBIDDEN => {
                return Err(Error::ExternalApi {
                    service: Service::Sentry,
                    status,
                    message: "insufficient bearer token scopes".to_owned(),
                });
            }
            _ => return Err(external_api_error(Service::Sentry, resp).await),
        }

        let links = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let events = resp.json::<Vec<RawEvent>>().await?;

        Ok(EventPage { events: events.into_iter().map(MonitoringEvent::from).collect(), links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> SentryClient {
        SentryClient::new(server.url().parse().unwrap(), "sntryu_test".into())
    }

    fn raw_event() -> Value {
        json!({
            "id": "1",
            "title": "TypeError: x is undefined",
            "culprit": "GET /test",
            "tags": [{"key": "handled", "value": "no"}, {"key": "server_name", "value": "web-1"}],
            "errors": [{"data": {"url": "app.js"}}],
            "entries": [
                {"type": "breadcrumbs", "data": {"values": [{"message": "hi"}]}},
                {"type": "exception", "data": {"values": [{
                    "type": "TypeError",
                    "stacktrace": {"frames": [
                        {"filename": "app.js", "absPath": "/srv/app.js", "context": [[1, "let a;"], [2, null]]}
                    ]}
                }]}}
            ]
        })
    }

    #[test]
    fn converts_raw_event() {
        let raw: RawEvent = serde_json::from_value(raw_event()).unwrap();
        let event = MonitoringEvent::from(raw);
        assert_eq!(event.origin_file.as_deref(), Some("app.js"));
        assert_eq!(event.culprit, "GET /test");
        assert!(event.is_unhandled());
        assert_eq!(event.frames.len(), 1);
        assert_eq!(event.frames[0].abs_path.as_deref(), Some("/srv/app.js"));
        assert_eq!(event.frames[0].context[1], ContextLine { line_no: 2, text: String::new() });
    }

    #[tokio::test]
    async fn fetches_page_with_links() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_header("authorization", "Bearer sntryu_test")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("full".into(), "true".into()),
                Matcher::UrlEncoded("cursor".into(), "0:100:0".into()),
            ]))
            .with_status(200)
            .with_header(
                "link",
                "<http://x/?cursor=0:200:0>; rel=\"next\"; results=\"false\"; cursor=\"0:200:0\"",
            )
            .with_body(json!([raw_event()]).to_string())
            .create_async()
            .await;

        let page =
            client(&server).fetch_events("acme", "web", PaginationCursor::at(100)).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.next_cursor(), None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_link_header_yields_no_links() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let page =
            client(&server).fetch_events("acme", "web", PaginationCursor::at(0)).await.unwrap();
        assert!(page.links.is_empty());
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn rejected_token_is_reported_without_retrying() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let err =
            client(&server).fetch_events("acme", "web", PaginationCursor::at(0)).await.unwrap_err();
        assert!(err.to_string().contains("invalid bearer token"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_query(Matcher::Any)
            .with_status(502)
            .expect_at_least(2)
            .create_async()
            .await;

        let err =
            client(&server).fetch_events("acme", "web", PaginationCursor::at(0)).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        mock.assert_async().await;
    }
}
