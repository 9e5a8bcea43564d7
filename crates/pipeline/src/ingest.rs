use std::collections::HashSet;

use async_stream::stream;
use clients::SentryClient;
use models::{EventPage, PaginationCursor, Provider};
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Provider field naming the organization to read events from.
pub const ORG_SLUG_FIELD: &str = "orgSlug";
/// Provider field naming the project to read events from.
pub const PROJECT_SLUG_FIELD: &str = "projSlug";

/// Default cap on the number of pages fetched in one pass.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Fetches pages of monitoring events for a log provider.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    client: SentryClient,
    max_pages: usize,
}

impl EventIngestor {
    /// Create an ingestor reading through `client`.
    pub const fn new(client: SentryClient) -> Self {
        Self { client, max_pages: DEFAULT_MAX_PAGES }
    }

    /// Cap the number of pages fetched in one pass.
    pub const fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Lazily fetch pages for `provider`, starting at `start_offset`.
    ///
    /// The stream ends after the page whose `next` link is missing or reports no results,
    /// when the next cursor was already fetched in this pass, or once the page cap is
    /// reached. A fetch
    /// error is yielded once and ends the stream. A provider lacking `orgSlug` or `projSlug`
    /// yields nothing.
    pub fn pages(
        &self,
        provider: &Provider,
        start_offset: u64,
    ) -> impl Stream<Item = clients::Result<EventPage>> + Send + use<> {
        let slugs =
            provider.field_str(ORG_SLUG_FIELD).zip(provider.field_str(PROJECT_SLUG_FIELD));
        if slugs.is_none() {
            warn!(
                provider = %provider.name,
                "provider is missing {ORG_SLUG_FIELD} or {PROJECT_SLUG_FIELD}, nothing to ingest"
            );
        }
        let client = self.client.clone();
        let max_pages = self.max_pages;

        stream! {
            if let Some((org_slug, project_slug)) = slugs {
                let mut cursor = PaginationCursor::at(start_offset);
                let mut visited = HashSet::from([position(&cursor)]);
                let mut fetched = 0;
                loop {
                    if fetched >= max_pages {
                        warn!(max_pages, "page limit reached, stopping ingestion");
                        break;
                    }

                    let page = match client.fetch_events(&org_slug, &project_slug, cursor).await {
                        Ok(page) => page,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    };
                    fetched += 1;
                    debug!(offset = cursor.offset, events = page.events.len(), "fetched event page");

                    let next = page.next_cursor();
                    yield Ok(page);

                    match next {
                        None => break,
                        Some(next) if !visited.insert(position(&next)) => {
                            warn!(
                                cursor = %next.to_query(),
                                "next cursor was already fetched, stopping ingestion"
                            );
                            break;
                        }
                        Some(next) => cursor = next,
                    }
                }
            }
        }
    }
}

/// The parts of a cursor that select a page.
const fn position(cursor: &PaginationCursor) -> (u64, u64, bool) {
    (cursor.identifier, cursor.offset, cursor.is_previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn provider(fields: serde_json::Value) -> Provider {
        serde_json::from_value(json!({"name": "Sentry", "type": "log", "fields": fields})).unwrap()
    }

    fn sentry_provider() -> Provider {
        provider(json!([
            {"key": "enabled", "value": true},
            {"key": "orgSlug", "value": "acme"},
            {"key": "projSlug", "value": "web"}
        ]))
    }

    fn ingestor(server: &ServerGuard) -> EventIngestor {
        EventIngestor::new(SentryClient::new(server.url().parse().unwrap(), "sntryu_t".into()))
    }

    fn link(offset: u64, results: bool) -> String {
        link_to(&format!("0:{offset}:0"), results)
    }

    fn link_to(next: &str, results: bool) -> String {
        format!(
            "<https://sentry.io/?cursor=0:0:1>; rel=\"previous\"; results=\"false\"; cursor=\"0:0:1\", \
             <https://sentry.io/?cursor={next}>; rel=\"next\"; results=\"{results}\"; cursor=\"{next}\""
        )
    }

    async fn page_mock(server: &mut ServerGuard, cursor: &str, link_header: Option<String>) -> mockito::Mock {
        let mut mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_query(Matcher::UrlEncoded("cursor".into(), cursor.into()))
            .with_status(200)
            .with_body(json!([{"id": cursor, "title": "t"}]).to_string());
        if let Some(link_header) = link_header {
            mock = mock.with_header("link", &link_header);
        }
        mock.expect(1).create_async().await
    }

    #[tokio::test]
    async fn follows_next_links_until_results_run_out() {
        let mut server = Server::new_async().await;
        let first = page_mock(&mut server, "0:0:0", Some(link(100, true))).await;
        let second = page_mock(&mut server, "0:100:0", Some(link(200, true))).await;
        let third = page_mock(&mut server, "0:200:0", Some(link(300, false))).await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 0).collect().await;

        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(Result::is_ok));
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }

    #[tokio::test]
    async fn missing_next_link_stops_after_one_page() {
        let mut server = Server::new_async().await;
        let only = page_mock(&mut server, "0:50:0", None).await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 50).collect().await;

        assert_eq!(pages.len(), 1);
        only.assert_async().await;
    }

    #[tokio::test]
    async fn repeated_cursor_stops() {
        let mut server = Server::new_async().await;
        let only = page_mock(&mut server, "0:100:0", Some(link(100, true))).await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 100).collect().await;

        assert_eq!(pages.len(), 1);
        only.assert_async().await;
    }

    #[tokio::test]
    async fn cursor_cycle_stops() {
        let mut server = Server::new_async().await;
        let first = page_mock(&mut server, "0:0:0", Some(link_to("7:0:0", true))).await;
        let second = page_mock(&mut server, "7:0:0", Some(link_to("0:0:0", true))).await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 0).collect().await;

        assert_eq!(pages.len(), 2);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn new_identifier_at_same_offset_is_followed() {
        let mut server = Server::new_async().await;
        let first = page_mock(&mut server, "0:0:0", Some(link_to("1420837533:0:0", true))).await;
        let second =
            page_mock(&mut server, "1420837533:0:0", Some(link_to("1420837533:100:0", false)))
                .await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 0).collect().await;

        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(Result::is_ok));
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn page_cap_bounds_ingestion() {
        let mut server = Server::new_async().await;
        let _first = page_mock(&mut server, "0:0:0", Some(link(100, true))).await;
        let _second = page_mock(&mut server, "0:100:0", Some(link(200, true))).await;

        let pages: Vec<_> =
            ingestor(&server).with_max_pages(2).pages(&sentry_provider(), 0).collect().await;

        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn fetch_error_is_yielded_once() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/acme/web/events/")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let pages: Vec<_> = ingestor(&server).pages(&sentry_provider(), 0).collect().await;

        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_err());
    }

    #[tokio::test]
    async fn missing_slugs_yield_nothing() {
        let server = Server::new_async().await;
        let provider = provider(json!([{"key": "enabled", "value": true}, {"key": "orgSlug", "value": "acme"}]));

        let pages: Vec<_> = ingestor(&server).pages(&provider, 0).collect().await;

        assert!(pages.is_empty());
    }
}
