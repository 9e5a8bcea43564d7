use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::MonitoringEvent;

/// Link relation pointing at the following page.
pub const NEXT_REL: &str = "next";

/// Position of a page within a provider's paginated listing.
///
/// Derived on every call from the provider's page-link metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Cursor identifier, usually `0`
    pub identifier: u64,
    /// Offset of the page
    pub offset: u64,
    /// Whether the cursor walks backwards
    pub is_previous: bool,
    /// Whether the linked page holds any results
    pub has_results: bool,
}

impl PaginationCursor {
    /// Cursor for the page starting at `offset`.
    pub const fn at(offset: u64) -> Self {
        Self { identifier: 0, offset, is_previous: false, has_results: true }
    }

    /// Wire form of the cursor, `identifier:offset:previous`.
    pub fn to_query(&self) -> String {
        format!("{}:{}:{}", self.identifier, self.offset, u8::from(self.is_previous))
    }
}

/// Errors raised while parsing page-link metadata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkParseError {
    /// A required attribute was absent from a directive group.
    #[error("missing attribute `{0}`")]
    MissingAttribute(&'static str),
    /// The `results` attribute was neither `true` nor `false`.
    #[error("invalid results flag `{0}`")]
    InvalidResults(String),
    /// The `cursor` attribute was not an `identifier:offset:previous` triplet.
    #[error("invalid cursor `{0}`")]
    InvalidCursor(String),
}

/// Identifier, offset and previous flag of a cursor attribute.
///
/// `has_results` is not part of the triplet and defaults to `true`.
impl FromStr for PaginationCursor {
    type Err = LinkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LinkParseError::InvalidCursor(s.to_owned());
        let mut parts = s.split(':');
        let (Some(identifier), Some(offset), Some(previous), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let is_previous = match previous.trim() {
            "0" => false,
            "1" => true,
            _ => return Err(invalid()),
        };
        Ok(Self {
            identifier: identifier.trim().parse().map_err(|_| invalid())?,
            offset: offset.trim().parse().map_err(|_| invalid())?,
            is_previous,
            has_results: true,
        })
    }
}

/// One directive group of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRelation {
    /// Target URL
    pub url: String,
    /// Relation name, e.g. `next` or `previous`
    pub rel: String,
    /// Cursor of the target page, carrying its `results` flag
    pub cursor: PaginationCursor,
}

impl FromStr for LinkRelation {
    type Err = LinkParseError;

    fn from_str(group: &str) -> Result<Self, Self::Err> {
        let mut url = None;
        let mut rel = None;
        let mut results = None;
        let mut cursor = None;

        for part in group.split(';').map(str::trim) {
            if let Some(inner) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
                url = Some(inner.to_owned());
                continue;
            }
            let Some((key, value)) = part.split_once('=') else { continue };
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "rel" => rel = Some(value.to_owned()),
                "results" => results = Some(value.to_owned()),
                "cursor" => cursor = Some(value.to_owned()),
                _ => {}
            }
        }

        let url = url.ok_or(LinkParseError::MissingAttribute("url"))?;
        let rel = rel.ok_or(LinkParseError::MissingAttribute("rel"))?;
        let results = results.ok_or(LinkParseError::MissingAttribute("results"))?;
        let cursor = cursor.ok_or(LinkParseError::MissingAttribute("cursor"))?;

        let has_results = match results.to_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => return Err(LinkParseError::InvalidResults(results)),
        };
        let cursor = PaginationCursor { has_results, ..cursor.parse()? };

        Ok(Self { url, rel, cursor })
    }
}

/// Parse a `Link` header into its directive groups.
///
/// Groups that are malformed or miss a required attribute are dropped with a warning.
pub fn parse_link_header(header: &str) -> Vec<LinkRelation> {
    header
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .filter_map(|group| match group.parse::<LinkRelation>() {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(error = %e, group, "dropping unparsable link header group");
                None
            }
        })
        .collect()
}

/// One page of monitoring events together with its pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    /// Events on the page, in provider order
    pub events: Vec<MonitoringEvent>,
    /// Parsed page links
    pub links: Vec<LinkRelation>,
}

impl EventPage {
    /// Cursor of the following page, if the provider signals more results.
    ///
    /// An absent `next` relation means there is nothing left to fetch.
    pub fn next_cursor(&self) -> Option<PaginationCursor> {
        self.links
            .iter()
            .find(|link| link.rel == NEXT_REL)
            .map(|link| link.cursor)
            .filter(|cursor| cursor.has_results)
    }
}
