use std::fmt;

use models::{
    Fingerprint, Host, Incident, IncidentUpdate, NewComment, NewIncident, Provider, ProviderType,
    Team,
};
use reqwest::{
    Client as HttpClient, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, LOCATION},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result, Service, expect_status};

/// How many times a rejected token is refreshed before giving up.
const MAX_REAUTH: usize = 1;

/// Page size used when listing teams.
const TEAMS_PAGE_SIZE: u32 = 1000;

/// Page size used when walking incident listings.
const INCIDENTS_PAGE_SIZE: u32 = 100;

/// Authentication token cache for one execution context.
///
/// Each scheduled job owns one holder and passes it into every backend call, so the
/// token is reused across calls and refreshed only when the backend rejects it.
#[derive(Default)]
pub struct Credentials {
    token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("cached", &self.token.is_some()).finish()
    }
}

impl Credentials {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder with a pre-acquired token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    /// Currently cached token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn store(&mut self, token: String) {
        self.token = Some(token);
    }

    fn invalidate(&mut self) {
        self.token = None;
    }
}

/// Location of a resource created by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location(String);

impl Location {
    /// Full location as returned in the `Location` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the created resource: the last path segment.
    pub fn id(&self) -> &str {
        self.0.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
    }
}

/// Filter for incident listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentQuery {
    /// Only incidents carrying this fingerprint
    pub fingerprint: Option<Fingerprint>,
    /// Only incidents with this resolved state
    pub resolved: Option<bool>,
}

impl IncidentQuery {
    /// Point query by fingerprint.
    pub fn by_fingerprint(fingerprint: &Fingerprint) -> Self {
        Self { fingerprint: Some(fingerprint.clone()), resolved: None }
    }

    /// Every incident that is still open.
    pub const fn unresolved() -> Self {
        Self { fingerprint: None, resolved: Some(false) }
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(fp) = &self.fingerprint {
            pairs.push(("hash", fp.to_string()));
        }
        if let Some(resolved) = self.resolved {
            pairs.push(("resolved", resolved.to_string()));
        }
        pairs
    }
}

#[derive(Deserialize)]
struct Many<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    pages: u32,
}

#[derive(Serialize)]
struct Login<'a> {
    email: &'a str,
    password: &'a str,
}

/// Client for the backend state store.
#[derive(Clone)]
pub struct BackendClient {
    http: HttpClient,
    base_url: Url,
    email: String,
    password: String,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url.as_str())
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(base_url: Url, email: String, password: String) -> Self {
        Self { http: HttpClient::new(), base_url, email, password }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path))?)
    }

    /// Obtain a fresh token for the service account.
    pub async fn login(&self) -> Result<String> {
        info!("requesting backend token");
        let url = self.endpoint("users/login")?;
        let body = Login { email: &self.email, password: &self.password };
        let resp = self.http.post(url).json(&body).send().await?;
        let resp = expect_status(Service::Backend, resp, StatusCode::NO_CONTENT).await?;
        resp.headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(Error::MissingHeader { service: Service::Backend, header: "Authorization" })
    }

    /// Send an authenticated request, refreshing the token a bounded number of times when
    /// the backend reports it expired.
    async fn send<F>(&self, creds: &mut Credentials, build: F) -> Result<Response>
    where
        F: Fn(&HttpClient) -> Result<RequestBuilder>,
    {
        for attempt in 0..=MAX_REAUTH {
            let token = match creds.token() {
                Some(token) => token.to_owned(),
                None => {
                    let token = self.login().await?;
                    creds.store(token.clone());
                    token
                }
            };
            let resp = build(&self.http)?.header(AUTHORIZATION, token).send().await?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return Ok(resp);
            }
            debug!(attempt, "backend token rejected, re-authenticating");
            creds.invalidate();
        }
        Err(Error::Unauthorized { service: Service::Backend })
    }

    async fn get_many<T: DeserializeOwned>(
        &self,
        creds: &mut Credentials,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(Vec<T>, u32)> {
        let url = self.endpoint(path)?;
        let resp = self.send(creds, |http| Ok(http.get(url.clone()).query(query))).await?;
        let resp = expect_status(Service::Backend, resp, StatusCode::OK).await?;
        let many = resp.json::<Many<T>>().await?;
        let pages = many.meta.map_or(1, |m| m.pages.max(1));
        Ok((many.data, pages))
    }

    /// List providers of the given type.
    pub async fn list_providers(
        &self,
        creds: &mut Credentials,
        provider_type: ProviderType,
    ) -> Result<Vec<Provider>> {
        debug!(%provider_type, "listing providers");
        let query = [("provider_type", provider_type.as_str().to_owned())];
        Ok(self.get_many(creds, "providers", &query).await?.0)
    }

    /// List hosts whose hostname is one of `hostnames`.
    pub async fn list_hosts(&self, creds: &mut Credentials, hostnames: &[&str]) -> Result<Vec<Host>> {
        let query = [("hostnames", hostnames.join(","))];
        Ok(self.get_many(creds, "hosts", &query).await?.0)
    }

    /// List every team.
    pub async fn list_teams(&self, creds: &mut Credentials) -> Result<Vec<Team>> {
        let query = [("pageSize", TEAMS_PAGE_SIZE.to_string())];
        Ok(self.get_many(creds, "teams", &query).await?.0)
    }

    /// List every incident matching `filter`, walking all result pages.
    pub async fn list_incidents(
        &self,
        creds: &mut Credentials,
        filter: &IncidentQuery,
    ) -> Result<Vec<Incident>> {
        let mut incidents = Vec::new();
        let mut page = 1;
        loop {
            let mut query = filter.pairs();
            query.push(("page", page.to_string()));
            query.push(("pageSize", INCIDENTS_PAGE_SIZE.to_string()));
            let (data, pages) = self.get_many::<Incident>(creds, "incidents", &query).await?;
            incidents.extend(data);
            if page >= pages {
                return Ok(incidents);
            }
            page += 1;
        }
    }

    /// Submit a new incident and return its location.
    pub async fn create_incident(
        &self,
        creds: &mut Credentials,
        incident: &NewIncident,
    ) -> Result<Location> {
        let url = self.endpoint("incidents")?;
        let resp = self.send(creds, |http| Ok(http.post(url.clone()).json(incident))).await?;
        location(expect_status(Service::Backend, resp, StatusCode::CREATED).await?)
    }

    /// Replace the mutable fields of an incident.
    pub async fn update_incident(
        &self,
        creds: &mut Credentials,
        uuid: &str,
        update: &IncidentUpdate,
    ) -> Result<()> {
        let url = self.endpoint(&format!("incidents/{uuid}"))?;
        let resp = self.send(creds, |http| Ok(http.put(url.clone()).json(update))).await?;
        expect_status(Service::Backend, resp, StatusCode::NO_CONTENT).await?;
        Ok(())
    }

    /// Post a comment on an incident and return its location.
    pub async fn post_comment(
        &self,
        creds: &mut Credentials,
        incident_uuid: &str,
        comment: &str,
    ) -> Result<Location> {
        let url = self.endpoint(&format!("incidents/{incident_uuid}/comments"))?;
        let body = NewComment { comment: comment.to_owned() };
        let resp = self.send(creds, |http| Ok(http.post(url.clone()).json(&body))).await?;
        location(expect_status(Service::Backend, resp, StatusCode::CREATED).await?)
    }

    /// Delete a comment from an incident.
    pub async fn delete_comment(
        &self,
        creds: &mut Credentials,
        incident_uuid: &str,
        comment_uuid: &str,
    ) -> Result<()> {
        let url = self.endpoint(&format!("incidents/{incident_uuid}/comments/{comment_uuid}"))?;
        let resp = self.send(creds, |http| Ok(http.delete(url.clone()))).await?;
        expect_status(Service::Backend, resp, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

fn location(resp: Response) -> Result<Location> {
    resp.headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| Location(v.to_owned()))
        .ok_or(Error::MissingHeader { service: Service::Backend, header: "Location" })
}
