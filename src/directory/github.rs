use async_trait::async_trait;
use hyper::{Body, Method, Request, StatusCode, client::HttpConnector, header};
use hyper_tls::HttpsConnector;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::TokenVerifier;
use super::syncer::{DirectoryError, DirectoryService, Page, PageRequest, Team};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("nerf/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GitHubTeam {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

/// GitHub REST backend for team listings and token verification
pub struct GitHubDirectory {
    http_client: hyper::Client<HttpsConnector<HttpConnector>>,
    api_url: String,
    /// Organization-wide token used for team listings
    token: String,
}

impl GitHubDirectory {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let https = HttpsConnector::new();
        let http_client = hyper::Client::builder().build::<_, Body>(https);

        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// GETs `url` as JSON and returns the body with the next-page cursor from `Link`
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<(T, Option<u32>), DirectoryError> {
        let request_error = |message: String| DirectoryError::Request {
            url: url.to_string(),
            message,
        };

        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::AUTHORIZATION, format!("token {}", token))
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
            .map_err(|e| request_error(e.to_string()))?;

        trace!("GitHub request: GET {}", url);
        let response = self.http_client
            .request(request)
            .await
            .map_err(|e| request_error(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let next_page = response
            .headers()
            .get(header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_from_link);

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| request_error(e.to_string()))?;

        let parsed = serde_json::from_slice(&body).map_err(|e| DirectoryError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok((parsed, next_page))
    }
}

#[async_trait]
impl DirectoryService for GitHubDirectory {
    async fn list_teams(&self, organization: &str, page: PageRequest) -> Result<Page<Team>, DirectoryError> {
        let url = format!(
            "{}/orgs/{}/teams?per_page={}&page={}",
            self.api_url, organization, page.per_page, page.page
        );

        let (teams, next_page): (Vec<GitHubTeam>, _) = self.get_json(&url, &self.token).await?;
        debug!("Fetched {} teams of {} (page {})", teams.len(), organization, page.page);

        Ok(Page {
            items: teams
                .into_iter()
                .map(|team| Team { id: team.id, name: team.name })
                .collect(),
            next_page,
        })
    }

    async fn list_team_members(&self, team: &Team, page: PageRequest) -> Result<Page<String>, DirectoryError> {
        let url = format!(
            "{}/teams/{}/members?per_page={}&page={}",
            self.api_url, team.id, page.per_page, page.page
        );

        let (users, next_page): (Vec<GitHubUser>, _) = self.get_json(&url, &self.token).await?;

        Ok(Page {
            items: users.into_iter().map(|user| user.login).collect(),
            next_page,
        })
    }
}

#[async_trait]
impl TokenVerifier for GitHubDirectory {
    async fn verify(&self, token: &str) -> Result<String, DirectoryError> {
        let url = format!("{}/user", self.api_url);
        let (user, _): (GitHubUser, _) = self.get_json(&url, token).await?;
        Ok(user.login)
    }
}

/// Extracts the `page` query parameter of the `rel="next"` entry of a `Link` header
pub fn next_page_from_link(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim().trim_start_matches('<').trim_end_matches('>');

        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }

        let (_, query) = target.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}
