//! `reqwest`-backed implementation of [`RemoteApi`].

use std::time::Duration;

use reqwest::header::{ACCEPT, LINK};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

use super::types::{
    next_link, ApiCourse, ApiCustomColors, ApiGradingPeriod, ApiGradingPeriodPage, ApiSubmission,
    PutSubmissionGradeRequest,
};
use super::{ApiFuture, RemoteApi};

/// Ask the server to render numeric ids as JSON strings.
pub(crate) const STRING_IDS_ACCEPT: &str = "application/json+canvas-string-ids";

/// Upper bound on followed `next` links for one listing.
const MAX_PAGES: usize = 500;

/// HTTP client for the LMS REST API.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: String,
    per_page: u32,
}

impl HttpApi {
    /// Build a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, token: &str, per_page: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            per_page,
        })
    }

    /// Build a client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.api_token,
            config.per_page,
            config.request_timeout(),
        )
    }

    /// Absolute URL for an API path, with query pairs appended.
    pub(crate) fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|err| AppError::Config(format!("invalid api url {path}: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// Decode a success response or map the status to a network error.
    pub(crate) async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
        let response = Self::check(endpoint, response)?;
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Network(format!("{endpoint}: invalid response body: {err}")))
    }

    pub(crate) fn check(endpoint: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            warn!(endpoint, %status, "api request rejected");
            Err(AppError::Network(format!("{endpoint}: status {status}")))
        }
    }

    async fn get(&self, endpoint: &str, url: Url) -> Result<Response> {
        debug!(endpoint, %url, "GET");
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, STRING_IDS_ACCEPT)
            .send()
            .await
            .map_err(|err| AppError::Network(format!("{endpoint}: {err}")))
    }

    /// Follow `Link: rel="next"` headers, collecting every page.
    async fn get_all_pages<P, T>(
        &self,
        endpoint: &str,
        first: Url,
        items: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut collected = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(AppError::Network(format!(
                    "{endpoint}: more than {MAX_PAGES} pages"
                )));
            }

            let response = Self::check(endpoint, self.get(endpoint, url).await?)?;
            let link = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let page: P = Self::decode(endpoint, response).await?;
            collected.extend(items(page));

            next = link
                .map(|href| {
                    Url::parse(&href)
                        .map_err(|err| AppError::Network(format!("{endpoint}: bad next link: {err}")))
                })
                .transpose()?;
        }

        Ok(collected)
    }
}

impl RemoteApi for HttpApi {
    fn fetch_courses(&self) -> ApiFuture<'_, Vec<ApiCourse>> {
        Box::pin(async move {
            let per_page = self.per_page.to_string();
            let url = self.url(
                "/api/v1/courses",
                &[("include[]", "course_image"), ("per_page", per_page.as_str())],
            )?;
            self.get_all_pages("get courses", url, |page: Vec<ApiCourse>| page)
                .await
        })
    }

    fn fetch_custom_colors(&self) -> ApiFuture<'_, ApiCustomColors> {
        Box::pin(async move {
            let url = self.url("/api/v1/users/self/colors", &[])?;
            let response = self.get("get custom colors", url).await?;
            Self::decode("get custom colors", response).await
        })
    }

    fn fetch_grading_periods<'a>(&'a self, course_id: &'a str) -> ApiFuture<'a, Vec<ApiGradingPeriod>> {
        Box::pin(async move {
            let per_page = self.per_page.to_string();
            let url = self.url(
                &format!("/api/v1/courses/{course_id}/grading_periods"),
                &[("per_page", per_page.as_str())],
            )?;
            self.get_all_pages("get grading periods", url, |page: ApiGradingPeriodPage| {
                page.grading_periods
            })
            .await
        })
    }

    fn put_submission_grade<'a>(
        &'a self,
        request: &'a PutSubmissionGradeRequest,
    ) -> ApiFuture<'a, ApiSubmission> {
        Box::pin(async move {
            let endpoint = "put submission grade";
            let url = self.url(&request.path(), &[])?;
            debug!(endpoint, %url, "PUT");
            let response = self
                .client
                .put(url)
                .bearer_auth(&self.token)
                .header(ACCEPT, STRING_IDS_ACCEPT)
                .json(&request.body)
                .send()
                .await
                .map_err(|err| AppError::Network(format!("{endpoint}: {err}")))?;
            Self::decode(endpoint, response).await
        })
    }
}
