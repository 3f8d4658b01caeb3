//! Authenticated ClickUp API client with retry and pagination.

use chrono::Utc;
use futures::stream::{self, Stream, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::constants::*;
use crate::context::Context;
use crate::error::{ClickUpError, Result};
use crate::retry::{RetryPolicy, RetryState};

/// Query parameters, sent in order.
pub type Query = Vec<(String, String)>;

/// How a listing endpoint splits its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Everything comes back in one response
    Single,
    /// `page=0,1,2,...` until `last_page` is true or a page is empty
    PageNumber,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(ctx: &Context) -> Result<Self> {
        let token = ctx.access_token.trim();
        if token.is_empty() {
            return Err(ClickUpError::Authentication(format!(
                "access token required, use --auth-token or set {}",
                ENV_ACCESS_TOKEN
            )));
        }

        // Personal tokens go in as-is, OAuth tokens need the scheme
        let authorization = if token.starts_with(PERSONAL_TOKEN_PREFIX) {
            token.to_string()
        } else {
            format!("Bearer {}", token)
        };
        let mut auth_value = HeaderValue::from_str(&authorization)?;
        auth_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::constants::USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(ctx.timeout())
            .build()?;

        let mut base = ctx.api_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
            retry: ctx.retry_policy(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs one logical request, retrying transient failures within the policy bound.
    pub async fn request(&self, method: Method, path: &str, query: &[(String, String)]) -> Result<Value> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut state = RetryState::start();

        while let RetryState::Attempting { attempt } = state {
            debug!("{} {} (attempt {})", method, url, attempt);

            let err = match self.send_once(method.clone(), url.clone(), query).await {
                Ok(body) => {
                    state = state.on_success();
                    debug!("{} {} done: {:?}", method, path, state);
                    return Ok(body);
                }
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            state = state.on_transient_failure(&self.retry, err.retry_hint());
            match state {
                RetryState::Waiting { attempt, delay } => {
                    warn!(
                        "{} {} failed (attempt {}/{}): {}, retrying in {:?}",
                        method,
                        path,
                        attempt,
                        self.retry.max_attempts(),
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    state = state.on_wait_elapsed();
                }
                RetryState::Failed { attempts } => {
                    return Err(ClickUpError::ExhaustedRetries {
                        attempts,
                        last: Box::new(err),
                    });
                }
                _ => return Err(err),
            }
        }

        Err(ClickUpError::TransientNetwork(format!(
            "{} {} did not complete",
            method, path
        )))
    }

    async fn send_once(&self, method: Method, url: Url, query: &[(String, String)]) -> Result<Value> {
        let mut builder = self.http.request(method, url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            return Ok(serde_json::from_str(&text)?);
        }

        let hint = retry_hint(response.headers());
        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, hint, &path, body))
    }

    /// Streams every item under `key` across all pages of a listing.
    ///
    /// The stream is lazy: no request is made until it is polled, and
    /// polling it again from scratch re-issues every request.
    pub fn paginate<'a>(
        &'a self,
        path: String,
        query: Query,
        key: &'static str,
        mode: Pagination,
    ) -> impl Stream<Item = Result<Value>> + 'a {
        stream::try_unfold(Some(0u32), move |page| {
            let path = path.clone();
            let mut query = query.clone();
            async move {
                let Some(page) = page else {
                    return Ok::<_, ClickUpError>(None);
                };
                if mode == Pagination::PageNumber {
                    query.push(("page".to_string(), page.to_string()));
                }

                let mut body = self.request(Method::GET, &path, &query).await?;
                let items = take_items(&mut body, key, &path)?;
                let next = match mode {
                    Pagination::Single => None,
                    Pagination::PageNumber => {
                        let last = body.get(LAST_PAGE).and_then(Value::as_bool).unwrap_or(false);
                        if last || items.is_empty() {
                            None
                        } else {
                            Some(page + 1)
                        }
                    }
                };
                debug!("{} page {}: {} items", path, page, items.len());
                Ok(Some((items, next)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, ClickUpError>)))
        .try_flatten()
    }
}

fn take_items(body: &mut Value, key: &str, path: &str) -> Result<Vec<Value>> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Err(ClickUpError::Decode(format!(
            "{}: response has no '{}' array",
            path, key
        ))),
        Some(other) => Err(ClickUpError::Decode(format!(
            "{}: '{}' is not an array: {}",
            path, key, other
        ))),
    }
}

/// Maps a non-success status to an error.
pub fn classify(status: StatusCode, hint: Option<Duration>, path: &str, body: String) -> ClickUpError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ClickUpError::RateLimited { retry_after: hint },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClickUpError::Authentication(format!("HTTP {} for {}: {}", status.as_u16(), path, body))
        }
        StatusCode::NOT_FOUND => ClickUpError::NotFound(path.to_string()),
        status if status.is_server_error() => {
            ClickUpError::TransientNetwork(format!("HTTP {} for {}", status.as_u16(), path))
        }
        status => ClickUpError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Delay requested by the provider: `Retry-After` seconds, or the time left until
/// the `X-RateLimit-Reset` epoch second.
pub fn retry_hint(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    if let Some(seconds) = header(RETRY_AFTER).and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(seconds));
    }

    let reset = header(RATE_LIMIT_RESET).and_then(|v| v.parse::<i64>().ok())?;
    let remaining = reset - Utc::now().timestamp();
    Some(Duration::from_secs(remaining.max(0) as u64))
}
