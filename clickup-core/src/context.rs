use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{ClickUpError, Result};
use crate::fetchers::DateRange;
use crate::retry::RetryPolicy;

/// Run configuration, built from defaults, an optional YAML file and the environment.
/// Passed explicitly to the client and the pipeline.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Context {
    // From CLICKUP_ACCESS_TOKEN or --auth-token, never serialized
    #[serde(skip_serializing)]
    pub access_token: String,

    // From CLICKUP_API_URL, default https://api.clickup.com/api/v2/
    pub api_url: String,

    // From CLICKUP_TIMEOUT, per request timeout in seconds, default 30
    pub timeout_secs: u64,

    // From CLICKUP_MAX_RETRIES, retries after the first attempt, default 5
    pub max_retries: u32,

    // From CLICKUP_BACKOFF_MS, first retry delay when the API gives no hint, default 1000
    pub initial_backoff_ms: u64,

    // From CLICKUP_MAX_BACKOFF_MS, upper bound for any retry delay, default 60000
    pub max_backoff_ms: u64,

    // From CLICKUP_BATCH_SIZE, rows per write transaction, default 500
    pub batch_size: usize,

    // From CLICKUP_ARCHIVED, include archived spaces/folders/lists/tasks, default false
    pub archived: bool,

    // From CLICKUP_START_DATE / CLICKUP_END_DATE, bounds for tasks and time entries
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    // From CLICKUP_DEBUG Debug level: 0-no, 1-requests, 2-verbose, default 0
    pub debug: i32,

    // From CLICKUP_CTXOUT output all context data (this struct), default false
    pub ctx_out: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            access_token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            archived: false,
            start_date: None,
            end_date: None,
            debug: 0,
            ctx_out: false,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Context")
            .field("access_token", &token)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("batch_size", &self.batch_size)
            .field("archived", &self.archived)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("debug", &self.debug)
            .field("ctx_out", &self.ctx_out)
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML config file, then let the environment override it.
    pub fn from_file_and_env(path: Option<&Path>) -> Result<Self> {
        let mut ctx = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        ctx.apply_vars(|key| std::env::var(key).ok())?;
        Ok(ctx)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            ClickUpError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overrides fields from variables returned by `var`.
    pub fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var(ENV_ACCESS_TOKEN) {
            self.access_token = token;
        }

        if let Some(api_url) = var(ENV_API_URL) {
            self.api_url = api_url;
        }

        if let Some(timeout) = var(ENV_TIMEOUT) {
            self.timeout_secs = timeout.trim().parse()?;
        }

        if let Some(max_retries) = var(ENV_MAX_RETRIES) {
            self.max_retries = max_retries.trim().parse()?;
        }

        if let Some(backoff) = var(ENV_BACKOFF_MS) {
            self.initial_backoff_ms = backoff.trim().parse()?;
        }

        if let Some(max_backoff) = var(ENV_MAX_BACKOFF_MS) {
            self.max_backoff_ms = max_backoff.trim().parse()?;
        }

        if let Some(batch_size) = var(ENV_BATCH_SIZE) {
            self.batch_size = batch_size.trim().parse()?;
        }

        if let Some(start) = var(ENV_START_DATE) {
            self.start_date = Some(parse_date(&start)?);
        }

        if let Some(end) = var(ENV_END_DATE) {
            self.end_date = Some(parse_date(&end)?);
        }

        if let Some(debug) = var(ENV_DEBUG) {
            self.debug = debug.trim().parse().unwrap_or(0);
        }

        // Boolean flags from environment
        if var(ENV_ARCHIVED).is_some() {
            self.archived = true;
        }
        if var(ENV_CTXOUT).is_some() {
            self.ctx_out = true;
        }

        Ok(())
    }

    /// Checks values that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClickUpError::Config("batch size must be at least 1".to_string()));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ClickUpError::Config(format!(
                "max backoff {}ms is below initial backoff {}ms",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        url::Url::parse(&self.api_url)?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ClickUpError::Config(format!(
                    "start date {} is after end date {}",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d")
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parses `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ClickUpError::Config(format!("invalid date: {}", value)))?;
        return Ok(midnight.and_utc());
    }
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overrides_defaults() {
        let env = vars(&[
            (ENV_ACCESS_TOKEN, "pk_123"),
            (ENV_MAX_RETRIES, "2"),
            (ENV_BATCH_SIZE, "50"),
            (ENV_START_DATE, "2024-01-01"),
            (ENV_ARCHIVED, ""),
        ]);
        let mut ctx = Context::new();
        ctx.apply_vars(|key| env.get(key).cloned()).unwrap();

        assert_eq!(ctx.access_token, "pk_123");
        assert_eq!(ctx.max_retries, 2);
        assert_eq!(ctx.batch_size, 50);
        assert!(ctx.archived);
        assert_eq!(
            ctx.start_date.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(ctx.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn bad_number_is_config_error() {
        let env = vars(&[(ENV_MAX_RETRIES, "many")]);
        let mut ctx = Context::new();
        let err = ctx.apply_vars(|key| env.get(key).cloned()).unwrap_err();
        assert!(matches!(err, ClickUpError::Config(_)));
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let ctx = Context::from_yaml("max_retries: 1\nbatch_size: 10\narchived: true\n").unwrap();
        assert_eq!(ctx.max_retries, 1);
        assert_eq!(ctx.batch_size, 10);
        assert!(ctx.archived);
        assert_eq!(ctx.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn validate_rejects_inverted_ranges() {
        let mut ctx = Context::new();
        ctx.start_date = Some(parse_date("2024-02-01").unwrap());
        ctx.end_date = Some(parse_date("2024-01-01").unwrap());
        assert!(ctx.validate().is_err());

        let mut ctx = Context::new();
        ctx.initial_backoff_ms = 5_000;
        ctx.max_backoff_ms = 1_000;
        assert!(ctx.validate().is_err());

        assert!(Context::new().validate().is_ok());
    }

    #[test]
    fn debug_output_hides_token() {
        let mut ctx = Context::new();
        ctx.access_token = "pk_secret".to_string();
        let out = format!("{:?}", ctx);
        assert!(!out.contains("pk_secret"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn parse_date_accepts_rfc3339() {
        let dt = parse_date("2023-05-06T07:08:09Z").unwrap();
        assert_eq!(dt.timestamp(), 1_683_356_889);
        assert!(parse_date("yesterday").is_err());
    }
}
