// Constants used throughout the export

// ClickUp API
pub const DEFAULT_API_URL: &str = "https://api.clickup.com/api/v2/";
pub const USER_AGENT: &str = "clickup-to-sqlite/0.1";
pub const PERSONAL_TOKEN_PREFIX: &str = "pk_";
pub const RETRY_AFTER: &str = "retry-after";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const LAST_PAGE: &str = "last_page";

// Environment variables
pub const ENV_ACCESS_TOKEN: &str = "CLICKUP_ACCESS_TOKEN";
pub const ENV_API_URL: &str = "CLICKUP_API_URL";
pub const ENV_TIMEOUT: &str = "CLICKUP_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "CLICKUP_MAX_RETRIES";
pub const ENV_BACKOFF_MS: &str = "CLICKUP_BACKOFF_MS";
pub const ENV_MAX_BACKOFF_MS: &str = "CLICKUP_MAX_BACKOFF_MS";
pub const ENV_BATCH_SIZE: &str = "CLICKUP_BATCH_SIZE";
pub const ENV_ARCHIVED: &str = "CLICKUP_ARCHIVED";
pub const ENV_START_DATE: &str = "CLICKUP_START_DATE";
pub const ENV_END_DATE: &str = "CLICKUP_END_DATE";
pub const ENV_DEBUG: &str = "CLICKUP_DEBUG";
pub const ENV_CTXOUT: &str = "CLICKUP_CTXOUT";

// Defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
pub const DEFAULT_BATCH_SIZE: usize = 500;

// Time entries default to the last 30 days server side, so an open range is
// sent as this many years on either side of now.
pub const OPEN_RANGE_YEARS: i32 = 10;

// Stored in PRAGMA user_version
pub const SCHEMA_VERSION: i64 = 1;

// Tables
pub const TEAMS: &str = "teams";
pub const MEMBERS: &str = "members";
pub const SPACES: &str = "spaces";
pub const FOLDERS: &str = "folders";
pub const LISTS: &str = "lists";
pub const TASKS: &str = "tasks";
pub const TIME_ENTRIES: &str = "timeentries";
pub const ID: &str = "id";
