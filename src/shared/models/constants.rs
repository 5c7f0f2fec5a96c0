// Session cookie names, in the order they are joined
pub const SESSION_KEY_COOKIE: &str = "pt_key";
pub const SESSION_PIN_COOKIE: &str = "pt_pin";

// Configuration defaults
pub const DEFAULT_VARIABLE_NAME: &str = "JD_COOKIE";
pub const DEFAULT_TARGET_URL: &str = "https://bean.m.jd.com/bean/signIndex.action";
pub const DEFAULT_SYNC_INTERVAL_MINUTES: i64 = 60;
// One week
pub const MAX_SYNC_INTERVAL_MINUTES: i64 = 7 * 24 * 60;
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:7431";

// Badge states
pub const BADGE_SUCCESS_TEXT: &str = "✓";
pub const BADGE_SUCCESS_COLOR: &str = "#4CAF50";
pub const BADGE_FAILURE_TEXT: &str = "!";
pub const BADGE_FAILURE_COLOR: &str = "#F44336";
pub const BADGE_CLEAR_DELAY_MS: u64 = 3000;

// Panel API
pub const PANEL_SUCCESS_CODE: i64 = 200;
pub const HTTP_TIMEOUT_SECS: u64 = 30;
