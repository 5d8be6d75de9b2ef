//! Loading session configuration from env, with an optional TOML overlay.
//!
//! See `SessionConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

/// Tunables for the session core. Every field has a sensible default, so an
/// empty TOML file (or none at all) yields a working configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
  /// Base URL of the quiz server, no trailing slash required.
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout for all HTTP calls.
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
  /// Fixed audio readiness poll interval (no backoff).
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Poll attempt cap; `None` polls forever (the original behavior).
  /// Failed checks (transport errors) never count toward this cap.
  #[serde(default = "default_poll_max_attempts")]
  pub poll_max_attempts: Option<u32>,
  /// How long a surfaced notice should stay on screen.
  #[serde(default = "default_notice_ttl_secs")]
  pub notice_ttl_secs: u64,
}

fn default_base_url() -> String {
  "http://127.0.0.1:8000".into()
}
fn default_request_timeout_secs() -> u64 {
  20
}
fn default_poll_interval_ms() -> u64 {
  1000
}
fn default_poll_max_attempts() -> Option<u32> {
  // Roughly five minutes at the default interval.
  Some(300)
}
fn default_notice_ttl_secs() -> u64 {
  5
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      request_timeout_secs: default_request_timeout_secs(),
      poll_interval_ms: default_poll_interval_ms(),
      poll_max_attempts: default_poll_max_attempts(),
      notice_ttl_secs: default_notice_ttl_secs(),
    }
  }
}

/// Load configuration: defaults, then SESSION_CONFIG_PATH TOML (if present),
/// then the QUIZ_API_BASE_URL env override. On any parsing/IO error the TOML
/// layer is skipped and logged.
pub fn load_session_config_from_env() -> SessionConfig {
  let mut cfg = match std::env::var("SESSION_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<SessionConfig>(&s) {
        Ok(cfg) => {
          info!(target: "session", %path, "Loaded session config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "session", %path, error = %e, "Failed to parse TOML config; using defaults");
          SessionConfig::default()
        }
      },
      Err(e) => {
        error!(target: "session", %path, error = %e, "Failed to read TOML config file; using defaults");
        SessionConfig::default()
      }
    },
    Err(_) => SessionConfig::default(),
  };

  if let Ok(url) = std::env::var("QUIZ_API_BASE_URL") {
    cfg.base_url = url;
  }
  cfg
}
