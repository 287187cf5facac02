#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::constants::{EMAILED_FILE, MAX_EMAIL_BYTES, TEST_LOG, TOEMAIL_FILE};

/// Candidate locations for the user override file, checked in order. The
/// first one that exists wins.
const OVERRIDE_CANDIDATES: [&str; 4] = ["~/.jolly.toml", "~/jolly.toml", ".jolly.toml", "jolly.toml"];

/// Guidance printed when no Canvas token can be found anywhere.
pub const TOKEN_HELP: &str = "A Canvas API token is required. Generate one under Canvas \
                              `Account > Settings > New Access Token` and place it in a \
                              `jolly.toml` (key `canvas_token`) or in the `CANVAS_TOKEN` \
                              environment variable.";

/// An enum to represent possible errors while loading configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The override file existed but could not be read.
    #[error("Could not read configuration file `{path}`")]
    Unreadable {
        /// Path of the offending file.
        path:   PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The override file existed but was not valid TOML.
    #[error("Could not parse configuration file `{path}`")]
    Unparseable {
        /// Path of the offending file.
        path:   PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// User-supplied overrides, every field optional. Anything absent falls
/// back to the compiled-in default.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverlay {
    /// Canvas REST base URL, ending in `/api/v1/`.
    pub canvas_api:        Option<String>,
    /// Canvas bearer token.
    pub canvas_token:      Option<String>,
    /// Domain appended to netids to form student email addresses.
    pub email_domain:      Option<String>,
    /// SMTP relay host.
    pub smtp_server:       Option<String>,
    /// Login name used for the SMTP relay and the From address. Defaults to
    /// the invoking user's login.
    pub from_user:         Option<String>,
    /// Default subject line for feedback emails.
    pub email_subject:     Option<String>,
    /// Friendly text inserted above the log in every email.
    pub intro_message:     Option<String>,
    /// Per-test-invocation timeout in seconds.
    pub test_timeout_secs: Option<u64>,
    /// Delay after each successful send, in seconds.
    pub mail_delay_secs:   Option<u64>,
    /// Logs above this many bytes are truncated before mailing.
    pub max_email_bytes:   Option<u64>,
    /// Name of the rolling per-student test log.
    pub test_log:          Option<String>,
    /// Name of the per-student file handed to the mailer.
    pub email_file:        Option<String>,
    /// Name of the sent-mail copy / duplicate-send guard file.
    pub email_sent_file:   Option<String>,
}

impl ConfigOverlay {
    /// Parses an overlay from TOML text.
    pub fn from_toml(path: PathBuf, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Unparseable { path, source })
    }

    /// Loads the first override file that exists, or an empty overlay when
    /// none does.
    fn discover() -> Result<Self, ConfigError> {
        for candidate in OVERRIDE_CANDIDATES {
            let path = crate::util::expand_path(candidate);
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::Unreadable {
                    path: path.clone(),
                    source,
                }
            })?;
            return Self::from_toml(path, &text);
        }
        Ok(Self::default())
    }
}

/// Runtime configuration shared across the crate: Canvas endpoint and
/// token, mail parameters, per-student file names, and the shared HTTP
/// client.
pub struct ConfigState {
    /// Canvas REST base URL.
    canvas_api:      String,
    /// Canvas bearer token, if configured.
    canvas_token:    Option<String>,
    /// Domain for student email addresses.
    email_domain:    String,
    /// SMTP relay host.
    smtp_server:     String,
    /// SMTP login / From-address user, if overridden.
    from_user:       Option<String>,
    /// Default feedback email subject.
    email_subject:   String,
    /// Friendly text inserted above the log in every email.
    intro_message:   String,
    /// Per-test-invocation timeout.
    test_timeout:    Duration,
    /// Delay after each successful send.
    mail_delay:      Duration,
    /// Truncation threshold for mailed logs.
    max_email_bytes: u64,
    /// Rolling per-student test log name.
    test_log:        String,
    /// Per-student file handed to the mailer.
    email_file:      String,
    /// Sent-mail copy / duplicate-send guard file name.
    email_sent_file: String,
    /// Shared reqwest HTTP client reused across network helpers.
    http_client:     Client,
}

impl ConfigState {
    /// Builds the configuration from an overlay plus the environment.
    /// `CANVAS_TOKEN` and `SMTP_PASSWORD` come from the environment only;
    /// a token in the overlay file wins over the environment.
    pub fn from_overlay(overlay: ConfigOverlay) -> Result<Self> {
        let canvas_token = overlay
            .canvas_token
            .or_else(|| std::env::var("CANVAS_TOKEN").ok())
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());

        let http_client = Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .build()
            .context("Failed to construct shared HTTP client")?;

        Ok(Self {
            canvas_api: overlay
                .canvas_api
                .unwrap_or_else(|| "https://canvas.instructure.com/api/v1/".to_string()),
            canvas_token,
            email_domain: overlay.email_domain.unwrap_or_else(|| "uw.edu".to_string()),
            smtp_server: overlay.smtp_server.unwrap_or_else(|| "smtp.uw.edu".to_string()),
            from_user: overlay.from_user,
            email_subject: overlay
                .email_subject
                .unwrap_or_else(|| "Comments from JollyFeedback Automated Script".to_string()),
            intro_message: overlay.intro_message.unwrap_or_else(|| {
                "Below are the results of the automated tests that were run against your \
                 submission.\nReply to this email if you have questions about the feedback.\n"
                    .to_string()
            }),
            test_timeout: Duration::from_secs(overlay.test_timeout_secs.unwrap_or(10)),
            mail_delay: Duration::from_secs(overlay.mail_delay_secs.unwrap_or(15)),
            max_email_bytes: overlay.max_email_bytes.unwrap_or(MAX_EMAIL_BYTES),
            test_log: overlay.test_log.unwrap_or_else(|| TEST_LOG.to_string()),
            email_file: overlay.email_file.unwrap_or_else(|| TOEMAIL_FILE.to_string()),
            email_sent_file: overlay.email_sent_file.unwrap_or_else(|| EMAILED_FILE.to_string()),
            http_client,
        })
    }

    /// Canvas REST base URL, with a trailing slash.
    pub fn canvas_api(&self) -> String {
        if self.canvas_api.ends_with('/') {
            self.canvas_api.clone()
        } else {
            format!("{}/", self.canvas_api)
        }
    }

    /// Canvas bearer token, if one was configured.
    pub fn canvas_token(&self) -> Option<&str> {
        self.canvas_token.as_deref()
    }

    /// Domain for student email addresses.
    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    /// SMTP relay host.
    pub fn smtp_server(&self) -> &str {
        &self.smtp_server
    }

    /// SMTP login / From-address user: the configured override, else the
    /// invoking user's login.
    pub fn from_user(&self) -> Option<String> {
        self.from_user.clone().or_else(|| std::env::var("USER").ok())
    }

    /// Default feedback email subject.
    pub fn email_subject(&self) -> &str {
        &self.email_subject
    }

    /// Friendly text inserted above the log in every email.
    pub fn intro_message(&self) -> &str {
        &self.intro_message
    }

    /// Per-test-invocation timeout.
    pub fn test_timeout(&self) -> Duration {
        self.test_timeout
    }

    /// Delay after each successful send.
    pub fn mail_delay(&self) -> Duration {
        self.mail_delay
    }

    /// Truncation threshold for mailed logs, in bytes.
    pub fn max_email_bytes(&self) -> u64 {
        self.max_email_bytes
    }

    /// Rolling per-student test log name.
    pub fn test_log(&self) -> &str {
        &self.test_log
    }

    /// Per-student file handed to the mailer.
    pub fn email_file(&self) -> &str {
        &self.email_file
    }

    /// Sent-mail copy / duplicate-send guard file name.
    pub fn email_sent_file(&self) -> &str {
        &self.email_sent_file
    }

    /// Returns a clone of the shared reqwest HTTP client.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl ConfigHandle {
    /// Wraps a freshly built state. Exposed so tests can construct handles
    /// from an in-memory overlay.
    pub fn from_state(state: ConfigState) -> Self {
        Self(Arc::new(state))
    }
}

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot.lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let overlay = ConfigOverlay::discover()?;
    let cfg = Arc::new(ConfigState::from_overlay(overlay)?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}
