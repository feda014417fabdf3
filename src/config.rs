//! # Renewal settings
//!
//! [`Settings`] is a plain [`serde::Deserialize`] structure, so it can be
//! embedded in a larger application configuration, or loaded on its own with
//! [`Settings::from_json_file`]. Every field has a default, so a minimal file
//! only names the domain:
//!
//! ```json
//! { "domain": "example.com", "contact": "admin@example.com" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::Url;
use crate::service::provider;

/// Settings which can not be used to run a renewal cycle.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The certificate authority URL could not be parsed.
    #[error("invalid certificate authority URL {url:?}: {source}")]
    InvalidDirectoryUrl {
        /// The configured value.
        url: String,
        /// The parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The certificate authority URL uses a scheme other than http, https or acme.
    #[error("unsupported certificate authority URL scheme {0:?}")]
    UnsupportedScheme(String),

    /// An `acme://` URL which names no known provider.
    #[error("unknown ACME provider shorthand {0:?}")]
    UnknownProvider(String),

    /// The contact address could not be turned into a `mailto:` URL.
    #[error("invalid contact {contact:?}: {source}")]
    InvalidContact {
        /// The configured value.
        contact: String,
        /// The parse failure.
        #[source]
        source: url::ParseError,
    },

    /// A setting has a value which can never work.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The settings file could not be read.
    #[error("reading settings: {0}")]
    Read(#[from] std::io::Error),

    /// The settings file is not valid JSON for [`Settings`].
    #[error("parsing settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the keystore is written, and the alias its entries carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeystoreSettings {
    /// Path of the PKCS#12 keystore file.
    pub path: PathBuf,
    /// Friendly name of the certificate and key entries.
    pub alias: String,
}

impl Default for KeystoreSettings {
    fn default() -> Self {
        KeystoreSettings {
            path: PathBuf::from("certkeeper/keystore.p12"),
            alias: "certkeeper".into(),
        }
    }
}

/// Everything needed to run renewal cycles for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ACME directory URL. Accepts `acme://letsencrypt.org` and
    /// `acme://letsencrypt.org/staging` as shorthands.
    pub directory_url: String,

    /// The domain the certificate is issued for.
    pub domain: String,

    /// Contact email for the ACME account, with or without `mailto:`.
    pub contact: Option<String>,

    /// Keystore location and alias.
    pub keystore: KeystoreSettings,

    /// PKCS#8 PEM file holding the account key. Generated if missing.
    pub account_key_path: PathBuf,

    /// JSON file recording which terms of service were accepted.
    pub terms_path: PathBuf,

    /// Bound on a whole order: challenges, finalization and download.
    pub order_timeout_secs: u64,

    /// Bound on each challenge wait.
    pub challenge_timeout_secs: u64,

    /// Bound on polling the order after finalization.
    pub poll_timeout_secs: u64,

    /// How long before expiry the certificate is renewed.
    pub safety_margin_hours: u64,

    /// How long to wait before retrying a failed cycle.
    pub error_retry_delay_hours: u64,

    /// Renew on a timer. When disabled only manual triggers run a cycle.
    pub auto_renew: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            directory_url: "acme://letsencrypt.org".into(),
            domain: String::new(),
            contact: None,
            keystore: KeystoreSettings::default(),
            account_key_path: PathBuf::from("certkeeper/account.pem"),
            terms_path: PathBuf::from("certkeeper/terms.json"),
            order_timeout_secs: 300,
            challenge_timeout_secs: 120,
            poll_timeout_secs: 120,
            safety_margin_hours: 72,
            error_retry_delay_hours: 1,
            auto_renew: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let data = std::fs::read(path.as_ref())?;
        let settings: Settings = serde_json::from_slice(&data)?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded settings");
        Ok(settings)
    }

    /// Reject values which can never produce a working renewal cycle.
    ///
    /// The directory URL is not checked here; it is resolved at the start of
    /// every cycle with [`resolve_directory_url`].
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        fn invalid(field: &'static str, reason: &'static str) -> ConfigurationError {
            ConfigurationError::Invalid { field, reason }
        }

        if self.domain.trim().is_empty() {
            return Err(invalid("domain", "must not be empty"));
        }
        if self.domain.starts_with("*.") {
            return Err(invalid("domain", "wildcards need DNS-01 validation"));
        }
        if self.keystore.alias.is_empty() {
            return Err(invalid("keystore.alias", "must not be empty"));
        }
        if self.order_timeout_secs == 0 {
            return Err(invalid("order_timeout_secs", "must be positive"));
        }
        if self.challenge_timeout_secs == 0 {
            return Err(invalid("challenge_timeout_secs", "must be positive"));
        }
        if self.poll_timeout_secs == 0 {
            return Err(invalid("poll_timeout_secs", "must be positive"));
        }
        self.contact_urls()?;
        Ok(())
    }

    /// The account contact as `mailto:` URLs.
    pub fn contact_urls(&self) -> Result<Vec<Url>, ConfigurationError> {
        let Some(contact) = self.contact.as_deref().map(str::trim) else {
            return Ok(Vec::new());
        };
        if contact.is_empty() {
            return Ok(Vec::new());
        }

        let mailto = if contact.starts_with("mailto:") {
            contact.to_owned()
        } else {
            format!("mailto:{contact}")
        };
        let url = mailto
            .parse()
            .map_err(|source| ConfigurationError::InvalidContact {
                contact: contact.to_owned(),
                source,
            })?;
        Ok(vec![url])
    }

    /// See [`Settings::order_timeout_secs`].
    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    /// See [`Settings::challenge_timeout_secs`].
    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    /// See [`Settings::poll_timeout_secs`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// See [`Settings::safety_margin_hours`].
    pub fn safety_margin(&self) -> chrono::Duration {
        hours(self.safety_margin_hours)
    }

    /// See [`Settings::error_retry_delay_hours`].
    pub fn error_retry_delay(&self) -> chrono::Duration {
        hours(self.error_retry_delay_hours)
    }
}

/// A century; anything longer is treated as "never".
const MAX_HOURS: u64 = 100 * 365 * 24;

fn hours(value: u64) -> chrono::Duration {
    chrono::Duration::hours(value.min(MAX_HOURS) as i64)
}

/// Turn a configured certificate authority URL into a directory URL.
///
/// `http` and `https` URLs are used as they are. `acme://letsencrypt.org`
/// and `acme://letsencrypt.org/staging` name the Let's Encrypt production
/// and staging directories.
pub fn resolve_directory_url(value: &str) -> Result<Url, ConfigurationError> {
    let url = url::Url::parse(value.trim()).map_err(|source| {
        ConfigurationError::InvalidDirectoryUrl {
            url: value.to_owned(),
            source,
        }
    })?;

    match url.scheme() {
        "http" | "https" => {
            if url.host_str().is_none() {
                return Err(ConfigurationError::InvalidDirectoryUrl {
                    url: value.to_owned(),
                    source: url::ParseError::EmptyHost,
                });
            }
            Ok(url.into())
        }
        "acme" => {
            let directory = match (url.host_str(), url.path().trim_end_matches('/')) {
                (Some("letsencrypt.org"), "") => provider::LETSENCRYPT,
                (Some("letsencrypt.org"), "/staging") => provider::LETSENCRYPT_STAGING,
                _ => return Err(ConfigurationError::UnknownProvider(value.to_owned())),
            };
            directory
                .parse()
                .map_err(|source| ConfigurationError::InvalidDirectoryUrl {
                    url: directory.to_owned(),
                    source,
                })
        }
        scheme => Err(ConfigurationError::UnsupportedScheme(scheme.to_owned())),
    }
}
