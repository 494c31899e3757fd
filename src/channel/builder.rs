//! Builder pattern for channel configuration.
//!
//! # Example
//!
//! ```no_run
//! use fz_notifications::NotificationChannel;
//!
//! # fn example() -> fz_notifications::Result<()> {
//! let channel = NotificationChannel::builder()
//!     .host("localhost:8080")
//!     .build()?;
//! assert_eq!(channel.url().as_str(), "ws://localhost:8080/notifications");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::core::NotificationChannel;

// ============================================================================
// Constants
// ============================================================================

/// Path of the notification endpoint on the dashboard server.
pub const DEFAULT_PATH: &str = "/notifications";

/// How long `close()` waits for the peer to answer a close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ChannelConfig
// ============================================================================

/// Validated, immutable channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Endpoint URL (`ws` or `wss`).
    pub url: Url,
    /// Close handshake timeout.
    pub close_timeout: Duration,
}

impl ChannelConfig {
    /// Derives the endpoint for a dashboard host, e.g. `localhost:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `host` does not form a valid URL.
    pub fn for_host(host: &str, secure: bool) -> Result<Self> {
        ChannelBuilder::new().host(host).secure(secure).config()
    }
}

// ============================================================================
// ChannelBuilder
// ============================================================================

/// Builder for configuring a [`NotificationChannel`].
///
/// Either set a full [`url`](Self::url) or a [`host`](Self::host); the
/// latter derives `ws(s)://<host>/notifications`.
#[derive(Debug, Default, Clone)]
pub struct ChannelBuilder {
    url: Option<String>,
    host: Option<String>,
    secure: bool,
    path: Option<String>,
    close_timeout: Option<Duration>,
}

impl ChannelBuilder {
    /// Creates a builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full endpoint URL. Takes precedence over `host`.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the dashboard host (`name` or `name:port`).
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Uses `wss` instead of `ws` for a host-derived URL.
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Overrides the endpoint path for a host-derived URL.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the close handshake timeout.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Builds the channel in the `Closed` state.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither `url` nor `host` is set
    /// - [`Error::InvalidUrl`] if the URL is malformed or not `ws`/`wss`
    pub fn build(self) -> Result<NotificationChannel> {
        Ok(NotificationChannel::with_config(self.config()?))
    }

    /// Validates settings into a [`ChannelConfig`].
    fn config(self) -> Result<ChannelConfig> {
        let raw = match (self.url, self.host) {
            (Some(url), _) => url,
            (None, Some(host)) => {
                let scheme = if self.secure { "wss" } else { "ws" };
                let path = self.path.as_deref().unwrap_or(DEFAULT_PATH);
                let slash = if path.starts_with('/') { "" } else { "/" };
                format!("{scheme}://{host}{slash}{path}")
            }
            (None, None) => {
                return Err(Error::config(
                    "Endpoint is required. Use .url() or .host() to set it.\n\
                     Example: NotificationChannel::builder().host(\"localhost:8080\")",
                ));
            }
        };

        let url = validate_url(&raw)?;

        Ok(ChannelConfig {
            url,
            close_timeout: self.close_timeout.unwrap_or(DEFAULT_CLOSE_TIMEOUT),
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, e.to_string()))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::invalid_url(raw, "scheme must be ws or wss"));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(raw, "missing host"));
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
