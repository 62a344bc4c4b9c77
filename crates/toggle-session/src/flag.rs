//! Demo flag lookup and change watching
//!
//! The industry skin comes from one feature flag. [`FlagClient`] reads it once
//! at startup; [`FlagWatcher`] reacts to `flag_change` pushes by scheduling a
//! reload.

use crate::http::{decode_response, transport_error};
use crate::push::Subscription;
use reqwest::Client;
use std::time::Duration;
use tokio::task::JoinHandle;
use toggle_core::{ChatError, FlagRequest, FlagValue, Industry, PushEvent};

/// Flag that selects the industry skin
pub const DEMO_FLAG_KEY: &str = "nt-toggle-rag-demo";

/// Flag evaluation client for `POST /get-flag-value`
#[derive(Debug, Clone)]
pub struct FlagClient {
    client: Client,
    base_url: String,
    fallback: Industry,
}

impl FlagClient {
    /// Create client for a backend base URL
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback: Industry::default(),
        }
    }

    /// With the industry used when the flag cannot be read
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, fallback: Industry) -> Self {
        self.fallback = fallback;
        self
    }

    /// Raw flag value
    ///
    /// # Errors
    /// - `ChatError::Transport` when the backend is unreachable
    /// - `ChatError::Upstream` on non-success answers
    /// - `ChatError::Decode` when the body is not a flag value
    pub async fn fetch(&self, flag_key: &str) -> Result<Option<String>, ChatError> {
        let response = self
            .client
            .post(format!("{}/get-flag-value", self.base_url))
            .json(&FlagRequest {
                flag_key: flag_key.to_string(),
            })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let value: FlagValue = decode_response(response).await?;
        Ok(value.flag_value)
    }

    /// Industry selected by the flag; any failure yields the fallback
    pub async fn industry(&self, flag_key: &str) -> Industry {
        match self.fetch(flag_key).await {
            Ok(Some(value)) => Industry::from_flag(&value),
            Ok(None) => self.fallback,
            Err(err) => {
                tracing::warn!(flag_key, error = %err, fallback = %self.fallback, "flag lookup failed");
                self.fallback
            }
        }
    }
}

/// A watched flag changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagReload {
    /// Value before the change
    pub old_value: Option<String>,
    /// Value after the change
    pub new_value: Option<String>,
}

/// Tracks one flag over the push channel
#[derive(Debug, Clone)]
pub struct FlagWatcher {
    flag_key: String,
    reload_delay: Duration,
    current: Option<String>,
}

impl FlagWatcher {
    /// Watch a flag
    #[must_use]
    pub fn new(flag_key: impl Into<String>) -> Self {
        Self {
            flag_key: flag_key.into(),
            reload_delay: Duration::from_millis(1500),
            current: None,
        }
    }

    /// With delay between the change and the reload callback
    #[inline]
    #[must_use]
    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    /// Last known value
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Update from an event; a change of the watched flag yields a reload
    pub fn observe(&mut self, event: &PushEvent) -> Option<FlagReload> {
        match event {
            PushEvent::InitialFlagValue { current_value } => {
                tracing::info!(value = ?current_value, "initial flag value");
                self.current.clone_from(current_value);
                None
            }
            PushEvent::FlagChange {
                flag_key,
                old_value,
                new_value,
            } if *flag_key == self.flag_key => {
                tracing::info!(from = ?old_value, to = ?new_value, "flag changed");
                self.current.clone_from(new_value);
                Some(FlagReload {
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                })
            }
            _ => None,
        }
    }

    /// Consume a subscription, calling `on_reload` after the delay for each change
    pub fn spawn<F>(mut self, mut subscription: Subscription, on_reload: F) -> JoinHandle<()>
    where
        F: Fn(FlagReload) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let Some(reload) = self.observe(&event) {
                    tokio::time::sleep(self.reload_delay).await;
                    on_reload(reload);
                }
            }
        })
    }
}

impl Default for FlagWatcher {
    fn default() -> Self {
        Self::new(DEMO_FLAG_KEY)
    }
}
