//! Takeover bookkeeping.
//!
//! Rewriting an app's own config file to point at the proxy is done by the
//! host application through [`LiveConfigRewriter`]. This module only records
//! which apps are taken over and reports whether that is healthy.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::AppType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("live config rewrite failed: {0}")]
pub struct RewriteError(pub String);

/// Redirects an app's live config to the proxy and back.
pub trait LiveConfigRewriter: Send + Sync {
    /// Point `app` at `proxy_url`, remembering its previous upstream.
    fn redirect(&self, app: AppType, proxy_url: &str) -> Result<(), RewriteError>;

    /// Put back whatever `redirect` replaced.
    fn restore(&self, app: AppType) -> Result<(), RewriteError>;
}

/// Rewriter for deployments where the host application rewrites configs
/// itself after reading the takeover status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedRewriter;

impl LiveConfigRewriter for DetachedRewriter {
    fn redirect(&self, app: AppType, proxy_url: &str) -> Result<(), RewriteError> {
        tracing::debug!(app = %app, proxy_url = %proxy_url, "Takeover enabled; rewrite left to host");
        Ok(())
    }

    fn restore(&self, app: AppType) -> Result<(), RewriteError> {
        tracing::debug!(app = %app, "Takeover disabled; restore left to host");
        Ok(())
    }
}

/// Whether a takeover can actually carry traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TakeoverHealth {
    Inactive,
    /// Taken over and the proxy is running.
    Healthy,
    /// Taken over while the proxy is stopped; the app's requests will fail
    /// at the network layer.
    Broken,
}

pub struct TakeoverController {
    rewriter: Arc<dyn LiveConfigRewriter>,
    flags: DashMap<AppType, bool>,
}

impl TakeoverController {
    pub fn new(rewriter: Arc<dyn LiveConfigRewriter>) -> Self {
        Self {
            rewriter,
            flags: DashMap::new(),
        }
    }

    pub fn is_enabled(&self, app: AppType) -> bool {
        self.flags.get(&app).is_some_and(|flag| *flag)
    }

    /// Flip the takeover flag, rewriting the app's config first.
    ///
    /// The flag only changes when the rewrite succeeded. The app's entry
    /// stays locked across the check and the rewrite, so concurrent callers
    /// rewrite at most once.
    pub fn set(&self, app: AppType, enabled: bool, proxy_url: &str) -> Result<(), RewriteError> {
        let mut flag = self.flags.entry(app).or_insert(false);
        if *flag == enabled {
            return Ok(());
        }
        if enabled {
            self.rewriter.redirect(app, proxy_url)?;
        } else {
            self.rewriter.restore(app)?;
        }
        *flag = enabled;
        drop(flag);
        tracing::info!(app = %app, enabled, "Takeover updated");
        Ok(())
    }

    /// Flag of every app.
    pub fn status(&self) -> BTreeMap<AppType, bool> {
        AppType::ALL
            .into_iter()
            .map(|app| (app, self.is_enabled(app)))
            .collect()
    }

    pub fn health(&self, proxy_running: bool) -> BTreeMap<AppType, TakeoverHealth> {
        self.status()
            .into_iter()
            .map(|(app, enabled)| {
                let health = match (enabled, proxy_running) {
                    (false, _) => TakeoverHealth::Inactive,
                    (true, true) => TakeoverHealth::Healthy,
                    (true, false) => TakeoverHealth::Broken,
                };
                (app, health)
            })
            .collect()
    }

    /// Restore every taken-over app. Failures are collected, not fatal.
    pub fn disable_all(&self) -> Vec<(AppType, RewriteError)> {
        AppType::ALL
            .into_iter()
            .filter(|app| self.is_enabled(*app))
            .filter_map(|app| self.set(app, false, "").err().map(|e| (app, e)))
            .collect()
    }
}
