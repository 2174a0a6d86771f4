//! Resolve a descriptor by following its HTTP redirect chain.

use super::{ResolvedLocator, Resolver};
use anyhow::{Context, Result};
use std::time::Duration;

/// Follows redirects from the descriptor URL with libcurl; the effective URL
/// becomes the locator and the descriptor is sent as its `Referer`.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    user_agent: String,
    connect_timeout: Duration,
}

impl RedirectResolver {
    pub fn new(user_agent: String, connect_timeout: Duration) -> Self {
        Self {
            user_agent,
            connect_timeout,
        }
    }
}

impl Resolver for RedirectResolver {
    fn resolve(&self, descriptor: &str) -> Result<ResolvedLocator> {
        let descriptor = descriptor.trim();
        let mut easy = curl::easy::Easy::new();
        easy.url(descriptor).context("invalid descriptor URL")?;
        easy.nobody(true)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.useragent(&self.user_agent)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.connect_timeout * 2)?;
        easy.perform().context("redirect lookup failed")?;

        let code = easy.response_code().context("no response code")?;
        if !(200..400).contains(&code) {
            anyhow::bail!("{} answered HTTP {}", descriptor, code);
        }
        let effective = easy
            .effective_url()?
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.to_string());
        tracing::debug!(descriptor, locator = %effective, "resolved");
        Ok(ResolvedLocator::new(effective).with_header("Referer", descriptor))
    }
}
