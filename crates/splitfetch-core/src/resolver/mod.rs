//! Resolver interface for turning task descriptors into fetchable locators.
//!
//! The transfer path only depends on [`ResolvedLocator`]; how a descriptor is
//! turned into one is up to the [`Resolver`] implementation. Resolution may be
//! slow and flaky, so callers go through [`resolve_with_retry`].

mod redirect;

pub use redirect::RedirectResolver;

use crate::config::{FetchConfig, ResolverKind};
use crate::retry::{run_with_retry, ErrorKind, RetryPolicy};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Concrete locator plus the headers every request for it must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocator {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl ResolvedLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// Turns a task descriptor into a locator. Called once at task init and again
/// whenever a ranged request reveals that the locator expired.
pub trait Resolver: Send + Sync {
    fn resolve(&self, descriptor: &str) -> Result<ResolvedLocator>;
}

/// The descriptor already is the locator.
#[derive(Debug, Clone, Default)]
pub struct DirectResolver {
    referer: Option<String>,
}

impl DirectResolver {
    pub fn new(referer: Option<String>) -> Self {
        Self { referer }
    }
}

impl Resolver for DirectResolver {
    fn resolve(&self, descriptor: &str) -> Result<ResolvedLocator> {
        let parsed = url::Url::parse(descriptor.trim())
            .with_context(|| format!("descriptor is not a URL: {}", descriptor))?;
        if parsed.host_str().is_none() {
            anyhow::bail!("descriptor has no host: {}", descriptor);
        }
        let mut locator = ResolvedLocator::new(parsed.as_str());
        if let Some(referer) = &self.referer {
            locator = locator.with_header("Referer", referer);
        }
        Ok(locator)
    }
}

/// Resolver selected by configuration.
pub fn resolver_for(cfg: &FetchConfig) -> Arc<dyn Resolver> {
    match cfg.resolver {
        ResolverKind::Direct => Arc::new(DirectResolver::new(cfg.referer.clone())),
        ResolverKind::Redirect => Arc::new(RedirectResolver::new(
            cfg.user_agent.clone(),
            cfg.connect_timeout(),
        )),
    }
}

/// Resolve with bounded exponential backoff.
pub fn resolve_with_retry(
    resolver: &dyn Resolver,
    descriptor: &str,
    policy: &RetryPolicy,
) -> Result<ResolvedLocator> {
    run_with_retry(
        policy,
        |_: &anyhow::Error| ErrorKind::Transport,
        |attempt| {
            let r = resolver.resolve(descriptor);
            if let Err(e) = &r {
                tracing::warn!(descriptor, attempt, "resolution failed: {:#}", e);
            }
            r
        },
    )
    .with_context(|| format!("could not resolve {}", descriptor))
}
