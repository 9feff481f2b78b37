// Offline shell contract: which static assets the UI needs, how the cache is
// versioned, and how a fetch is answered from cache or network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Current cache generation. Bump when `SHELL_ASSETS` changes.
pub const CACHE_NAME: &str = "purpleplayer-shell-v1";

/// Document served for navigations when offline.
pub const SHELL_DOCUMENT: &str = "/index.html";

pub const SHELL_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/app.js",
    "/manifest.json",
    "/images/icon-192.png",
    "/images/icon-512.png",
    "/images/favicon.ico",
];

/// Cache names left over from older generations.
pub fn stale_caches<'a>(existing: &[&'a str]) -> Vec<&'a str> {
    existing
        .iter()
        .copied()
        .filter(|name| *name != CACHE_NAME)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    /// Top-level page load rather than a subresource.
    pub is_navigation: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest {
            method: "GET".to_string(),
            url: url.into(),
            is_navigation: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        FetchRequest {
            is_navigation: true,
            ..Self::get(url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub same_origin: bool,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Response {
            status: 200,
            same_origin: true,
            body: body.into(),
        }
    }

    fn is_cacheable(&self) -> bool {
        self.status == 200 && self.same_origin
    }
}

/// What `resolve_fetch` produced and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Non-GET request, handed to the network untouched.
    Bypassed(Result<Response, String>),
    Cached(Response),
    Network(Response),
    /// Navigation answered with the shell document after a network failure.
    ShellFallback(Response),
    Failed(String),
}

/// A named response cache keyed by URL.
pub trait CacheStorage {
    fn match_url(&self, url: &str) -> Option<Response>;
    fn put(&self, url: &str, response: Response);
}

/// Network side of a fetch.
pub trait Network {
    fn fetch(&self, request: &FetchRequest) -> Result<Response, String>;
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Response>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache with every shell asset the network can serve.
    /// Returns the assets that could not be fetched.
    pub fn install<N: Network>(&self, network: &N) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for asset in SHELL_ASSETS {
            match network.fetch(&FetchRequest::get(*asset)) {
                Ok(response) if response.is_cacheable() => self.put(asset, response),
                Ok(response) => {
                    tracing::warn!(asset, status = response.status, "shell asset not cacheable");
                    missing.push(*asset);
                }
                Err(e) => {
                    tracing::warn!(asset, error = %e, "shell asset fetch failed");
                    missing.push(*asset);
                }
            }
        }
        missing
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStorage for MemoryCache {
    fn match_url(&self, url: &str) -> Option<Response> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .cloned()
    }

    fn put(&self, url: &str, response: Response) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.to_string(), response);
    }
}

/// Answer a fetch: cache first, then network, then the shell document for
/// navigations.
pub fn resolve_fetch<C: CacheStorage, N: Network>(
    request: &FetchRequest,
    cache: &C,
    network: &N,
) -> FetchOutcome {
    if !request.method.eq_ignore_ascii_case("GET") {
        return FetchOutcome::Bypassed(network.fetch(request));
    }

    if let Some(hit) = cache.match_url(&request.url) {
        return FetchOutcome::Cached(hit);
    }

    match network.fetch(request) {
        Ok(response) => {
            if response.is_cacheable() {
                cache.put(&request.url, response.clone());
            }
            FetchOutcome::Network(response)
        }
        Err(e) => {
            if request.is_navigation {
                if let Some(shell) = cache.match_url(SHELL_DOCUMENT) {
                    tracing::debug!(url = %request.url, "offline navigation, serving shell");
                    return FetchOutcome::ShellFallback(shell);
                }
            }
            FetchOutcome::Failed(e)
        }
    }
}
