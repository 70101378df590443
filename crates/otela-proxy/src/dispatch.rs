//! Identity-group dispatch: body-aware provider selection for global
//! services.
//!
//! Providers tag each advertised service with identity-group entries:
//! `key=value` (exact), `key=*` (wildcard), or `all` (catch-all). The
//! dispatcher inspects the JSON request body, scores every provider, and
//! picks uniformly at random from the most specific non-empty tier the
//! client's fallback header permits.

use http::HeaderMap;
use otela_mesh::Provider;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Client header controlling how far down the tier ladder selection may go.
pub const FALLBACK_HEADER: &str = "x-otela-fallback";

/// Upper bound on a dispatchable request body; identity inspection needs
/// the whole payload in memory.
pub const MAX_INSPECT_BYTES: usize = 8 * 1024 * 1024;

/// Match specificity, ordered: exact beats wildcard beats catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    CatchAll = 1,
    Wildcard = 2,
    Exact = 3,
}

/// Provider ids bucketed by their best match tier.
#[derive(Debug, Default, PartialEq)]
pub struct TierBuckets {
    pub exact: Vec<String>,
    pub wildcard: Vec<String>,
    pub catch_all: Vec<String>,
}

impl TierBuckets {
    /// The working tier: the most specific non-empty bucket the fallback
    /// level permits, or `None` when nothing qualifies.
    pub fn select(&self, fallback_level: u8) -> Option<&[String]> {
        if !self.exact.is_empty() {
            return Some(&self.exact);
        }
        if fallback_level >= 1 && !self.wildcard.is_empty() {
            return Some(&self.wildcard);
        }
        if fallback_level >= 2 && !self.catch_all.is_empty() {
            return Some(&self.catch_all);
        }
        None
    }

    fn push(&mut self, tier: MatchTier, id: &str) {
        let bucket = match tier {
            MatchTier::Exact => &mut self.exact,
            MatchTier::Wildcard => &mut self.wildcard,
            MatchTier::CatchAll => &mut self.catch_all,
        };
        // A provider appears at most once per tier.
        if !bucket.iter().any(|existing| existing == id) {
            bucket.push(id.to_string());
        }
    }
}

/// Parse the fallback header: absent or unparsable means 0, larger values
/// clamp to the deepest tier.
pub fn fallback_level(headers: &HeaderMap) -> u8 {
    headers
        .get(FALLBACK_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u8>().ok())
        .unwrap_or(0)
        .min(2)
}

/// Outgoing path for a dispatched forward.
pub fn service_path(service: &str, original_path: &str) -> String {
    format!("/v1/_service/{service}{original_path}")
}

/// Bucket every provider of `service` by its best identity-group match
/// against the request body.
pub fn bucket_providers(providers: &[Provider], service: &str, body: &[u8]) -> TierBuckets {
    let json: Option<Value> = serde_json::from_slice(body).ok();

    let mut buckets = TierBuckets::default();
    for provider in providers {
        for ad in provider.services.iter().filter(|s| s.name == service) {
            if let Some(tier) = score_tags(&ad.identity_group, json.as_ref()) {
                buckets.push(tier, &provider.id);
            }
        }
    }
    buckets
}

/// Best match over a tag list. An exact match ends the scan.
fn score_tags(tags: &[String], body: Option<&Value>) -> Option<MatchTier> {
    let mut best = None;
    for tag in tags {
        if tag == "all" {
            best = best.max(Some(MatchTier::CatchAll));
            continue;
        }
        let Some((key, value)) = tag.split_once('=') else {
            continue;
        };
        if value == "*" {
            if body.is_some_and(|json| key_present(json, key)) {
                best = best.max(Some(MatchTier::Wildcard));
            }
        } else if body.and_then(|json| json.get(key)).and_then(Value::as_str) == Some(value) {
            return Some(MatchTier::Exact);
        }
    }
    best
}

/// Whether `key` appears anywhere in the JSON document.
fn key_present(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(key) || map.values().any(|v| key_present(v, key))
        }
        Value::Array(items) => items.iter().any(|v| key_present(v, key)),
        _ => false,
    }
}

/// Concurrency-safe uniform provider selection. Seedable for tests.
#[derive(Clone)]
pub struct ProviderSelector {
    rng: Arc<Mutex<StdRng>>,
}

impl ProviderSelector {
    pub fn new() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn pick<'a>(&self, ids: &'a [String]) -> Option<&'a str> {
        if ids.is_empty() {
            return None;
        }
        let index = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen_range(0..ids.len());
        Some(&ids[index])
    }
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::new()
    }
}
