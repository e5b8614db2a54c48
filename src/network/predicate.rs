//! Neighbour authenticity predicate.
//!
//! A peer is considered a genuine replica iff it serves the same four
//! canonical assets as we do: the landing page (fetched without a
//! CSRF token) and the three mining scripts. Each asset body is
//! SHA-256'd; an unreachable or non-200 asset yields no digest at
//! all, and a missing digest matches nothing, so a dead peer always
//! fails the predicate.

use {
  super::client::PeerClient,
  sha2::{Digest, Sha256},
  tracing::debug,
};

/// Relative paths of the mining scripts, served by the HTML layer.
const ASSET_PATHS: [&str; 3] = [
  "/static/js/crypto-js/core.js",
  "/static/js/miner.js",
  "/static/js/crypto-js/sha256.js",
];

/// Digests of the four probed assets, in probe order; `None` marks a
/// failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDigests([Option<String>; 4]);

impl AssetDigests {
  /// True iff every slot on both sides holds the same real digest.
  /// A failure sentinel on either side can never match.
  pub fn matches(&self, other: &AssetDigests) -> bool {
    self
      .0
      .iter()
      .zip(other.0.iter())
      .all(|pair| matches!(pair, (Some(ours), Some(theirs)) if ours == theirs))
  }
}

/// Holds the asset digests of our own host, computed lazily and
/// cached between probes of a single validation round. The cache is
/// dropped explicitly after each round and implicitly whenever our
/// identity changes.
#[derive(Debug)]
pub struct AssetPredicate {
  host: String,
  cache: Option<AssetDigests>,
}

impl AssetPredicate {
  pub fn new(host: &str) -> Self {
    Self {
      host: host.to_owned(),
      cache: None,
    }
  }

  pub fn host(&self) -> &str {
    &self.host
  }

  pub fn set_host(&mut self, host: &str) {
    if self.host != host {
      self.host = host.to_owned();
      self.cache = None;
    }
  }

  pub fn cached(&self) -> Option<AssetDigests> {
    self.cache.clone()
  }

  pub fn store(&mut self, digests: AssetDigests) {
    self.cache = Some(digests);
  }

  pub fn clear_cache(&mut self) {
    self.cache = None;
  }
}

/// Fetches and digests the four assets of the given host. Never
/// fails; failures land in the digest set as sentinels.
pub async fn collect_digests(
  client: &PeerClient,
  host: &str,
) -> AssetDigests {
  let mut slots = [None, None, None, None];

  slots[0] = fetch_digest(client, &format!("{host}/?no_token=true")).await;
  for (slot, path) in slots[1..].iter_mut().zip(ASSET_PATHS) {
    *slot = fetch_digest(client, &format!("{host}{path}")).await;
  }

  AssetDigests(slots)
}

async fn fetch_digest(client: &PeerClient, url: &str) -> Option<String> {
  match client.get_bytes(url).await {
    Ok(body) => Some(hex::encode(Sha256::digest(&body))),
    Err(error) => {
      debug!("asset probe failed for {url}: {error}");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{AssetDigests, AssetPredicate};

  fn digests(values: [Option<&str>; 4]) -> AssetDigests {
    AssetDigests(values.map(|value| value.map(str::to_owned)))
  }

  #[test]
  fn equal_digests_match() {
    let ours = digests([Some("a"), Some("b"), Some("c"), Some("d")]);
    let theirs = digests([Some("a"), Some("b"), Some("c"), Some("d")]);
    assert!(ours.matches(&theirs));
  }

  #[test]
  fn a_single_differing_asset_fails() {
    let ours = digests([Some("a"), Some("b"), Some("c"), Some("d")]);
    let theirs = digests([Some("a"), Some("b"), Some("x"), Some("d")]);
    assert!(!ours.matches(&theirs));
  }

  #[test]
  fn the_failure_sentinel_matches_nothing() {
    let ours = digests([Some("a"), Some("b"), Some("c"), Some("d")]);
    let unreachable = digests([Some("a"), Some("b"), None, Some("d")]);

    assert!(!ours.matches(&unreachable));
    // not even another failure; two dead peers are not replicas
    assert!(!unreachable.matches(&unreachable.clone()));
  }

  #[test]
  fn changing_the_host_drops_the_cache() {
    let mut predicate = AssetPredicate::new("http://gate:5000");
    predicate.store(digests([Some("a"), None, None, None]));
    assert!(predicate.cached().is_some());

    predicate.set_host("http://gate:5000");
    assert!(predicate.cached().is_some());

    predicate.set_host("http://elsewhere:5000");
    assert!(predicate.cached().is_none());
  }

  #[test]
  fn clear_cache_drops_the_cache() {
    let mut predicate = AssetPredicate::new("http://gate:5000");
    predicate.store(digests([Some("a"), None, None, None]));
    predicate.clear_cache();
    assert!(predicate.cached().is_none());
  }
}
