use {
  serde::{Deserialize, Serialize},
  std::time::Duration,
};

/// Chain configuration shared by both ledgers.
///
/// Every key has a default, so a partial configuration file only
/// overrides what it names. Durations are human-readable in their
/// serialized form (`"30s"`, `"2h"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Number of trailing zero hex digits required of a proof-of-work
  /// hash. Static; there is no retargeting.
  pub difficulty: usize,

  /// Minimum interval between two neighbour validation rounds.
  #[serde(with = "humantime_serde")]
  pub validation_time: Duration,

  /// Minimum interval between two gossip spread rounds.
  #[serde(with = "humantime_serde")]
  pub spreading_time: Duration,

  /// Lifetime of a pending token minted for a node that has not yet
  /// completed its bootstrap.
  #[serde(with = "humantime_serde")]
  pub token_pending_time: Duration,

  /// Lifetime of the renewal token issued to a registered child.
  #[serde(with = "humantime_serde")]
  pub token_renew_time: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      difficulty: 4,
      validation_time: Duration::from_secs(30),
      spreading_time: Duration::from_secs(60),
      token_pending_time: Duration::from_secs(120),
      token_renew_time: Duration::from_secs(7200),
    }
  }
}
