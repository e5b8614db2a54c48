//! Peer traffic: the HTTP client, the gossip engine, the replica
//! predicate and the client leg of the bootstrap handshake.

pub mod bootstrap;
pub mod client;
pub mod gossip;
pub mod predicate;

use thiserror::Error;

pub use client::{PeerAuth, PeerClient};

#[derive(Debug, Error)]
pub enum Error {
  #[error("peer unreachable: {0}")]
  Unreachable(#[from] reqwest::Error),

  #[error("peer answered {status} at {url}")]
  UnexpectedStatus {
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("peer answer is malformed: {0}")]
  MalformedAnswer(String),

  #[error(transparent)]
  Ledger(#[from] crate::ledger::Error),
}
