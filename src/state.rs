//! Process-wide shared state.
//!
//! The two ledgers and their storages live for the lifetime of the
//! process and are injected into request handlers as one explicitly
//! constructed value. Each ledger sits behind its own lock; the mail
//! and node ledgers are independent and no operation takes both
//! locks at once. Peer HTTP traffic is always issued with both locks
//! released.

use {
  crate::{
    ledger::{Document, Email, Ledger, Membership},
    network::{PeerAuth, PeerClient},
    storage::Storage,
  },
  parking_lot::RwLock,
  tracing::error,
};

pub struct AppState {
  pub mail: RwLock<Ledger<Email>>,
  pub node: RwLock<Ledger<Membership>>,
  pub mail_store: Storage<Document<Email>>,
  pub node_store: Storage<Document<Membership>>,
  pub client: PeerClient,
}

impl AppState {
  /// Snapshots and persists the mail ledger. Persistence failures
  /// are logged, never propagated: a full disk must not take the
  /// consensus down with it.
  pub fn save_mail(&self) {
    let document = self.mail.read().to_document();
    if let Err(error) = self.mail_store.save(&document) {
      error!("failed to persist the mail ledger: {error}");
    }
  }

  pub fn save_node(&self) {
    let document = self.node.read().to_document();
    if let Err(error) = self.node_store.save(&document) {
      error!("failed to persist the node ledger: {error}");
    }
  }

  /// Parent host plus credentials for node-personal calls towards
  /// it. `None` for a root or not-yet-bootstrapped node, which is
  /// exactly the set of nodes that must not exchange chains.
  pub fn node_auth(&self) -> Option<(String, PeerAuth)> {
    let node = self.node.read();
    let parent = node.node.parent.as_ref()?;
    let token = node.access_token.clone()?;

    Some((parent.host.clone(), PeerAuth {
      token,
      identifier: node.node.identifier,
    }))
  }

  /// Credentials for outgoing calls that happen regardless of our
  /// place in the tree, like revocation broadcasts to children.
  pub fn outgoing_auth(&self) -> PeerAuth {
    let node = self.node.read();
    PeerAuth {
      token: node.access_token.clone().unwrap_or_default(),
      identifier: node.node.identifier,
    }
  }
}
