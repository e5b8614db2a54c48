//! The node ledger: cluster membership changes.
//!
//! Enrolment is a two-step handshake. A parent mints a short-lived
//! pending token bound to the new node's identifier and host
//! (`append_node`), and hands it out as a bootstrap record. The new
//! node presents the token back together with a freshly mined proof
//! (`register_child`); success appends a membership transaction to
//! the chain and trades the pending token for a long-lived renewal
//! token. Misbehaving children are voted out through the revocation
//! tally.

use {
  super::{Error, Ledger},
  crate::{storage::Storage, topology::Node},
  serde::{Deserialize, Serialize},
  sha2::{Digest, Sha256},
  std::mem,
  tracing::{debug, info, warn},
  uuid::Uuid,
};

/// A membership change carried by the node chain. The host is stored
/// as a digest so that the chain itself never leaks addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  /// Identifier of the issuing node.
  pub snd: Uuid,
  /// Identifier of the enrolled node.
  pub dst: Uuid,
  /// Hex SHA-256 of the enrolled node's host.
  pub hsh: String,
}

/// The record a parent produces for a child to present on first
/// contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
  pub issuer_host: String,
  pub host: String,
  pub identifier: Uuid,
  pub token: String,
}

pub type BootstrapStorage = Storage<Bootstrap>;

pub fn host_digest(host: &str) -> String {
  hex::encode(Sha256::digest(host.as_bytes()))
}

impl Ledger<Membership> {
  /// Mints a bootstrap record for a prospective child node.
  ///
  /// Nothing is chained yet; the membership transaction appears only
  /// once the child completes [`register_child`]. Until then the
  /// pending token is the sole trace, and it expires on its own.
  pub fn append_node(
    &mut self,
    proof: u64,
    address: &str,
  ) -> Result<Bootstrap, Error> {
    self.check_proof(proof)?;

    let provisional = Node::new(address)?;
    let token = self.registry.encode(
      self.config.token_pending_time.as_secs() as i64,
      Some(provisional.identifier.to_string()),
      Some(provisional.host.clone()),
    )?;
    self.pending_tokens.push(token.clone());

    info!("minted a pending token for {}", provisional.host);
    Ok(Bootstrap {
      issuer_host: self.node.host.clone(),
      host: provisional.host,
      identifier: provisional.identifier,
      token,
    })
  }

  /// Completes a child's enrolment: verifies the proof and the
  /// pending token, chains the membership transaction, and returns
  /// the renewal token the child will authenticate with from now on.
  pub fn register_child(
    &mut self,
    proof: u64,
    token: &str,
    identifier: Uuid,
  ) -> Result<String, Error> {
    self.check_proof(proof)?;

    let claims = self
      .registry
      .decode(token, Some(&identifier.to_string()))?;

    if !self.pending_tokens.iter().any(|pending| pending == token) {
      return Err(Error::InvalidToken);
    }
    let host = claims.hst.ok_or(Error::InvalidToken)?;

    let child = Node::with_identifier(&host, identifier)?;
    if self.membership_exists(&child.host) {
      return Err(Error::NodeExists);
    }

    self.node.add_child(child.clone())?;
    self.pending_tokens.retain(|pending| pending != token);

    let renewal = self.registry.encode(
      self.config.token_renew_time.as_secs() as i64,
      None,
      None,
    )?;
    self.tokens.push(renewal.clone());

    let membership = Membership {
      snd: self.node.identifier,
      dst: child.identifier,
      hsh: host_digest(&child.host),
    };
    let last_hash = self.last_block().digest()?;
    self.new_transaction(membership);
    self.new_block(proof, Some(last_hash), None)?;

    info!("registered child {} at {}", child.identifier, child.host);
    Ok(renewal)
  }

  /// Whether a membership transaction for this host is already
  /// chained.
  pub fn membership_exists(&self, host: &str) -> bool {
    let digest = host_digest(host);
    self
      .chain
      .iter()
      .any(|block| block.transactions.iter().any(|entry| entry.hsh == digest))
  }

  /// Whether the presented token is an active credential for the
  /// claimed identifier.
  pub fn is_valid_token(&self, token: &str, identifier: &Uuid) -> bool {
    self
      .registry
      .decode(token, Some(&identifier.to_string()))
      .is_ok()
      && self.tokens.iter().any(|active| active == token)
  }

  /// Votes a peer out of the neighbourhood.
  ///
  /// Only nodes we know of (current children or already-tallied
  /// peers) are considered at all, and only a genuine removal from
  /// the children set counts as a successful revocation; that is
  /// what keeps the operation idempotent. `genuine` is the replica
  /// predicate's verdict for this peer, computed by the caller
  /// outside the ledger lock.
  pub fn revoke_node(
    &mut self,
    target: &Node,
    genuine: bool,
    clear: bool,
  ) -> bool {
    let known = self.node.children.contains_key(&target.identifier)
      || self
        .revokeds
        .iter()
        .any(|tallied| tallied.identifier == target.identifier);

    let mut revoked = false;
    if known && !genuine {
      if let Some(evicted) = self.node.remove_child(&target.identifier) {
        info!("node revoked: {}", evicted.host);
        self.revokeds.push(evicted.shallow());
        revoked = true;
      }
    }

    if clear {
      self.predicate.clear_cache();
    }
    revoked
  }

  /// Settles the current voting window.
  ///
  /// The electorate is this node plus every peer under vote, whether
  /// still a child or already removed by a local revocation; the
  /// quorum is its majority. Peers short of quorum are re-admitted
  /// as children, the rest stay out. The tally is cleared either
  /// way.
  pub fn apply_revocation_quorum(&mut self) {
    if self.revokeds.is_empty() {
      return;
    }

    let tally = mem::take(&mut self.revokeds);
    let mut candidates: Vec<(Node, usize)> = vec![];
    for node in tally {
      match candidates
        .iter_mut()
        .find(|(candidate, _)| candidate.identifier == node.identifier)
      {
        Some((_, votes)) => *votes += 1,
        None => candidates.push((node, 1)),
      }
    }

    let outside = candidates
      .iter()
      .filter(|(candidate, _)| {
        !self.node.children.contains_key(&candidate.identifier)
      })
      .count();
    let electorate = self.node.children.len() + outside;
    let quorum = (electorate + 2) / 2;

    for (candidate, votes) in candidates {
      if votes < quorum {
        debug!(
          "re-admitting {} with {votes} votes below quorum {quorum}",
          candidate.host
        );
        if let Err(error) = self.node.add_child(candidate.shallow()) {
          warn!("cannot re-admit a voted peer: {error}");
        }
      } else {
        info!("node evicted by quorum: {}", candidate.host);
        self.node.remove_child(&candidate.identifier);
      }
    }
  }

  /// Adopts the identity a parent minted for us. Called once, before
  /// the bootstrap call; the registry and the predicate follow the
  /// new identity.
  pub fn adopt_identity(&mut self, record: &Bootstrap) -> Result<(), Error> {
    let trusted = self.node.is_secure;
    self.node = Node::with_identifier(&record.host, record.identifier)?;
    self.node.is_secure |= trusted;
    self.registry.set_issuer(record.identifier.to_string());
    self.predicate.set_host(&record.host);
    Ok(())
  }

  /// Records a successful bootstrap: the parent's grant and our
  /// place under it.
  pub fn complete_bootstrap(&mut self, access_token: String, parent: Node) {
    self.access_token = Some(access_token);
    self.node.parent = Some(Box::new(parent.shallow()));
  }
}
