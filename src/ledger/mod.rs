//! Named proof-of-work ledgers and their governance state.
//!
//! A [`Ledger`] is a chain plus everything a node needs to govern it:
//! its own identity and topology, the tokens it has issued, the
//! revocation tally of the current voting window, and the transient
//! machinery (token registry, gossip scheduler, replica predicate)
//! that is rebuilt rather than persisted.

mod mail;
mod node;

pub use {
  mail::Email,
  node::{Bootstrap, BootstrapStorage, Membership},
};

use {
  crate::{
    config::Config,
    consensus::{chain, pow, Block, BlockData},
    network::predicate::AssetPredicate,
    scheduler::Scheduler,
    tokens::{self, TokenRegistry},
    topology::{self, Node},
  },
  serde::{Deserialize, Serialize},
  std::mem,
  thiserror::Error,
  tracing::{debug, info},
};

/// Scheduler key pacing gossip spread rounds.
pub const SPREAD_GATE: &str = "spread";
/// Scheduler key pacing neighbour validation rounds.
pub const VALIDATE_GATE: &str = "validate";

#[derive(Debug, Error)]
pub enum Error {
  #[error("the provided proof of work is not valid: {0}")]
  InvalidProof(u64),

  #[error("the email address {0} is already registered")]
  DuplicateEmail(String),

  #[error("a node with this host is already registered in the chain")]
  NodeExists,

  #[error("the token is not valid for this operation")]
  InvalidToken,

  #[error(transparent)]
  Token(#[from] tokens::Error),

  #[error(transparent)]
  Topology(#[from] topology::Error),

  #[error("block serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub struct Ledger<D: BlockData> {
  pub name: String,
  pub node: Node,
  pub config: Config,

  /// Pending entries, captured and cleared by the next block.
  pub transactions: Vec<D>,
  pub chain: Vec<Block<D>>,

  /// Renewal tokens issued to registered children. Possession of one
  /// of these is what `is_valid_token` certifies.
  pub tokens: Vec<String>,

  /// Tokens minted by `append_node` and not yet redeemed through
  /// `register_child`.
  pub pending_tokens: Vec<String>,

  /// Revocation tally of the current voting window; one entry per
  /// vote, cleared when the quorum is applied.
  pub revokeds: Vec<Node>,

  /// Granted by our parent when we bootstrapped into the cluster.
  pub access_token: Option<String>,

  pub registry: TokenRegistry,
  pub scheduler: Scheduler,
  pub predicate: AssetPredicate,
}

impl<D: BlockData> Ledger<D> {
  /// Creates a fresh ledger starting at the genesis block.
  pub fn new(
    name: impl Into<String>,
    node: Node,
    mut registry: TokenRegistry,
    config: Config,
  ) -> Self {
    registry.set_issuer(node.identifier.to_string());

    let name = name.into();
    info!("creating {name} ledger for {}", node.host);

    let mut ledger = Self {
      name,
      predicate: AssetPredicate::new(&node.host),
      node,
      transactions: vec![],
      chain: vec![Block::genesis()],
      tokens: vec![],
      pending_tokens: vec![],
      revokeds: vec![],
      access_token: None,
      registry,
      scheduler: Scheduler::new(),
      config,
    };
    ledger.configure_gates();
    ledger
  }

  fn configure_gates(&mut self) {
    self
      .scheduler
      .configure(SPREAD_GATE, self.config.spreading_time);
    self
      .scheduler
      .configure(VALIDATE_GATE, self.config.validation_time);
  }

  pub fn last_block(&self) -> &Block<D> {
    self
      .chain
      .last()
      .expect("a ledger chain holds at least the genesis block")
  }

  /// Whether this node has completed the bootstrap handshake with a
  /// parent. Root nodes never do and never need to.
  pub fn is_bootstrapped(&self) -> bool {
    self.access_token.is_some()
  }

  /// Appends a block carrying the pending transactions and clears
  /// the buffer. Callers enforce proof-of-work at their entry
  /// points; this is pure chain growth.
  pub fn new_block(
    &mut self,
    proof: u64,
    previous_hash: Option<String>,
    timestamp: Option<u64>,
  ) -> Result<&Block<D>, Error> {
    let previous_hash = match previous_hash {
      Some(hash) => hash,
      None => self.last_block().digest()?,
    };

    let block = Block {
      index: self.last_block().index + 1,
      timestamp: timestamp.unwrap_or_else(now),
      transactions: mem::take(&mut self.transactions),
      proof,
      previous_hash,
    };

    debug!("{}: appending block {}", self.name, block.index);
    self.chain.push(block);
    Ok(self.last_block())
  }

  /// Queues a transaction for the next block and returns the index
  /// of the block that will carry it.
  pub fn new_transaction(&mut self, content: D) -> u64 {
    self.transactions.push(content);
    self.last_block().index + 1
  }

  /// Validates a proof against the current chain head, the gate
  /// every chain-growing entry point passes first.
  pub fn check_proof(&self, proof: u64) -> Result<(), Error> {
    let last = self.last_block();
    let last_hash = last.digest()?;

    if !pow::valid_proof(last.proof, proof, &last_hash, self.config.difficulty)
    {
      return Err(Error::InvalidProof(proof));
    }
    Ok(())
  }

  /// Mines a proof against the current chain head.
  pub fn proof_of_work(&self) -> Result<u64, Error> {
    Ok(pow::proof_of_work(self.last_block(), self.config.difficulty)?)
  }

  pub fn valid_chain(&self, chain: &[Block<D>]) -> bool {
    chain::valid_chain(chain, self.config.difficulty)
  }

  /// Longest-chain rule: replaces the local chain iff the remote one
  /// is strictly longer and valid. All-or-nothing.
  pub fn accept_chain(&mut self, remote: Vec<Block<D>>) -> bool {
    if remote.len() <= self.chain.len() {
      return false;
    }
    if !self.valid_chain(&remote) {
      debug!("{}: rejected an invalid remote chain", self.name);
      return false;
    }

    info!(
      "{}: replacing chain of length {} with remote of length {}",
      self.name,
      self.chain.len(),
      remote.len()
    );
    self.chain = remote;
    true
  }

  /// The persisted form of this ledger; transients are dropped by
  /// construction and rebuilt in [`from_document`](Self::from_document).
  pub fn to_document(&self) -> Document<D> {
    Document {
      name: self.name.clone(),
      node: self.node.clone(),
      chain: self.chain.clone(),
      transactions: self.transactions.clone(),
      tokens: self.tokens.clone(),
      pending_tokens: self.pending_tokens.clone(),
      revokeds: self.revokeds.clone(),
      access_token: self.access_token.clone(),
      config: self.config.clone(),
    }
  }

  pub fn from_document(
    document: Document<D>,
    mut registry: TokenRegistry,
  ) -> Self {
    registry.set_issuer(document.node.identifier.to_string());

    let mut ledger = Self {
      predicate: AssetPredicate::new(&document.node.host),
      name: document.name,
      node: document.node,
      transactions: document.transactions,
      chain: document.chain,
      tokens: document.tokens,
      pending_tokens: document.pending_tokens,
      revokeds: document.revokeds,
      access_token: document.access_token,
      registry,
      scheduler: Scheduler::new(),
      config: document.config,
    };
    ledger.configure_gates();
    ledger
  }
}

/// The structured document a ledger is serialized as. Token registry,
/// scheduler and predicate are transient and intentionally absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "D: Serialize, for<'a> D: Deserialize<'a>")]
pub struct Document<D: BlockData> {
  pub name: String,
  pub node: Node,
  pub chain: Vec<Block<D>>,
  #[serde(default)]
  pub transactions: Vec<D>,
  #[serde(default)]
  pub tokens: Vec<String>,
  #[serde(default)]
  pub pending_tokens: Vec<String>,
  #[serde(default)]
  pub revokeds: Vec<Node>,
  #[serde(default)]
  pub access_token: Option<String>,
  #[serde(default)]
  pub config: Config,
}

fn now() -> u64 {
  chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
pub(crate) mod tests {
  use {
    super::{Document, Ledger},
    crate::{
      config::Config,
      consensus::Block,
      tokens::TokenRegistry,
      topology::Node,
    },
  };

  pub(crate) fn mail_ledger(difficulty: usize) -> Ledger<String> {
    let config = Config {
      difficulty,
      ..Config::default()
    };
    Ledger::new(
      "mail",
      Node::new("https://gate.example.com:5000").unwrap(),
      TokenRegistry::new("secret", "unassigned"),
      config,
    )
  }

  fn grow(ledger: &mut Ledger<String>, email: &str) {
    let proof = ledger.proof_of_work().unwrap();
    let last_hash = ledger.last_block().digest().unwrap();
    ledger.new_transaction(email.to_owned());
    ledger.new_block(proof, Some(last_hash), None).unwrap();
  }

  #[test]
  fn fresh_ledger_starts_at_genesis() {
    let ledger = mail_ledger(1);
    assert_eq!(ledger.chain.len(), 1);
    assert_eq!(*ledger.last_block(), Block::genesis());
    assert!(ledger.transactions.is_empty());
  }

  #[test]
  fn registry_issuer_follows_the_node_identity() {
    let ledger = mail_ledger(1);
    assert_eq!(
      ledger.registry.issuer(),
      ledger.node.identifier.to_string()
    );
  }

  #[test]
  fn transactions_ride_the_next_block_exactly_once() {
    let mut ledger = mail_ledger(1);

    let carrier = ledger.new_transaction("alice@example.com".to_owned());
    assert_eq!(carrier, 2);
    assert_eq!(ledger.transactions.len(), 1);

    let proof = ledger.proof_of_work().unwrap();
    let block = ledger.new_block(proof, None, None).unwrap();
    assert_eq!(block.index, carrier);
    assert_eq!(block.transactions, vec!["alice@example.com".to_owned()]);

    assert!(ledger.transactions.is_empty());
    let proof = ledger.proof_of_work().unwrap();
    let empty = ledger.new_block(proof, None, None).unwrap();
    assert!(empty.transactions.is_empty());
  }

  #[test]
  fn the_chain_stays_valid_as_it_grows() {
    let mut ledger = mail_ledger(1);
    grow(&mut ledger, "alice@example.com");
    grow(&mut ledger, "bob@example.com");
    assert!(ledger.valid_chain(&ledger.chain));
  }

  #[test]
  fn check_proof_rejects_wrong_values() {
    let ledger = mail_ledger(1);
    let mined = ledger.proof_of_work().unwrap();
    assert!(ledger.check_proof(mined).is_ok());

    let bad = (0..)
      .find(|candidate| ledger.check_proof(*candidate).is_err())
      .unwrap();
    assert!(ledger.check_proof(bad).is_err());
  }

  #[test]
  fn longer_valid_chains_replace_shorter_ones() {
    let mut short = mail_ledger(1);
    grow(&mut short, "alice@example.com");

    let mut long = mail_ledger(1);
    grow(&mut long, "alice@example.com");
    grow(&mut long, "bob@example.com");

    assert!(short.accept_chain(long.chain.clone()));
    assert_eq!(short.chain, long.chain);

    // the inverse call sees an equal-length chain and refuses
    assert!(!long.accept_chain(short.chain.clone()));
  }

  #[test]
  fn equal_length_chains_never_replace() {
    let mut a = mail_ledger(1);
    grow(&mut a, "alice@example.com");
    let mut b = mail_ledger(1);
    grow(&mut b, "bob@example.com");

    let before = a.chain.clone();
    assert!(!a.accept_chain(b.chain.clone()));
    assert_eq!(a.chain, before);
  }

  #[test]
  fn invalid_chains_never_replace_no_matter_how_long() {
    let mut ledger = mail_ledger(1);

    let mut forged = ledger.chain.clone();
    for index in 2..6 {
      forged.push(Block {
        index,
        timestamp: 2,
        transactions: vec![format!("forged-{index}@example.com")],
        proof: 0,
        previous_hash: "bogus".to_owned(),
      });
    }

    let before = ledger.chain.clone();
    assert!(!ledger.accept_chain(forged));
    assert_eq!(ledger.chain, before);
  }

  #[test]
  fn documents_round_trip_and_rebuild_transients() {
    let mut ledger = mail_ledger(2);
    grow(&mut ledger, "alice@example.com");
    ledger.tokens.push("issued".to_owned());
    ledger.pending_tokens.push("pending".to_owned());
    ledger.access_token = Some("granted".to_owned());

    let json = serde_json::to_string(&ledger.to_document()).unwrap();
    let document: Document<String> = serde_json::from_str(&json).unwrap();
    let restored = Ledger::from_document(
      document,
      TokenRegistry::new("secret", "unassigned"),
    );

    assert_eq!(restored.name, ledger.name);
    assert_eq!(restored.chain, ledger.chain);
    assert_eq!(restored.tokens, ledger.tokens);
    assert_eq!(restored.pending_tokens, ledger.pending_tokens);
    assert_eq!(restored.node, ledger.node);
    assert_eq!(restored.config, ledger.config);
    assert_eq!(restored.access_token, ledger.access_token);
    assert_eq!(
      restored.registry.issuer(),
      ledger.node.identifier.to_string()
    );
  }
}
