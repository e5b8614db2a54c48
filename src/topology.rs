//! Node identity and cluster topology.
//!
//! Every server is a [`Node`]: a stable UUID plus the public URL it
//! serves from. Nodes form a tree through bootstrap: a parent enrols
//! children, children learn of each other as siblings through gossip.
//! The parent reference is a plain lookup value, never an owning link
//! back into live state.

use {
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
  thiserror::Error,
  url::Url,
  uuid::Uuid,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("not a valid node address: {0}")]
  InvalidAddress(String),

  #[error("cannot attach children to the insecure host {0}")]
  InsecureHost(String),
}

/// Normalizes an address to `scheme://host[:port]`.
///
/// Scheme-less input is taken as plain HTTP; trailing slashes and any
/// path, query or credentials are dropped.
pub fn parse_host(address: &str) -> Result<String, Error> {
  let trimmed = address.trim().trim_end_matches('/');

  let normalized = if trimmed.contains("://") {
    normalize(trimmed)
  } else {
    normalize(&format!("http://{trimmed}"))
  };
  normalized.ok_or_else(|| Error::InvalidAddress(address.to_owned()))
}

fn normalize(address: &str) -> Option<String> {
  let url = Url::parse(address).ok()?;
  let host = url.host_str()?;

  Some(match url.port() {
    Some(port) => format!("{}://{host}:{port}", url.scheme()),
    None => format!("{}://{host}", url.scheme()),
  })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
  /// Stable across restarts; assigned at first construction or
  /// adopted from the parent's bootstrap record.
  pub identifier: Uuid,

  /// Public URL of the form `scheme://host[:port]`.
  pub host: String,

  /// Whether the host was parsed as HTTPS or is explicitly trusted.
  /// Only secure nodes may take on children.
  pub is_secure: bool,

  #[serde(default)]
  pub children: BTreeMap<Uuid, Node>,

  #[serde(default)]
  pub siblings: BTreeMap<Uuid, Node>,

  #[serde(default)]
  pub parent: Option<Box<Node>>,
}

impl Node {
  pub fn new(address: &str) -> Result<Self, Error> {
    Self::with_identifier(address, Uuid::new_v4())
  }

  pub fn with_identifier(
    address: &str,
    identifier: Uuid,
  ) -> Result<Self, Error> {
    let host = parse_host(address)?;
    let is_secure = host.starts_with("https://");

    Ok(Self {
      identifier,
      host,
      is_secure,
      children: BTreeMap::new(),
      siblings: BTreeMap::new(),
      parent: None,
    })
  }

  /// A node is root iff it has no parent.
  pub fn is_root(&self) -> bool {
    self.parent.is_none()
  }

  pub fn add_child(&mut self, child: Node) -> Result<(), Error> {
    if !self.is_secure {
      return Err(Error::InsecureHost(self.host.clone()));
    }
    self.children.insert(child.identifier, child);
    Ok(())
  }

  pub fn remove_child(&mut self, identifier: &Uuid) -> Option<Node> {
    self.children.remove(identifier)
  }

  pub fn add_sibling(&mut self, sibling: Node) {
    if sibling.identifier != self.identifier {
      self.siblings.insert(sibling.identifier, sibling);
    }
  }

  /// A copy with the topology stripped, for embedding in wire
  /// payloads and membership records.
  pub fn shallow(&self) -> Node {
    Node {
      identifier: self.identifier,
      host: self.host.clone(),
      is_secure: self.is_secure,
      children: BTreeMap::new(),
      siblings: BTreeMap::new(),
      parent: None,
    }
  }
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool {
    self.identifier == other.identifier
  }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
  use super::{parse_host, Node};

  #[test]
  fn parse_host_keeps_scheme_and_port() {
    assert_eq!(
      parse_host("https://gate.example.com:8443/").unwrap(),
      "https://gate.example.com:8443"
    );
    assert_eq!(
      parse_host("http://10.0.0.7:5001").unwrap(),
      "http://10.0.0.7:5001"
    );
  }

  #[test]
  fn parse_host_defaults_to_http() {
    assert_eq!(parse_host("10.0.0.7:5001").unwrap(), "http://10.0.0.7:5001");
    assert_eq!(parse_host("localhost:5000").unwrap(), "http://localhost:5000");
    assert_eq!(parse_host("example.com").unwrap(), "http://example.com");
  }

  #[test]
  fn parse_host_drops_path_and_slash() {
    assert_eq!(
      parse_host("http://example.com/register/").unwrap(),
      "http://example.com"
    );
  }

  #[test]
  fn parse_host_rejects_garbage() {
    assert!(parse_host("").is_err());
    assert!(parse_host("http://").is_err());
  }

  #[test]
  fn https_hosts_are_secure() {
    assert!(Node::new("https://a.example.com").unwrap().is_secure);
    assert!(!Node::new("http://b.example.com").unwrap().is_secure);
  }

  #[test]
  fn insecure_hosts_refuse_children() {
    let mut parent = Node::new("http://parent:5000").unwrap();
    let child = Node::new("http://child:5001").unwrap();
    assert!(parent.add_child(child).is_err());
  }

  #[test]
  fn children_deduplicate_by_identifier() {
    let mut parent = Node::new("https://parent:5000").unwrap();
    let child = Node::new("http://child:5001").unwrap();

    parent.add_child(child.clone()).unwrap();
    parent.add_child(child.clone()).unwrap();

    assert_eq!(parent.children.len(), 1);
    assert_eq!(parent.remove_child(&child.identifier), Some(child));
    assert!(parent.children.is_empty());
  }

  #[test]
  fn a_node_is_never_its_own_sibling() {
    let mut node = Node::new("http://gate:5000").unwrap();
    let me = node.shallow();
    let other = Node::new("http://other:5000").unwrap();

    node.add_sibling(me);
    node.add_sibling(other);

    assert_eq!(node.siblings.len(), 1);
  }

  #[test]
  fn equality_is_by_identifier() {
    let a = Node::new("http://one:5000").unwrap();
    let b = Node::with_identifier("http://two:5000", a.identifier).unwrap();
    let c = Node::new("http://one:5000").unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
  }
}
