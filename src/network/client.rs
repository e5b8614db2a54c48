//! HTTP client for peer traffic.
//!
//! All peer calls share one pooled client with a 3.5 second timeout;
//! the bootstrap call alone stretches that to 10 seconds because it
//! is authenticated, fatal on failure and happens exactly once.

use {
  super::Error,
  crate::{
    consensus::{Block, BlockData},
    topology::Node,
  },
  reqwest::{header::AUTHORIZATION, Response, StatusCode},
  serde::{Deserialize, Serialize},
  std::time::Duration,
  tracing::debug,
  uuid::Uuid,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3500);
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header naming the node an authenticated request claims to be.
pub const NODE_ID_HEADER: &str = "X-Node-Id";

/// Credentials attached to node-personal calls: the bearer token and
/// the identifier we claim to be.
#[derive(Debug, Clone)]
pub struct PeerAuth {
  pub token: String,
  pub identifier: Uuid,
}

/// The parent's answer to `GET /node`.
#[derive(Debug, Deserialize)]
pub struct NodeView {
  pub children: Vec<Node>,
  pub revokeds: Vec<Node>,
}

/// The parent's answer to a successful `POST /bootstrap`.
#[derive(Debug, Deserialize)]
pub struct JoinGrant {
  pub access_token: String,
  #[serde(rename = "self")]
  pub node: Node,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "D: for<'a> Deserialize<'a>")]
struct ChainEnvelope<D: BlockData> {
  chain: Vec<Block<D>>,
}

#[derive(Debug, Clone)]
pub struct PeerClient {
  http: reqwest::Client,
}

impl PeerClient {
  pub fn new() -> Result<Self, Error> {
    let http = reqwest::Client::builder()
      .timeout(DEFAULT_TIMEOUT)
      .build()?;
    Ok(Self { http })
  }

  /// Plain GET returning the body bytes of a 200 answer. Used by the
  /// asset predicate.
  pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
    let response = self.http.get(url).send().await?;
    accepted(response, StatusCode::OK).await
  }

  /// Fetches a peer's chain: `GET {host}/{name}/chain`.
  pub async fn fetch_chain<D: BlockData>(
    &self,
    host: &str,
    name: &str,
    auth: &PeerAuth,
  ) -> Result<Vec<Block<D>>, Error> {
    let url = format!("{host}/{name}/chain");
    debug!("exchanging chains with {url}");

    let response = self
      .http
      .get(&url)
      .header(AUTHORIZATION, format!("Bearer {}", auth.token))
      .header(NODE_ID_HEADER, auth.identifier.to_string())
      .send()
      .await?;

    let body = accepted(response, StatusCode::OK).await?;
    let envelope: ChainEnvelope<D> = serde_json::from_slice(&body)
      .map_err(|error| Error::MalformedAnswer(error.to_string()))?;
    Ok(envelope.chain)
  }

  /// Fetches a peer's neighbourhood: `GET {host}/node`.
  pub async fn fetch_node_view(
    &self,
    host: &str,
    auth: &PeerAuth,
  ) -> Result<NodeView, Error> {
    let url = format!("{host}/node");
    let response = self
      .http
      .get(&url)
      .header(AUTHORIZATION, format!("Bearer {}", auth.token))
      .header(NODE_ID_HEADER, auth.identifier.to_string())
      .send()
      .await?;

    let body = accepted(response, StatusCode::OK).await?;
    serde_json::from_slice(&body)
      .map_err(|error| Error::MalformedAnswer(error.to_string()))
  }

  /// Tells a peer to drop the given nodes: `DELETE {host}/node`.
  pub async fn delete_nodes(
    &self,
    host: &str,
    nodes: &[String],
    auth: &PeerAuth,
  ) -> Result<(), Error> {
    #[derive(Serialize)]
    struct NodesForm {
      nodes: String,
    }

    let form = NodesForm {
      nodes: serde_json::to_string(nodes)
        .map_err(|error| Error::MalformedAnswer(error.to_string()))?,
    };

    let response = self
      .http
      .delete(format!("{host}/node"))
      .header(AUTHORIZATION, format!("Bearer {}", auth.token))
      .header(NODE_ID_HEADER, auth.identifier.to_string())
      .form(&form)
      .send()
      .await?;

    accepted(response, StatusCode::CREATED).await?;
    Ok(())
  }

  /// The child's half of the bootstrap handshake:
  /// `POST {issuer_host}/bootstrap`.
  pub async fn bootstrap(
    &self,
    issuer_host: &str,
    token: &str,
    identifier: Uuid,
    proof: u64,
  ) -> Result<JoinGrant, Error> {
    #[derive(Serialize)]
    struct BootstrapForm<'a> {
      token: &'a str,
      id: Uuid,
      proof: u64,
    }

    let url = format!("{issuer_host}/bootstrap");
    let response = self
      .http
      .post(&url)
      .timeout(BOOTSTRAP_TIMEOUT)
      .form(&BootstrapForm {
        token,
        id: identifier,
        proof,
      })
      .send()
      .await?;

    let body = accepted(response, StatusCode::CREATED).await?;
    serde_json::from_slice(&body)
      .map_err(|error| Error::MalformedAnswer(error.to_string()))
  }
}

async fn accepted(
  response: Response,
  expected: StatusCode,
) -> Result<Vec<u8>, Error> {
  let url = response.url().to_string();
  let status = response.status();

  if status != expected {
    return Err(Error::UnexpectedStatus { url, status });
  }
  Ok(response.bytes().await?.to_vec())
}
