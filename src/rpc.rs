//! The HTTP surface.
//!
//! Public routes: the landing data, the registration entry point and
//! the bootstrap handshake. Everything else is node-personal: callers
//! authenticate with a bearer token we issued plus the identifier
//! they claim, checked against the node ledger's active token set.

use {
  crate::{
    consensus::Block,
    ledger::{Email, Error as LedgerError, Membership},
    network::{client::NODE_ID_HEADER, gossip, predicate::collect_digests},
    state::AppState,
    topology::{parse_host, Node},
  },
  axum::{
    extract::{Extension, Form, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
  },
  axum_extra::response::ErasedJson,
  serde::Deserialize,
  serde_json::json,
  std::{collections::HashMap, sync::Arc},
  tracing::debug,
  uuid::Uuid,
};

pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/", get(serve_home))
    .route("/register", post(serve_register))
    .route("/:name/chain", get(serve_chain).put(replace_chain))
    .route("/node", get(serve_node).delete(delete_nodes))
    .route("/bootstrap", post(serve_bootstrap))
    .layer(Extension(state))
}

/// Checks the node-personal credential pair and returns the caller's
/// identifier.
fn authorize(
  state: &AppState,
  headers: &HeaderMap,
) -> Result<Uuid, StatusCode> {
  let token = headers
    .get(header::AUTHORIZATION)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.strip_prefix("Bearer "))
    .ok_or(StatusCode::UNAUTHORIZED)?;

  let identifier = headers
    .get(NODE_ID_HEADER)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| Uuid::parse_str(value).ok())
    .ok_or(StatusCode::UNAUTHORIZED)?;

  if state.node.read().is_valid_token(token, &identifier) {
    Ok(identifier)
  } else {
    Err(StatusCode::UNAUTHORIZED)
  }
}

/// The landing data a miner needs: the head of the mail chain. Full
/// form rendering lives in the HTML layer; replicas fetch this page
/// with `no_token=true`, which also skips the expensive gossip
/// round.
async fn serve_home(
  Query(params): Query<HashMap<String, String>>,
  Extension(state): Extension<Arc<AppState>>,
) -> Response {
  let no_token = params
    .get("no_token")
    .map(|value| value.eq_ignore_ascii_case("true"))
    .unwrap_or(false);

  if no_token {
    gossip::exchange_chains(&state).await;
  } else {
    gossip::resolve_conflicts(&state).await;
  }

  let (last_proof, last_hash) = {
    let mail = state.mail.read();
    let last = mail.last_block();
    match last.digest() {
      Ok(hash) => (last.proof, hash),
      Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
  };

  Html(format!(
    "<!doctype html>\n<html>\n<body>\n\
     <p>Mine a proof against the current head to register.</p>\n\
     <p id=\"last-proof\">{last_proof}</p>\n\
     <p id=\"last-hash\">{last_hash}</p>\n\
     </body>\n</html>\n"
  ))
  .into_response()
}

#[derive(Debug, Deserialize)]
struct RegisterForm {
  email: String,
  proof: u64,
}

async fn serve_register(
  Extension(state): Extension<Arc<AppState>>,
  Form(form): Form<RegisterForm>,
) -> Response {
  // reconcile with the cluster before touching the chain, so the
  // proof is judged against the freshest head we can get
  gossip::validate_neighbors(&state).await;
  gossip::spread_neighbors(&state).await;
  gossip::exchange_mail(&state).await;

  let result = state.mail.write().register(form.proof, &form.email);

  match result {
    Ok(index) => {
      state.save_mail();
      let replaced = gossip::exchange_mail(&state).await;
      debug!("chain was replaced after registration: {replaced}");

      Html(format!(
        "<!doctype html>\n<html>\n<body>\n\
         <p>Registration accepted in block {index}.</p>\n\
         </body>\n</html>\n"
      ))
      .into_response()
    }
    Err(error @ LedgerError::InvalidProof(_)) => (
      StatusCode::BAD_REQUEST,
      ErasedJson::pretty(json!({
        "errors": {
          "proof": [
            error.to_string(),
            "Maybe someone has mined faster than you. Try it again.",
          ]
        }
      })),
    )
      .into_response(),
    Err(error) => (
      StatusCode::BAD_REQUEST,
      ErasedJson::pretty(json!({
        "errors": { "email": [error.to_string()] }
      })),
    )
      .into_response(),
  }
}

async fn serve_chain(
  Path(name): Path<String>,
  headers: HeaderMap,
  Extension(state): Extension<Arc<AppState>>,
) -> Response {
  if let Err(status) = authorize(&state, &headers) {
    return status.into_response();
  }

  match name.as_str() {
    "mail" => {
      let mail = state.mail.read();
      ErasedJson::pretty(json!({
        "chain": &mail.chain,
        "length": mail.chain.len(),
      }))
      .into_response()
    }
    "node" => {
      let node = state.node.read();
      ErasedJson::pretty(json!({
        "chain": &node.chain,
        "length": node.chain.len(),
      }))
      .into_response()
    }
    _ => StatusCode::NOT_FOUND.into_response(),
  }
}

#[derive(Debug, Deserialize)]
struct ChainForm {
  chain: String,
}

async fn replace_chain(
  Path(name): Path<String>,
  headers: HeaderMap,
  Extension(state): Extension<Arc<AppState>>,
  Form(form): Form<ChainForm>,
) -> Response {
  if let Err(status) = authorize(&state, &headers) {
    return status.into_response();
  }

  match name.as_str() {
    "mail" => {
      let remote: Vec<Block<Email>> = match serde_json::from_str(&form.chain)
      {
        Ok(remote) => remote,
        Err(_) => return bad_chain(),
      };
      if state.mail.write().accept_chain(remote) {
        state.save_mail();
        accepted_chain()
      } else {
        bad_chain()
      }
    }
    "node" => {
      let remote: Vec<Block<Membership>> =
        match serde_json::from_str(&form.chain) {
          Ok(remote) => remote,
          Err(_) => return bad_chain(),
        };
      if state.node.write().accept_chain(remote) {
        state.save_node();
        accepted_chain()
      } else {
        bad_chain()
      }
    }
    _ => StatusCode::NOT_FOUND.into_response(),
  }
}

fn accepted_chain() -> Response {
  ErasedJson::pretty(json!({ "replaced": true })).into_response()
}

fn bad_chain() -> Response {
  (
    StatusCode::BAD_REQUEST,
    ErasedJson::pretty(json!({ "replaced": false })),
  )
    .into_response()
}

async fn serve_node(
  headers: HeaderMap,
  Extension(state): Extension<Arc<AppState>>,
) -> Response {
  if let Err(status) = authorize(&state, &headers) {
    return status.into_response();
  }

  let node = state.node.read();
  let children: Vec<Node> =
    node.node.children.values().map(Node::shallow).collect();
  let revokeds: Vec<Node> = node.revokeds.iter().map(Node::shallow).collect();

  ErasedJson::pretty(json!({
    "children": children,
    "revokeds": revokeds,
  }))
  .into_response()
}

#[derive(Debug, Deserialize)]
struct NodesForm {
  nodes: String,
}

/// A peer tells us some of our neighbours diverged from the cluster
/// baseline. We never take its word for it: every named node is
/// probed against our own predicate before it is revoked.
async fn delete_nodes(
  headers: HeaderMap,
  Extension(state): Extension<Arc<AppState>>,
  Form(form): Form<NodesForm>,
) -> Response {
  if let Err(status) = authorize(&state, &headers) {
    return status.into_response();
  }

  let hosts: Vec<String> = match serde_json::from_str(&form.nodes) {
    Ok(hosts) => hosts,
    Err(_) => {
      return (
        StatusCode::BAD_REQUEST,
        ErasedJson::pretty(json!({ "nodes": "Value is missing." })),
      )
        .into_response();
    }
  };

  let (candidates, cached, own_host) = {
    let node = state.node.read();
    let mut candidates: Vec<Node> = vec![];
    for host in hosts {
      let host = match parse_host(&host) {
        Ok(host) => host,
        Err(_) => continue,
      };
      let found = node
        .node
        .children
        .values()
        .chain(node.revokeds.iter())
        .find(|known| known.host == host);
      if let Some(found) = found {
        candidates.push(found.shallow());
      }
    }
    (candidates, node.predicate.cached(), node.predicate.host().to_owned())
  };

  if !candidates.is_empty() {
    let own = match cached {
      Some(own) => own,
      None => collect_digests(&state.client, &own_host).await,
    };

    let mut verdicts = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
      let theirs = collect_digests(&state.client, &candidate.host).await;
      verdicts.push(own.matches(&theirs));
    }

    {
      let mut node = state.node.write();
      for (candidate, genuine) in candidates.iter().zip(&verdicts) {
        node.revoke_node(candidate, *genuine, true);
      }
    }
    state.save_node();
  }

  StatusCode::CREATED.into_response()
}

#[derive(Debug, Deserialize)]
struct BootstrapForm {
  token: String,
  id: Uuid,
  proof: u64,
}

async fn serve_bootstrap(
  Extension(state): Extension<Arc<AppState>>,
  Form(form): Form<BootstrapForm>,
) -> Response {
  let result =
    state.node.write().register_child(form.proof, &form.token, form.id);

  match result {
    Ok(access_token) => {
      state.save_node();
      let own = state.node.read().node.shallow();

      (
        StatusCode::CREATED,
        ErasedJson::pretty(json!({
          "access_token": access_token,
          "self": own,
        })),
      )
        .into_response()
    }
    Err(error) => (
      StatusCode::BAD_REQUEST,
      ErasedJson::pretty(json!({ "error": error.to_string() })),
    )
      .into_response(),
  }
}
