//! The gossip engine: neighbour validation, spread and chain
//! exchange.
//!
//! Each sub-operation is gated by the ledger's scheduler, so however
//! often request handlers trigger it, a round runs at most once per
//! configured interval. The lock discipline is uniform: snapshot the
//! relevant collections under the node-ledger lock, release it for
//! all peer HTTP traffic, re-acquire to apply the deltas. Peer
//! failures are absorbed here; nothing in a gossip round is allowed
//! to take a request handler down.

use {
  super::predicate::collect_digests,
  crate::{
    ledger::{Email, Membership, SPREAD_GATE, VALIDATE_GATE},
    state::AppState,
    topology::Node,
  },
  tracing::{debug, info, warn},
};

/// Runs the three gossip sub-operations in their canonical order:
/// validate, spread, exchange.
pub async fn resolve_conflicts(state: &AppState) {
  validate_neighbors(state).await;
  spread_neighbors(state).await;
  exchange_chains(state).await;
}

/// Probes every child against the replica predicate, revokes the
/// divergent ones and tells the remaining children to do the same.
pub async fn validate_neighbors(state: &AppState) {
  let (children, cached, own_host) = {
    let mut node = state.node.write();
    if !node.scheduler.check(VALIDATE_GATE) {
      return;
    }
    let children: Vec<Node> =
      node.node.children.values().map(Node::shallow).collect();
    (children, node.predicate.cached(), node.predicate.host().to_owned())
  };

  if children.is_empty() {
    return;
  }

  let own = match cached {
    Some(own) => own,
    None => collect_digests(&state.client, &own_host).await,
  };

  let mut verdicts = Vec::with_capacity(children.len());
  for child in &children {
    let theirs = collect_digests(&state.client, &child.host).await;
    verdicts.push(own.matches(&theirs));
  }

  let invalids: Vec<Node> = {
    let mut node = state.node.write();
    node.predicate.store(own);

    let mut invalids = vec![];
    for (child, genuine) in children.iter().zip(&verdicts) {
      if node.revoke_node(child, *genuine, false) {
        invalids.push(child.clone());
      }
    }
    node.predicate.clear_cache();
    invalids
  };

  if invalids.is_empty() {
    return;
  }
  info!("neighbour validation revoked {} node(s)", invalids.len());

  let remaining: Vec<String> = {
    let node = state.node.read();
    node.node.children.values().map(|child| child.host.clone()).collect()
  };
  let invalid_hosts: Vec<String> =
    invalids.iter().map(|node| node.host.clone()).collect();

  let auth = state.outgoing_auth();
  for host in remaining {
    if let Err(error) =
      state.client.delete_nodes(&host, &invalid_hosts, &auth).await
    {
      warn!("failed to broadcast revocations to {host}: {error}");
    }
  }

  state.save_node();
}

/// Polls the parent's neighbourhood, merging its children into our
/// sibling set and its revocation votes into our tally, then settles
/// the tally by quorum.
pub async fn spread_neighbors(state: &AppState) {
  {
    let mut node = state.node.write();
    if !node.scheduler.check(SPREAD_GATE) {
      return;
    }
  }

  if let Some((parent_host, auth)) = state.node_auth() {
    match state.client.fetch_node_view(&parent_host, &auth).await {
      Ok(view) => {
        debug!(
          "spread learned {} sibling(s) and {} vote(s)",
          view.children.len(),
          view.revokeds.len()
        );
        let mut node = state.node.write();
        for sibling in view.children {
          node.node.add_sibling(sibling.shallow());
        }
        for vote in view.revokeds {
          node.revokeds.push(vote.shallow());
        }
      }
      Err(error) => {
        // an unreachable peer earns one revocation vote per failed
        // poll; the quorum decides whether it stays out
        warn!("spread poll towards the parent failed: {error}");
        let mut node = state.node.write();
        let parent = node.node.parent.clone();
        if let Some(parent) = parent {
          node.revokeds.push(parent.shallow());
        }
      }
    }
  }

  state.node.write().apply_revocation_quorum();
  state.save_node();
}

/// Longest-chain exchange for both ledgers.
pub async fn exchange_chains(state: &AppState) {
  exchange_node(state).await;
  exchange_mail(state).await;
}

/// Fetches the parent's node chain and applies the longest-chain
/// rule. A no-op for root or not-yet-bootstrapped nodes.
pub async fn exchange_node(state: &AppState) -> bool {
  let (parent_host, auth) = match state.node_auth() {
    Some(credentials) => credentials,
    None => return false,
  };

  match state
    .client
    .fetch_chain::<Membership>(&parent_host, "node", &auth)
    .await
  {
    Ok(remote) => {
      let replaced = state.node.write().accept_chain(remote);
      if replaced {
        state.save_node();
      }
      replaced
    }
    Err(error) => {
      warn!("node chain exchange failed: {error}");
      false
    }
  }
}

/// Same as [`exchange_node`], for the mail chain.
pub async fn exchange_mail(state: &AppState) -> bool {
  let (parent_host, auth) = match state.node_auth() {
    Some(credentials) => credentials,
    None => return false,
  };

  match state
    .client
    .fetch_chain::<Email>(&parent_host, "mail", &auth)
    .await
  {
    Ok(remote) => {
      let replaced = state.mail.write().accept_chain(remote);
      if replaced {
        state.save_mail();
      }
      replaced
    }
    Err(error) => {
      warn!("mail chain exchange failed: {error}");
      false
    }
  }
}
