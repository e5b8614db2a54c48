//! Client leg of the bootstrap handshake.
//!
//! Runs at most once in a process lifetime, before the server starts
//! taking requests: a node holding an unconsumed bootstrap record
//! adopts the identity its parent minted, mines a proof and trades
//! the pending token for an access token. Failure here is fatal by
//! design; a node that was told to join a cluster and cannot is
//! better off dead than silently running as a root.

use {
  super::{client::PeerClient, Error},
  crate::ledger::{self, Bootstrap, Ledger, Membership},
  tracing::info,
};

pub async fn join(
  client: &PeerClient,
  ledger: &mut Ledger<Membership>,
  record: &Bootstrap,
) -> Result<(), Error> {
  info!("bootstrapping towards {}", record.issuer_host);

  // signature and expiry sanity check before we rewrite our own
  // identity around this record
  ledger
    .registry
    .inspect(&record.token)
    .map_err(ledger::Error::from)?;

  ledger.adopt_identity(record)?;

  let proof = ledger.proof_of_work()?;
  let grant = client
    .bootstrap(&record.issuer_host, &record.token, record.identifier, proof)
    .await?;

  info!("joined the cluster under {}", grant.node.host);
  ledger.complete_bootstrap(grant.access_token, grant.node);
  Ok(())
}
