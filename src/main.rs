mod cli;
mod config;
mod consensus;
mod ledger;
mod network;
mod rpc;
mod scheduler;
mod state;
mod storage;
mod tokens;
mod topology;

use {
  anyhow::{bail, Context},
  clap::Parser,
  cli::{CliOpts, Command},
  ledger::{BootstrapStorage, Document, Email, Ledger, Membership},
  network::PeerClient,
  parking_lot::RwLock,
  serde::{de::DeserializeOwned, Serialize},
  state::AppState,
  std::sync::Arc,
  storage::Storage,
  tokens::TokenRegistry,
  topology::Node,
  tracing::{info, warn, Level},
  tracing_subscriber::{
    filter::filter_fn,
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
    Layer,
  },
};

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn print_essentials(opts: &CliOpts, node: &Ledger<Membership>) {
  info!("Starting mailgate node");
  info!("Version: {}", env!("CARGO_PKG_VERSION"));
  info!("Listen address: {}", opts.listen_addr());
  info!("Public host: {}", node.node.host);
  info!("Node identity: {}", node.node.identifier);
  info!("Mail chain storage: {}", opts.mail_chain_path().display());
  info!("Node chain storage: {}", opts.node_chain_path().display());
  info!("Difficulty: {}", node.config.difficulty);
}

/// One unreadable ledger document starts fresh with a warning; the
/// caller aborts only when every document is unreadable.
fn load_or_warn<T: Serialize + DeserializeOwned>(
  store: &Storage<T>,
  name: &str,
) -> (Option<T>, bool) {
  match store.load() {
    Ok(document) => (document, false),
    Err(error) => {
      warn!("the {name} ledger storage is unreadable, starting fresh: {error}");
      (None, true)
    }
  }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let loglevel = match opts.verbose {
    1 => Level::DEBUG,
    2 => Level::TRACE,
    _ => Level::INFO,
  };
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_filter(filter_fn(move |metadata| metadata.level() <= &loglevel)),
    )
    .init();

  let config = opts
    .chain_config()
    .context("reading the chain configuration")?;
  let registry = TokenRegistry::new(&opts.secret, "unassigned");

  let node_store =
    Storage::<Document<Membership>>::new(opts.node_chain_path());
  let mail_store = Storage::<Document<Email>>::new(opts.mail_chain_path());

  let (node_doc, node_corrupt) = load_or_warn(&node_store, "node");
  let (mail_doc, mail_corrupt) = load_or_warn(&mail_store, "mail");
  if node_corrupt && mail_corrupt {
    bail!("both ledger storages are unreadable, refusing to start");
  }

  let mut node_ledger = match node_doc {
    Some(document) => Ledger::from_document(document, registry.clone()),
    None => {
      let node = Node::new(&opts.public_host())
        .context("the public host is not a valid address")?;
      Ledger::new("node", node, registry.clone(), config.clone())
    }
  };

  if opts.trust_host && !node_ledger.node.is_secure {
    info!("configured to skip the secure host check, use it carefully");
    info!("children can attach to this node even over plain HTTP");
    node_ledger.node.is_secure = true;
  }

  match &opts.command {
    Some(Command::GenBootstrap {
      proof,
      address,
      dest_file,
    }) => {
      let record = node_ledger.append_node(*proof, address)?;
      BootstrapStorage::new(dest_file).save(&record)?;
      node_store.save(&node_ledger.to_document())?;
      println!("Bootstrap record saved at: {}", dest_file.display());
      return Ok(());
    }
    Some(Command::NodePow) => {
      println!("{}", node_ledger.proof_of_work()?);
      return Ok(());
    }
    None => {}
  }

  let client = PeerClient::new().context("building the peer http client")?;

  // the bootstrap record is consulted exactly once; a node that
  // already joined a cluster ignores it
  if let Some(path) = &opts.bootstrap {
    if !node_ledger.is_bootstrapped() {
      let record = BootstrapStorage::new(path)
        .load()
        .context("reading the bootstrap record")?;
      match record {
        Some(record) => {
          network::bootstrap::join(&client, &mut node_ledger, &record)
            .await
            .context("bootstrap failed")?;
          node_store.save(&node_ledger.to_document())?;
        }
        None => warn!(
          "the bootstrap file {} is missing or empty, running as root",
          path.display()
        ),
      }
    }
  }

  let mut mail_ledger = match mail_doc {
    Some(document) => Ledger::from_document(document, registry),
    None => {
      Ledger::new("mail", node_ledger.node.clone(), registry, config)
    }
  };
  if mail_ledger.node.host != node_ledger.node.host {
    warn!("the mail ledger was saved under a different host, the node chain identity wins");
  }
  mail_ledger.node = node_ledger.node.clone();

  print_essentials(&opts, &node_ledger);

  node_store.save(&node_ledger.to_document())?;
  mail_store.save(&mail_ledger.to_document())?;

  let state = Arc::new(AppState {
    mail: RwLock::new(mail_ledger),
    node: RwLock::new(node_ledger),
    mail_store,
    node_store,
    client,
  });

  axum::Server::bind(&opts.listen_addr())
    .serve(rpc::router(state).into_make_service())
    .await
    .context("the http server failed")?;
  Ok(())
}
