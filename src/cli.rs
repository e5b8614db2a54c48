use {
  crate::config::Config,
  clap::{Parser, Subcommand},
  std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
  },
};

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  #[clap(subcommand)]
  pub command: Option<Command>,

  #[clap(
    long,
    env = "SECRET_KEY",
    hide_env_values = true,
    help = "shared secret used to sign and verify cluster tokens"
  )]
  pub secret: String,

  #[clap(
    long,
    help = "public URL this node is reachable at, defaults to the listen \
            address"
  )]
  pub host: Option<String>,

  #[clap(long, help = "listen address of the node", default_value = "0.0.0.0")]
  pub addr: IpAddr,

  #[clap(long, help = "listen port of the node", default_value = "5000")]
  pub port: u16,

  #[clap(
    long,
    parse(from_os_str),
    default_value = "data",
    help = "directory holding the serialized ledgers"
  )]
  pub data_dir: PathBuf,

  #[clap(
    long,
    parse(from_os_str),
    help = "path to a bootstrap record minted by a parent node"
  )]
  pub bootstrap: Option<PathBuf>,

  #[clap(
    long,
    parse(from_os_str),
    help = "path to the chain configuration file"
  )]
  pub config: Option<PathBuf>,

  #[clap(
    long,
    help = "treat this host as secure even over plain HTTP, allowing it to \
            take on children"
  )]
  pub trust_host: bool,

  #[clap(
    short,
    long,
    parse(from_occurrences),
    help = "Use verbose output (-vv very verbose output)"
  )]
  pub verbose: u64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Mint a bootstrap record for a new child node.
  #[clap(name = "gen:bootstrap")]
  GenBootstrap {
    /// Proof of work mined against the node chain head.
    proof: u64,

    /// Address the new node will serve from.
    address: String,

    #[clap(long, parse(from_os_str), default_value = "myboot.json")]
    dest_file: PathBuf,
  },

  /// Mine a proof of work against the node chain head and print it.
  #[clap(name = "node:pow")]
  NodePow,
}

impl CliOpts {
  pub fn listen_addr(&self) -> SocketAddr {
    SocketAddr::new(self.addr, self.port)
  }

  /// The address peers and registrants reach this node at. Unless
  /// configured explicitly it is derived from the listen address,
  /// which only makes sense on a flat network.
  pub fn public_host(&self) -> String {
    match &self.host {
      Some(host) => host.clone(),
      None => format!("http://{}:{}", self.addr, self.port),
    }
  }

  /// Retrieves the chain configuration from its JSON serialized
  /// form, falling back to the defaults when no file is given.
  pub fn chain_config(&self) -> Result<Config, std::io::Error> {
    match &self.config {
      None => Ok(Config::default()),
      Some(path) => {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::from)
      }
    }
  }

  pub fn mail_chain_path(&self) -> PathBuf {
    self.data_dir.join("mail.json")
  }

  pub fn node_chain_path(&self) -> PathBuf {
    self.data_dir.join("node.json")
  }
}
