use {
  serde::{de::DeserializeOwned, Deserialize, Serialize},
  sha2::{Digest, Sha256},
  std::fmt::Debug,
};

/// Marker trait for the payload type carried by blocks.
///
/// The consensus layer is agnostic to what a transaction is;
/// the mail ledger stores plain email addresses and the node
/// ledger stores membership records. Anything that is cloneable,
/// comparable and serializable qualifies.
pub trait BlockData:
  Clone + Eq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> BlockData for T where
  T: Clone + Eq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A single link in a proof-of-work chain.
///
/// The field set is closed: unknown keys are rejected during
/// deserialization, otherwise a peer could smuggle extra fields
/// into a block and produce two valid serialized forms with
/// different hashes for the same logical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
  bound = "D: Serialize, for<'a> D: Deserialize<'a>",
  deny_unknown_fields
)]
pub struct Block<D>
where
  D: BlockData,
{
  /// 1-based position of this block in the chain.
  pub index: u64,

  /// Seconds since the unix epoch at block creation time.
  /// The genesis block uses the sentinel value 1.
  pub timestamp: u64,

  /// Entries captured from the pending buffer when the
  /// block was created.
  pub transactions: Vec<D>,

  /// The value satisfying the proof-of-work predicate against
  /// the previous block.
  pub proof: u64,

  /// Hex SHA-256 of the previous block's canonical JSON, or
  /// the literal "1" for genesis.
  pub previous_hash: String,
}

impl<D: BlockData> Block<D> {
  /// The first block of every chain. Identical content across
  /// all nodes and across both ledgers, which is what makes two
  /// freshly created nodes agree on a common ancestor.
  pub fn genesis() -> Self {
    Self {
      index: 1,
      timestamp: 1,
      transactions: vec![],
      proof: 100,
      previous_hash: "1".to_owned(),
    }
  }

  /// Hex SHA-256 digest of this block's canonical JSON form.
  ///
  /// Canonical means object keys sorted lexicographically at
  /// every nesting level, which `serde_json::Value` guarantees
  /// through its ordered map representation. Two equal blocks
  /// always produce the same digest regardless of the key order
  /// of whatever source document they were parsed from.
  pub fn digest(&self) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(self)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
  }
}
