//! Chain validity.
//!
//! A chain is an ordered sequence of blocks starting at genesis. Every
//! block after the first must link to its predecessor twice: through
//! the `previous_hash` field and through the proof-of-work predicate
//! computed over the predecessor's proof and digest. The genesis block
//! is accepted as-is.

use {
  super::{pow::valid_proof, Block, BlockData},
  tracing::debug,
};

/// Verifies the hash links, proof-of-work links and index continuity
/// of the given chain. An empty chain is not a chain.
pub fn valid_chain<D: BlockData>(
  chain: &[Block<D>],
  difficulty: usize,
) -> bool {
  if chain.is_empty() {
    return false;
  }

  for (last_block, block) in chain.iter().zip(chain.iter().skip(1)) {
    let last_hash = match last_block.digest() {
      Ok(hash) => hash,
      Err(error) => {
        debug!("chain rejected, block is unhashable: {error}");
        return false;
      }
    };

    if block.index != last_block.index + 1 {
      debug!("chain rejected, index gap at {}", block.index);
      return false;
    }

    if block.previous_hash != last_hash {
      debug!("chain rejected, broken hash link at {}", block.index);
      return false;
    }

    if !valid_proof(last_block.proof, block.proof, &last_hash, difficulty) {
      debug!("chain rejected, invalid proof at {}", block.index);
      return false;
    }
  }

  true
}
