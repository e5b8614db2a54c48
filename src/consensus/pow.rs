//! Trailing-zeros proof-of-work.
//!
//! A proof is valid against its predecessor when the SHA-256 of the
//! decimal concatenation `last_proof || proof || last_hash` ends in a
//! configured number of `'0'` hex digits. Difficulty is a static
//! configuration value; there is no retargeting.

use {
  super::{Block, BlockData},
  sha2::{Digest, Sha256},
};

/// Checks a single proof-of-work link.
///
/// The argument order is fixed as `(last_proof, proof, last_hash)` and
/// used identically at every call site.
pub fn valid_proof(
  last_proof: u64,
  proof: u64,
  last_hash: &str,
  difficulty: usize,
) -> bool {
  let guess = format!("{last_proof}{proof}{last_hash}");
  let digest = hex::encode(Sha256::digest(guess.as_bytes()));
  digest.ends_with(&"0".repeat(difficulty))
}

/// Mines the smallest proof for the next block after `last_block`.
///
/// Iterates candidates from zero; with the default difficulty of 4
/// this takes tens of thousands of hashes on average, which is the
/// whole point of asking registrants to do it.
pub fn proof_of_work<D: BlockData>(
  last_block: &Block<D>,
  difficulty: usize,
) -> Result<u64, serde_json::Error> {
  let last_hash = last_block.digest()?;

  let mut proof = 0;
  while !valid_proof(last_block.proof, proof, &last_hash, difficulty) {
    proof += 1;
  }

  Ok(proof)
}
