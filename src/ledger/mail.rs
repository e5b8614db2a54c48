//! The mail ledger: registered email addresses.

use {
  super::{Error, Ledger},
  tracing::info,
};

/// Mail transactions are plain email addresses.
pub type Email = String;

impl Ledger<Email> {
  /// Linear scan over every block's transactions. The chain is the
  /// source of truth for membership; there is no index.
  pub fn email_exists(&self, email: &str) -> bool {
    self
      .chain
      .iter()
      .any(|block| block.transactions.iter().any(|entry| entry == email))
  }

  /// Registration entry point: proof first, duplicates refused, then
  /// the transaction and its carrying block are appended in one step.
  pub fn register(&mut self, proof: u64, email: &str) -> Result<u64, Error> {
    self.check_proof(proof)?;

    if self.email_exists(email) {
      return Err(Error::DuplicateEmail(email.to_owned()));
    }

    let last_hash = self.last_block().digest()?;
    self.new_transaction(email.to_owned());
    let block = self.new_block(proof, Some(last_hash), None)?;
    let index = block.index;

    info!("registered email in block {index}");
    Ok(index)
  }
}

#[cfg(test)]
mod tests {
  use {super::super::tests::mail_ledger, crate::ledger::Error};

  #[test]
  fn registers_a_new_email() {
    let mut ledger = mail_ledger(1);
    let proof = ledger.proof_of_work().unwrap();

    let index = ledger.register(proof, "alice@example.com").unwrap();
    assert_eq!(index, 2);
    assert_eq!(ledger.chain.len(), 2);
    assert!(ledger.email_exists("alice@example.com"));
    assert!(ledger.valid_chain(&ledger.chain));
  }

  #[test]
  fn refuses_a_duplicate_email() {
    let mut ledger = mail_ledger(1);
    let proof = ledger.proof_of_work().unwrap();
    ledger.register(proof, "alice@example.com").unwrap();

    // re-mine against the new head and try again
    let proof = ledger.proof_of_work().unwrap();
    let result = ledger.register(proof, "alice@example.com");

    assert!(matches!(result, Err(Error::DuplicateEmail(_))));
    assert_eq!(ledger.chain.len(), 2);
  }

  #[test]
  fn refuses_an_invalid_proof() {
    let mut ledger = mail_ledger(1);
    let bad = (0..)
      .find(|candidate| ledger.check_proof(*candidate).is_err())
      .unwrap();

    let result = ledger.register(bad, "alice@example.com");
    assert!(matches!(result, Err(Error::InvalidProof(_))));
    assert_eq!(ledger.chain.len(), 1);
    assert!(ledger.transactions.is_empty());
  }

  #[test]
  fn unknown_emails_do_not_exist() {
    let ledger = mail_ledger(1);
    assert!(!ledger.email_exists("nobody@example.com"));
  }
}
