//! Signature-slot helpers for compiled messages
//!
//! The first `num_required_signatures` static keys of a message are its
//! signers, in the same order as the transaction's signature slots. The fee
//! payer is always slot 0.

use solana_sdk::{
    message::VersionedMessage, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

pub fn num_required_signatures(message: &VersionedMessage) -> usize {
    usize::from(message.header().num_required_signatures)
}

/// Accounts that must sign, in signature-slot order
#[must_use]
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = message.static_account_keys();
    &keys[..num_required_signatures(message).min(keys.len())]
}

/// Signature slot for `signer`, if it is a required signer
#[must_use]
pub fn signer_index(message: &VersionedMessage, signer: &Pubkey) -> Option<usize> {
    required_signers(message).iter().position(|key| key == signer)
}

/// Required signers whose slot still holds the empty signature
#[must_use]
pub fn missing_signers(tx: &VersionedTransaction) -> Vec<Pubkey> {
    required_signers(&tx.message)
        .iter()
        .zip(tx.signatures.iter().map(Some).chain(std::iter::repeat(None)))
        .filter(|(_, sig)| sig.map_or(true, |s| *s == Signature::default()))
        .map(|(key, _)| *key)
        .collect()
}
