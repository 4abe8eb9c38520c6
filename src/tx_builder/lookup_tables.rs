//! Address lookup table loading
//!
//! Lookup tables only compress the message; every instruction still names its
//! accounts in full. A table that is missing or does not deserialize is
//! dropped with a warning and the build carries on without it.

use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_sdk::{account::Account, message::AddressLookupTableAccount, pubkey::Pubkey};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ledger::LedgerRpc;
use crate::tx_builder::errors::SwapError;

/// Fetch and decode lookup tables in one round trip
///
/// Duplicate keys are fetched once. A transport failure fails the build;
/// per-table problems do not.
pub async fn load_lookup_tables(
    ledger: &dyn LedgerRpc,
    keys: &[Pubkey],
) -> Result<Vec<AddressLookupTableAccount>, SwapError> {
    let mut seen = HashSet::with_capacity(keys.len());
    let keys: Vec<Pubkey> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let accounts = ledger.get_multiple_accounts(&keys).await?;

    let mut resolved = Vec::with_capacity(keys.len());
    for (key, maybe_account) in keys.iter().zip(accounts) {
        match maybe_account {
            Some(account) => {
                if let Some(table) = deserialize_lookup_table(key, &account) {
                    resolved.push(table);
                }
            }
            None => warn!(address = %key, "Lookup table not found, dropping"),
        }
    }

    debug!(
        requested = keys.len(),
        resolved = resolved.len(),
        "Loaded address lookup tables"
    );
    Ok(resolved)
}

fn deserialize_lookup_table(key: &Pubkey, account: &Account) -> Option<AddressLookupTableAccount> {
    match AddressLookupTable::deserialize(&account.data) {
        Ok(table) => Some(AddressLookupTableAccount {
            key: *key,
            addresses: table.addresses.into_owned(),
        }),
        Err(err) => {
            warn!(address = %key, error = %err, "Malformed lookup table, dropping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{lookup_table_account, FakeLedger};
    use crate::ledger::LedgerError;

    #[tokio::test]
    async fn test_missing_and_malformed_tables_dropped() {
        let ledger = FakeLedger::new();
        let good = Pubkey::new_unique();
        let garbage = Pubkey::new_unique();
        let missing = Pubkey::new_unique();
        let entries = vec![Pubkey::new_unique(), Pubkey::new_unique()];

        ledger.insert_account(good, lookup_table_account(&entries));
        let mut bad = lookup_table_account(&entries);
        bad.data.truncate(10);
        ledger.insert_account(garbage, bad);

        let tables = load_lookup_tables(&ledger, &[missing, good, garbage])
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].key, good);
        assert_eq!(tables[0].addresses, entries);
    }

    #[tokio::test]
    async fn test_duplicate_keys_fetched_once() {
        let ledger = FakeLedger::new();
        let key = Pubkey::new_unique();
        ledger.insert_account(key, lookup_table_account(&[Pubkey::new_unique()]));

        let tables = load_lookup_tables(&ledger, &[key, key]).await.unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[tokio::test]
    async fn test_no_keys_no_rpc() {
        let ledger = FakeLedger::new();
        ledger.fail_next(LedgerError::Rpc {
            operation: "get_multiple_accounts",
            message: "should not be called".to_string(),
        });
        assert!(load_lookup_tables(&ledger, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_upstream() {
        let ledger = FakeLedger::new();
        ledger.fail_next(LedgerError::Timeout {
            operation: "get_multiple_accounts",
            timeout_ms: 100,
        });
        let err = load_lookup_tables(&ledger, &[Pubkey::new_unique()])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
