//! Account resolution for fee proceeds
//!
//! Each fee recipient (fee vault, referrer, treasury) holds proceeds in its
//! associated token account for the fee mint. Derivation is pure; whether a
//! creation instruction is needed takes one ledger read per account.
//!
//! ## Rules
//! - The fee vault is always resolved: the aggregator deposits its fee skim
//!   into it during the swap
//! - Referrer and treasury are resolved only when their share is non-zero
//! - Creation instructions are idempotent and paid for by the end user
//!
//! An account can appear between our read and the transaction landing. The
//! idempotent create then becomes a no-op on-chain.

use futures::future::try_join_all;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use spl_token::solana_program::program_pack::Pack;
use tracing::debug;

use crate::ledger::LedgerRpc;
use crate::tx_builder::errors::SwapError;
use crate::tx_builder::fee::FeeSplit;

/// Which fee recipient an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    FeeVault,
    Referrer,
    Treasury,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeeVault => "fee-vault",
            Self::Referrer => "referrer",
            Self::Treasury => "treasury",
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mint the fee is taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeMint {
    pub address: Pubkey,
    pub decimals: u8,
    /// Program owning the mint and its token accounts
    pub token_program: Pubkey,
}

/// Resolved token account for one (owner, mint) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaResolution {
    pub role: AccountRole,
    pub owner: Pubkey,
    pub address: Pubkey,
    /// `None` when the account already exists
    pub create_ix: Option<Instruction>,
}

/// Derive the associated token account address
///
/// Returns `None` only if no bump seed yields an off-curve address.
pub fn derive_ata(owner: &Pubkey, mint: &FeeMint) -> Option<Pubkey> {
    Pubkey::try_find_program_address(
        &[
            owner.as_ref(),
            mint.token_program.as_ref(),
            mint.address.as_ref(),
        ],
        &spl_associated_token_account::id(),
    )
    .map(|(address, _bump)| address)
}

/// Read the fee mint's decimals and owning program
///
/// Only SPL Token mints are accepted.
pub async fn load_fee_mint(ledger: &dyn LedgerRpc, mint: &Pubkey) -> Result<FeeMint, SwapError> {
    let account = ledger
        .get_account(mint)
        .await?
        .ok_or_else(|| SwapError::not_found(format!("fee mint {mint} does not exist")))?;

    if account.owner != spl_token::id() {
        return Err(SwapError::bad_request(format!(
            "fee mint {mint} is owned by {}; only SPL Token mints are supported",
            account.owner
        )));
    }

    let state = spl_token::state::Mint::unpack(&account.data)
        .map_err(|e| SwapError::validation(format!("fee mint {mint} is not a valid mint: {e}")))?;

    Ok(FeeMint {
        address: *mint,
        decimals: state.decimals,
        token_program: account.owner,
    })
}

/// Resolve one account, adding a creation instruction if it is missing
pub async fn resolve(
    ledger: &dyn LedgerRpc,
    role: AccountRole,
    owner: &Pubkey,
    mint: &FeeMint,
    payer: &Pubkey,
) -> Result<AtaResolution, SwapError> {
    let address = derive_ata(owner, mint).ok_or_else(|| {
        SwapError::internal(format!("could not derive {role} token account for {owner}"))
    })?;

    let exists = ledger.get_account(&address).await?.is_some();
    debug!(role = %role, %owner, %address, exists, "Resolved fee token account");

    let create_ix = (!exists).then(|| {
        create_associated_token_account_idempotent(
            payer,
            owner,
            &mint.address,
            &mint.token_program,
        )
    });

    Ok(AtaResolution {
        role,
        owner: *owner,
        address,
        create_ix,
    })
}

/// Owners of the three fee recipients for one build
#[derive(Debug, Clone, Copy)]
pub struct FeeOwners {
    pub fee_vault: Pubkey,
    pub referrer: Option<Pubkey>,
    pub treasury: Pubkey,
}

/// Accounts that will hold or receive fee proceeds
#[derive(Debug, Clone)]
pub struct FeeAccounts {
    pub fee_vault: AtaResolution,
    pub referrer: Option<AtaResolution>,
    pub treasury: Option<AtaResolution>,
}

/// Resolve the fee vault plus every recipient with a non-zero share
///
/// Lookups run concurrently.
pub async fn resolve_fee_accounts(
    ledger: &dyn LedgerRpc,
    owners: &FeeOwners,
    split: &FeeSplit,
    mint: &FeeMint,
    payer: &Pubkey,
) -> Result<FeeAccounts, SwapError> {
    let mut wanted = vec![(AccountRole::FeeVault, owners.fee_vault)];

    if split.referrer_atoms > 0 {
        let owner = owners.referrer.ok_or_else(|| {
            SwapError::internal("referrer share is non-zero but no referrer wallet was supplied")
        })?;
        wanted.push((AccountRole::Referrer, owner));
    }
    if split.treasury_atoms > 0 {
        wanted.push((AccountRole::Treasury, owners.treasury));
    }

    let resolved = try_join_all(
        wanted
            .iter()
            .map(|(role, owner)| resolve(ledger, *role, owner, mint, payer)),
    )
    .await?;

    let mut fee_vault = None;
    let mut referrer = None;
    let mut treasury = None;
    for resolution in resolved {
        match resolution.role {
            AccountRole::FeeVault => fee_vault = Some(resolution),
            AccountRole::Referrer => referrer = Some(resolution),
            AccountRole::Treasury => treasury = Some(resolution),
        }
    }

    let fee_vault = fee_vault
        .ok_or_else(|| SwapError::internal("fee-vault token account was not resolved"))?;

    Ok(FeeAccounts {
        fee_vault,
        referrer,
        treasury,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mint_account, FakeLedger};
    use spl_associated_token_account::get_associated_token_address_with_program_id;

    fn fee_mint() -> FeeMint {
        FeeMint {
            address: Pubkey::new_unique(),
            decimals: 6,
            token_program: spl_token::id(),
        }
    }

    #[test]
    fn test_derivation_matches_spl_helper() {
        let owner = Pubkey::new_unique();
        let mint = fee_mint();
        assert_eq!(
            derive_ata(&owner, &mint),
            Some(get_associated_token_address_with_program_id(
                &owner,
                &mint.address,
                &mint.token_program
            ))
        );
        // Deterministic
        assert_eq!(derive_ata(&owner, &mint), derive_ata(&owner, &mint));
    }

    #[tokio::test]
    async fn test_missing_account_gets_create_paid_by_user() {
        let ledger = FakeLedger::new();
        let mint = fee_mint();
        let owner = Pubkey::new_unique();
        let user = Pubkey::new_unique();

        let resolution = resolve(&ledger, AccountRole::Treasury, &owner, &mint, &user)
            .await
            .unwrap();
        let ix = resolution.create_ix.expect("missing account needs create");
        assert_eq!(ix.program_id, spl_associated_token_account::id());
        // Funding account is the first meta and must be the end user
        assert_eq!(ix.accounts[0].pubkey, user);
        assert!(ix.accounts[0].is_signer);
    }

    #[tokio::test]
    async fn test_existing_account_needs_no_create() {
        let ledger = FakeLedger::new();
        let mint = fee_mint();
        let owner = Pubkey::new_unique();
        ledger.add_token_account(&owner, &mint);

        let resolution = resolve(
            &ledger,
            AccountRole::Referrer,
            &owner,
            &mint,
            &Pubkey::new_unique(),
        )
        .await
        .unwrap();
        assert!(resolution.create_ix.is_none());
    }

    #[tokio::test]
    async fn test_zero_shares_skip_recipients() {
        let ledger = FakeLedger::new();
        let mint = fee_mint();
        let owners = FeeOwners {
            fee_vault: Pubkey::new_unique(),
            referrer: Some(Pubkey::new_unique()),
            treasury: Pubkey::new_unique(),
        };
        let split = FeeSplit {
            referrer_atoms: 0,
            treasury_atoms: 1,
        };

        let accounts =
            resolve_fee_accounts(&ledger, &owners, &split, &mint, &Pubkey::new_unique())
                .await
                .unwrap();
        assert!(accounts.referrer.is_none());
        assert!(accounts.treasury.is_some());
        assert_eq!(accounts.fee_vault.role, AccountRole::FeeVault);
        // Two accounts, two reads
        assert_eq!(ledger.account_reads(), 2);
    }

    #[tokio::test]
    async fn test_referrer_share_without_wallet_is_internal() {
        let ledger = FakeLedger::new();
        let owners = FeeOwners {
            fee_vault: Pubkey::new_unique(),
            referrer: None,
            treasury: Pubkey::new_unique(),
        };
        let split = FeeSplit {
            referrer_atoms: 5,
            treasury_atoms: 5,
        };
        let err = resolve_fee_accounts(&ledger, &owners, &split, &fee_mint(), &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Internal(msg) if msg.contains("referrer")));
    }

    #[tokio::test]
    async fn test_load_fee_mint() {
        let ledger = FakeLedger::new();
        let mint = Pubkey::new_unique();
        ledger.insert_account(mint, mint_account(9));

        let loaded = load_fee_mint(&ledger, &mint).await.unwrap();
        assert_eq!(loaded.decimals, 9);
        assert_eq!(loaded.token_program, spl_token::id());
    }

    #[tokio::test]
    async fn test_foreign_mint_program_rejected() {
        let ledger = FakeLedger::new();
        let mint = Pubkey::new_unique();
        let mut account = mint_account(6);
        account.owner = Pubkey::new_unique();
        ledger.insert_account(mint, account);

        assert!(matches!(
            load_fee_mint(&ledger, &mint).await,
            Err(SwapError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_mint_is_not_found() {
        let ledger = FakeLedger::new();
        assert!(matches!(
            load_fee_mint(&ledger, &Pubkey::new_unique()).await,
            Err(SwapError::NotFound(_))
        ));
    }
}
