//! Shared fixtures for the pipeline, lifecycle and API tests
//!
//! A [`Harness`] wires the real builder and service to the in-memory ledger
//! and aggregator, with both sample mints already on the fake ledger.

use chrono::{Duration, Utc};
use solana_sdk::{
    instruction::CompiledInstruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use spl_token::instruction::TokenInstruction;
use std::str::FromStr;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::identity::{Referral, User};
use crate::lifecycle::{ServiceDeps, ServiceSettings, SwapService};
use crate::metrics::Metrics;
use crate::quote::{FeeSide, FixedClock};
use crate::store::{MemoryIdentityStore, MemoryQuoteStore};
use crate::test_utils::{
    sample_bundle, sample_referral, sample_route, sample_user, FakeAggregator, FakeLedger,
    USDC_MINT, WSOL_MINT,
};
use crate::tx_builder::{
    BuildRequest, BuilderOptions, FeeMint, ReferrerConfig, SwapTxBuilder,
};
use crate::wallet::{FeeVaultSigner, StaticSecret};

pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub aggregator: Arc<FakeAggregator>,
    pub metrics: Arc<Metrics>,
    pub vault: FeeVaultSigner,
    vault_secret: String,
    pub treasury: Pubkey,
    pub swap_program: Pubkey,
    pub input_mint: FeeMint,
    pub output_mint: FeeMint,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(FakeLedger::new());
        let input_mint = FeeMint {
            address: Pubkey::from_str(WSOL_MINT).unwrap(),
            decimals: 9,
            token_program: spl_token::id(),
        };
        let output_mint = FeeMint {
            address: Pubkey::from_str(USDC_MINT).unwrap(),
            decimals: 6,
            token_program: spl_token::id(),
        };
        ledger.add_mint(&input_mint.address, input_mint.decimals);
        ledger.add_mint(&output_mint.address, output_mint.decimals);

        let swap_program = Pubkey::new_unique();
        let aggregator = Arc::new(FakeAggregator::new());
        aggregator.set_bundle(sample_bundle(&swap_program, true));

        let keypair = Keypair::new();
        let vault_secret = keypair.to_base58_string();

        Self {
            ledger,
            aggregator,
            metrics: Arc::new(Metrics::new().unwrap()),
            vault: FeeVaultSigner::from_keypair(keypair),
            vault_secret,
            treasury: Pubkey::new_unique(),
            swap_program,
            input_mint,
            output_mint,
        }
    }

    pub fn vault_owner(&self) -> Pubkey {
        self.vault.pubkey()
    }

    pub fn builder(&self, options: BuilderOptions) -> SwapTxBuilder {
        SwapTxBuilder::new(
            self.ledger.clone(),
            self.aggregator.clone(),
            self.metrics.clone(),
            options,
        )
    }

    /// Build request for the sample route, fee taken on the input side
    pub fn request(
        &self,
        user: Pubkey,
        total_fee_bps: u16,
        referrer: Option<ReferrerConfig>,
    ) -> BuildRequest {
        BuildRequest {
            route: sample_route(),
            user,
            fee_vault_owner: self.vault_owner(),
            fee_vault_signer: self.vault.clone(),
            referrer,
            treasury: self.treasury,
            total_fee_bps,
            fee_side: FeeSide::Input,
            dynamic_slippage: false,
        }
    }

    /// Service over fresh stores seeded with the sample user and referral
    pub fn service(&self, clock: Arc<FixedClock>) -> ServiceHandle {
        let identities = Arc::new(MemoryIdentityStore::new());
        identities.insert_user(sample_user());
        identities.insert_referral(sample_referral());
        self.service_with(clock, identities, BuilderOptions::default())
    }

    pub fn service_with(
        &self,
        clock: Arc<FixedClock>,
        identities: Arc<MemoryIdentityStore>,
        options: BuilderOptions,
    ) -> ServiceHandle {
        let quotes = Arc::new(MemoryQuoteStore::new());
        let service = SwapService::new(
            ServiceDeps {
                quotes: quotes.clone(),
                identities: identities.clone(),
                aggregator: self.aggregator.clone(),
                builder: self.builder(options),
                custody: Arc::new(StaticSecret(Zeroizing::new(self.vault_secret.clone()))),
                clock: clock.clone(),
                metrics: self.metrics.clone(),
            },
            ServiceSettings {
                fee_vault_owner: self.vault_owner(),
                treasury: self.treasury,
                default_platform_fee_bps: 100,
                fee_side: FeeSide::Input,
                quote_ttl: Duration::seconds(60),
            },
        );
        ServiceHandle {
            service: Arc::new(service),
            quotes,
            identities,
            clock,
        }
    }
}

pub struct ServiceHandle {
    pub service: Arc<SwapService>,
    pub quotes: Arc<MemoryQuoteStore>,
    pub identities: Arc<MemoryIdentityStore>,
    pub clock: Arc<FixedClock>,
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc::now()))
}

pub fn referrer_wallet() -> Pubkey {
    Pubkey::from_str(&sample_user().wallet_address).unwrap()
}

pub fn referrer_config(fee_bps: u16) -> ReferrerConfig {
    ReferrerConfig {
        wallet: referrer_wallet(),
        fee_bps,
    }
}

/// An inactive copy of the sample referral
pub fn inactive_referral() -> Referral {
    Referral {
        is_active: false,
        ..sample_referral()
    }
}

pub fn deleted_user() -> User {
    User {
        deleted_at: Some(Utc::now()),
        ..sample_user()
    }
}

/// Program id of every compiled instruction, in order
pub fn program_ids(tx: &VersionedTransaction) -> Vec<Pubkey> {
    let keys = tx.message.static_account_keys();
    tx.message
        .instructions()
        .iter()
        .map(|ix| keys[ix.program_id_index as usize])
        .collect()
}

fn account(tx: &VersionedTransaction, ix: &CompiledInstruction, n: usize) -> Pubkey {
    tx.message.static_account_keys()[ix.accounts[n] as usize]
}

/// A decoded `TransferChecked`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub index: usize,
    pub source: Pubkey,
    pub mint: Pubkey,
    pub destination: Pubkey,
    pub authority: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

/// Every SPL `TransferChecked` in the message, in order
pub fn transfers(tx: &VersionedTransaction) -> Vec<Transfer> {
    let ids = program_ids(tx);
    tx.message
        .instructions()
        .iter()
        .enumerate()
        .filter(|(i, _)| ids[*i] == spl_token::id())
        .filter_map(|(index, ix)| match TokenInstruction::unpack(&ix.data) {
            Ok(TokenInstruction::TransferChecked { amount, decimals }) => Some(Transfer {
                index,
                source: account(tx, ix, 0),
                mint: account(tx, ix, 1),
                destination: account(tx, ix, 2),
                authority: account(tx, ix, 3),
                amount,
                decimals,
            }),
            _ => None,
        })
        .collect()
}

/// Indices of associated-token-account creations
pub fn account_creations(tx: &VersionedTransaction) -> Vec<usize> {
    program_ids(tx)
        .iter()
        .enumerate()
        .filter(|(_, id)| **id == spl_associated_token_account::id())
        .map(|(i, _)| i)
        .collect()
}

pub fn position_of(tx: &VersionedTransaction, program: &Pubkey) -> Option<usize> {
    program_ids(tx).iter().position(|id| id == program)
}
