//! Test Utilities Module
//!
//! In-memory fakes for the ledger and aggregator plus fixture builders for
//! quotes, referrals and on-chain accounts. Everything here is deterministic
//! and makes no network calls.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use solana_sdk::{
    account::Account,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use spl_token::solana_program::{program_option::COption, program_pack::Pack};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::aggregator::{
    Aggregator, AggregatorError, QuoteRequest, QuoteResponse, SwapInstructionsRequest,
    SwapInstructionsResponse, WireAccountMeta, WireInstruction,
};
use crate::identity::{Referral, User};
use crate::ledger::{BlockReference, LedgerError, LedgerRpc, SimulationOutcome};
use crate::quote::{Quote, ReferralLink, SwapMode};
use crate::tx_builder::accounts::{derive_ata, FeeMint};

pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// In-memory ledger
///
/// Accounts that were never inserted read as missing. `fail_next` makes the
/// next call of any kind fail with the given error.
pub struct FakeLedger {
    accounts: DashMap<Pubkey, Account>,
    block: Mutex<BlockReference>,
    simulation: Mutex<SimulationOutcome>,
    next_error: Mutex<Option<LedgerError>>,
    account_reads: AtomicUsize,
    simulations: AtomicUsize,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            block: Mutex::new(BlockReference {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 250_000_150,
            }),
            simulation: Mutex::new(SimulationOutcome {
                err: None,
                logs: vec!["Program log: ok".to_string()],
                units_consumed: Some(120_000),
            }),
            next_error: Mutex::new(None),
            account_reads: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
        }
    }

    pub fn insert_account(&self, address: Pubkey, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Create the SPL mint account for a well-known or test mint
    pub fn add_mint(&self, mint: &Pubkey, decimals: u8) {
        self.insert_account(*mint, mint_account(decimals));
    }

    /// Mark `owner`'s associated token account for `mint` as existing
    pub fn add_token_account(&self, owner: &Pubkey, mint: &FeeMint) -> Pubkey {
        let address = derive_ata(owner, mint).unwrap_or_default();
        self.insert_account(
            address,
            Account {
                lamports: 2_039_280,
                data: vec![0; spl_token::state::Account::LEN],
                owner: mint.token_program,
                executable: false,
                rent_epoch: 0,
            },
        );
        address
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        if let Ok(mut slot) = self.simulation.lock() {
            *slot = outcome;
        }
    }

    pub fn fail_next(&self, err: LedgerError) {
        if let Ok(mut slot) = self.next_error.lock() {
            *slot = Some(err);
        }
    }

    pub fn block(&self) -> BlockReference {
        self.block.lock().map(|b| *b).unwrap_or_else(|e| *e.into_inner())
    }

    pub fn account_reads(&self) -> usize {
        self.account_reads.load(Ordering::SeqCst)
    }

    pub fn simulations(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    fn take_error(&self) -> Result<(), LedgerError> {
        match self.next_error.lock().ok().and_then(|mut slot| slot.take()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        self.take_error()?;
        self.account_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.get(address).map(|a| a.value().clone()))
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError> {
        self.take_error()?;
        Ok(addresses
            .iter()
            .map(|address| self.accounts.get(address).map(|a| a.value().clone()))
            .collect())
    }

    async fn latest_block_reference(&self) -> Result<BlockReference, LedgerError> {
        self.take_error()?;
        Ok(self.block())
    }

    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimulationOutcome, LedgerError> {
        self.take_error()?;
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .simulation
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

/// Scripted aggregator that records what it was asked
pub struct FakeAggregator {
    route: Mutex<QuoteResponse>,
    /// Answer with the stored route as-is instead of echoing the request
    verbatim: AtomicBool,
    bundle: Mutex<SwapInstructionsResponse>,
    next_error: Mutex<Option<AggregatorError>>,
    quote_requests: Mutex<Vec<QuoteRequest>>,
    swap_requests: Mutex<Vec<SwapInstructionsRequest>>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self {
            route: Mutex::new(sample_route()),
            verbatim: AtomicBool::new(false),
            bundle: Mutex::new(sample_bundle(&Pubkey::new_unique(), true)),
            next_error: Mutex::new(None),
            quote_requests: Mutex::new(Vec::new()),
            swap_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_route(&self, route: QuoteResponse) {
        if let Ok(mut slot) = self.route.lock() {
            *slot = route;
        }
    }

    /// Answer every quote with exactly `route`, whatever was asked
    pub fn set_route_verbatim(&self, route: QuoteResponse) {
        self.set_route(route);
        self.verbatim.store(true, Ordering::SeqCst);
    }

    pub fn set_bundle(&self, bundle: SwapInstructionsResponse) {
        if let Ok(mut slot) = self.bundle.lock() {
            *slot = bundle;
        }
    }

    pub fn fail_next(&self, err: AggregatorError) {
        if let Ok(mut slot) = self.next_error.lock() {
            *slot = Some(err);
        }
    }

    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.quote_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn swap_requests(&self) -> Vec<SwapInstructionsRequest> {
        self.swap_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn take_error(&self) -> Result<(), AggregatorError> {
        match self.next_error.lock().ok().and_then(|mut slot| slot.take()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for FakeAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Aggregator for FakeAggregator {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError> {
        self.take_error()?;
        if let Ok(mut seen) = self.quote_requests.lock() {
            seen.push(request.clone());
        }
        let mut route = self
            .route
            .lock()
            .map(|r| r.clone())
            .map_err(|e| AggregatorError::Decode(e.to_string()))?;
        if !self.verbatim.load(Ordering::SeqCst) {
            route.input_mint = request.input_mint.clone();
            route.output_mint = request.output_mint.clone();
            route.in_amount = request.amount.to_string();
        }
        Ok(route)
    }

    async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, AggregatorError> {
        self.take_error()?;
        if let Ok(mut seen) = self.swap_requests.lock() {
            seen.push(request.clone());
        }
        self.bundle
            .lock()
            .map(|b| b.clone())
            .map_err(|e| AggregatorError::Decode(e.to_string()))
    }
}

/// Initialised SPL mint account
pub fn mint_account(decimals: u8) -> Account {
    let state = spl_token::state::Mint {
        mint_authority: COption::None,
        supply: 1_000_000_000_000,
        decimals,
        is_initialized: true,
        freeze_authority: COption::None,
    };
    let mut data = vec![0; spl_token::state::Mint::LEN];
    // Packing into a buffer of exactly Mint::LEN cannot fail
    let _ = spl_token::state::Mint::pack(state, &mut data);
    Account {
        lamports: 1_461_600,
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

/// Active address lookup table holding `addresses`
pub fn lookup_table_account(addresses: &[Pubkey]) -> Account {
    const META_SIZE: usize = 56;
    let mut data = Vec::with_capacity(META_SIZE + addresses.len() * 32);
    data.extend_from_slice(&1u32.to_le_bytes()); // ProgramState::LookupTable
    data.extend_from_slice(&u64::MAX.to_le_bytes()); // deactivation_slot
    data.extend_from_slice(&0u64.to_le_bytes()); // last_extended_slot
    data.push(0); // last_extended_slot_start_index
    data.push(0); // authority: None
    data.resize(META_SIZE, 0);
    for address in addresses {
        data.extend_from_slice(address.as_ref());
    }
    Account {
        lamports: 1_000_000,
        data,
        owner: solana_address_lookup_table_interface::program::id(),
        executable: false,
        rent_epoch: 0,
    }
}

pub fn sample_route() -> QuoteResponse {
    let raw = serde_json::json!({
        "inputMint": WSOL_MINT,
        "inAmount": "1000000",
        "outputMint": USDC_MINT,
        "outAmount": "151234",
        "otherAmountThreshold": "150478",
        "swapMode": "ExactIn",
        "slippageBps": 50,
        "platformFee": { "amount": "1814", "feeBps": 120 },
        "priceImpactPct": "0",
        "routePlan": [],
        "contextSlot": 1
    });
    serde_json::from_value(raw).unwrap_or_else(|e| panic!("sample route fixture: {e}"))
}

fn wire(ix: &Instruction) -> WireInstruction {
    WireInstruction {
        program_id: ix.program_id.to_string(),
        accounts: ix
            .accounts
            .iter()
            .map(|meta| WireAccountMeta {
                pubkey: meta.pubkey.to_string(),
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            })
            .collect(),
        data: BASE64_STANDARD.encode(&ix.data),
    }
}

/// Aggregator bundle with compute budget, one setup, the swap and optional cleanup
pub fn sample_bundle(swap_program: &Pubkey, cleanup: bool) -> SwapInstructionsResponse {
    let opaque = |program: Pubkey| {
        Instruction::new_with_bytes(
            program,
            &[0xe5, 0x17, 0xcb, 0x97],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    };
    SwapInstructionsResponse {
        compute_budget_instructions: vec![
            wire(&ComputeBudgetInstruction::set_compute_unit_limit(1_400_000)),
            wire(&ComputeBudgetInstruction::set_compute_unit_price(5_000)),
        ],
        other_instructions: vec![],
        setup_instructions: vec![wire(&opaque(Pubkey::new_unique()))],
        swap_instruction: wire(&opaque(*swap_program)),
        cleanup_instruction: cleanup.then(|| wire(&opaque(spl_token::id()))),
        address_lookup_table_addresses: vec![],
    }
}

pub fn sample_user() -> User {
    User {
        id: "user-referrer".to_string(),
        slug: "alice".to_string(),
        display_name: Some("Alice".to_string()),
        wallet_address: Pubkey::new_from_array([7; 32]).to_string(),
        deleted_at: None,
    }
}

pub fn sample_referral() -> Referral {
    Referral {
        id: "referral-1".to_string(),
        user_id: sample_user().id,
        slug: "alice-link".to_string(),
        platform_fee_bps: 80,
        referrer_fee_bps: 40,
        is_active: true,
        description: None,
        deleted_at: None,
    }
}

/// Quote for 1_000_000 atoms at 80 + 40 bps, expiring 60s after `created_at`
pub fn sample_quote(created_at: DateTime<Utc>) -> Quote {
    let referral = sample_referral();
    Quote {
        id: "quote-1".to_string(),
        created_at,
        expires_at: created_at + Duration::seconds(60),
        user_public_key: None,
        input_mint: WSOL_MINT.to_string(),
        output_mint: USDC_MINT.to_string(),
        amount: 1_000_000,
        slippage_bps: 50,
        dynamic_slippage: false,
        swap_mode: SwapMode::ExactIn,
        platform_fee_bps: referral.platform_fee_bps,
        referrer_fee_bps: referral.referrer_fee_bps,
        referral: Some(ReferralLink {
            referral_id: referral.id,
            slug: referral.slug,
            referrer_user_id: referral.user_id,
        }),
        route: sample_route(),
    }
}

/// Small unsigned V0 transaction
pub fn dummy_transaction() -> VersionedTransaction {
    let payer = Pubkey::new_unique();
    let ix = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[1, 2, 3],
        vec![AccountMeta::new(Pubkey::new_unique(), false)],
    );
    let message = v0::Message::try_compile(&payer, &[ix], &[], Hash::new_unique())
        .unwrap_or_else(|e| panic!("dummy transaction fixture: {e}"));
    VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::V0(message),
    }
}
