//! Swap transaction assembly and partial signing
//!
//! [`SwapTxBuilder::build`] runs the whole pipeline for one priced route:
//!
//! 1. Authority check: the supplied key must own the fee vault
//! 2. Fee split, before any network call
//! 3. Fee mint and fee account resolution
//! 4. Aggregator swap-instruction fetch, with the fee vault as fee account
//! 5. Instruction composition
//! 6. Lookup tables and a fresh block reference, fetched concurrently
//! 7. V0 compile with the user as fee payer; partial sign iff fees move
//! 8. Optional simulation
//!
//! A failure at any step returns before anything reaches the caller, so a
//! rejected build never leaves state behind.

use solana_sdk::{
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::aggregator::{Aggregator, QuoteResponse, SwapInstructionsRequest};
use crate::ledger::{BlockReference, LedgerRpc};
use crate::metrics::Metrics;
use crate::observability::TraceContext;
use crate::quote::FeeSide;
use crate::signers;
use crate::tx_builder::accounts::{load_fee_mint, resolve_fee_accounts, FeeOwners};
use crate::tx_builder::context::BuildContext;
use crate::tx_builder::errors::SwapError;
use crate::tx_builder::fee;
use crate::tx_builder::instructions::{plan_swap_instructions, transfer_authority, InstructionPlan};
use crate::tx_builder::lookup_tables::load_lookup_tables;
use crate::tx_builder::output::SwapBuildOutput;
use crate::tx_builder::simulate::{run_simulation, SimulationPolicy};
use crate::wallet::FeeVaultSigner;

/// Referrer wallet and share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferrerConfig {
    pub wallet: Pubkey,
    pub fee_bps: u16,
}

/// Everything one build needs
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Aggregator route, re-sent verbatim
    pub route: QuoteResponse,
    /// End user; fee payer and owner of the swapped tokens
    pub user: Pubkey,
    pub fee_vault_owner: Pubkey,
    /// Signing material for `fee_vault_owner`, scoped to this build
    pub fee_vault_signer: FeeVaultSigner,
    pub referrer: Option<ReferrerConfig>,
    pub treasury: Pubkey,
    pub total_fee_bps: u16,
    pub fee_side: FeeSide,
    pub dynamic_slippage: bool,
}

impl BuildRequest {
    fn referrer_fee_bps(&self) -> u16 {
        self.referrer.map_or(0, |r| r.fee_bps)
    }

    /// Mint and base amount the fee is computed on
    fn fee_basis(&self) -> Result<(Pubkey, u128), SwapError> {
        let (mint, amount) = match self.fee_side {
            FeeSide::Input => (&self.route.input_mint, self.route.in_amount_atoms()),
            FeeSide::Output => (
                &self.route.output_mint,
                self.route.other_amount_threshold_atoms(),
            ),
        };
        let amount = amount.map_err(|e| SwapError::validation(e.to_string()))?;
        let mint = Pubkey::from_str(mint)
            .map_err(|_| SwapError::validation(format!("fee mint '{mint}' is not a pubkey")))?;
        Ok((mint, amount))
    }
}

/// Knobs fixed at construction time
#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
    pub simulation: SimulationPolicy,
    /// Compare our fee with the aggregator's reported platform fee
    pub cross_check_reported_fee: bool,
    pub dynamic_compute_unit_limit: bool,
    pub wrap_and_unwrap_sol: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            simulation: SimulationPolicy::default(),
            cross_check_reported_fee: false,
            dynamic_compute_unit_limit: true,
            wrap_and_unwrap_sol: true,
        }
    }
}

pub struct SwapTxBuilder {
    ledger: Arc<dyn LedgerRpc>,
    aggregator: Arc<dyn Aggregator>,
    metrics: Arc<Metrics>,
    options: BuilderOptions,
}

impl SwapTxBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        aggregator: Arc<dyn Aggregator>,
        metrics: Arc<Metrics>,
        options: BuilderOptions,
    ) -> Self {
        Self {
            ledger,
            aggregator,
            metrics,
            options,
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Build a partially signed swap transaction for `request.user`
    #[instrument(
        skip_all,
        fields(
            correlation_id = %trace.correlation_id(),
            user = %request.user,
            total_fee_bps = request.total_fee_bps,
        )
    )]
    pub async fn build(
        &self,
        request: &BuildRequest,
        trace: &TraceContext,
    ) -> Result<SwapBuildOutput, SwapError> {
        if request.fee_vault_signer.pubkey() != request.fee_vault_owner {
            return Err(SwapError::internal(format!(
                "signing key {} does not own fee vault {}",
                request.fee_vault_signer.pubkey(),
                request.fee_vault_owner
            )));
        }
        if request.user == request.fee_vault_owner {
            return Err(SwapError::bad_request(
                "fee-vault owner cannot be the swapping user",
            ));
        }

        let (fee_mint_address, fee_base) = request.fee_basis()?;
        let split = fee::split(fee_base, request.total_fee_bps, request.referrer_fee_bps())?;
        if self.options.cross_check_reported_fee {
            fee::verify_reported_fee(
                &split,
                request.total_fee_bps,
                request.route.platform_fee.as_ref(),
            )?;
        }
        debug!(
            fee_base = %fee_base,
            referrer_atoms = split.referrer_atoms,
            treasury_atoms = split.treasury_atoms,
            "Computed fee split"
        );

        let mint = load_fee_mint(self.ledger.as_ref(), &fee_mint_address).await?;
        let owners = FeeOwners {
            fee_vault: request.fee_vault_owner,
            referrer: request.referrer.map(|r| r.wallet),
            treasury: request.treasury,
        };
        let accounts =
            resolve_fee_accounts(self.ledger.as_ref(), &owners, &split, &mint, &request.user)
                .await?;

        let raw_bundle = self
            .aggregator
            .swap_instructions(&SwapInstructionsRequest {
                quote_response: request.route.clone(),
                user_public_key: request.user.to_string(),
                fee_account: Some(accounts.fee_vault.address.to_string()),
                dynamic_slippage: request.dynamic_slippage,
                dynamic_compute_unit_limit: self.options.dynamic_compute_unit_limit,
                wrap_and_unwrap_sol: self.options.wrap_and_unwrap_sol,
            })
            .await?;
        let bundle = raw_bundle.decode()?;
        let table_keys = bundle.lookup_table_addresses.clone();

        let plan = plan_swap_instructions(bundle, &accounts, &split, &mint)?;
        let authority = *transfer_authority(&accounts);
        debug!(
            instructions = plan.len(),
            transfers = plan.transfer_count(),
            %authority,
            "Instruction plan composed"
        );

        let (tables, context) = tokio::try_join!(
            load_lookup_tables(self.ledger.as_ref(), &table_keys),
            BuildContext::fetch(self.ledger.as_ref(), trace),
        )?;
        let requested_tables = table_keys.iter().collect::<HashSet<_>>().len();
        self.metrics
            .lookup_tables_dropped
            .inc_by(requested_tables.saturating_sub(tables.len()) as u64);

        let signer = (plan.transfer_count() > 0).then(|| request.fee_vault_signer.keypair());
        let tx = assemble(&plan, &tables, &request.user, &context.block, signer)?;

        self.metrics.fee_transfers.inc_by(plan.transfer_count() as u64);
        if signer.is_some() {
            self.metrics.server_signatures.inc();
        }

        let mut output = SwapBuildOutput::new(
            tx,
            context.validity_ceiling(),
            split,
            mint.address,
            signer.is_some(),
            raw_bundle,
        );
        output.simulation = run_simulation(
            self.ledger.as_ref(),
            &output.tx,
            self.options.simulation,
            &self.metrics,
            &context.trace,
        )
        .await?;

        info!(
            correlation_id = %trace.correlation_id(),
            fee_mint = %output.fee_mint,
            referrer_atoms = split.referrer_atoms,
            treasury_atoms = split.treasury_atoms,
            server_signed = output.server_signed,
            last_valid_block_height = output.last_valid_block_height,
            "Swap transaction built"
        );
        Ok(output)
    }
}

/// Compile `plan` into a V0 transaction paid for by `payer`
///
/// With `authority` set, its signature slot is filled and every other slot,
/// the payer's included, is left empty for the client to sign.
pub fn assemble(
    plan: &InstructionPlan,
    tables: &[AddressLookupTableAccount],
    payer: &Pubkey,
    block: &BlockReference,
    authority: Option<&Keypair>,
) -> Result<VersionedTransaction, SwapError> {
    let message = v0::Message::try_compile(payer, &plan.instructions, tables, block.blockhash)
        .map_err(|e| SwapError::internal(format!("failed to compile message: {e}")))?;
    let message = VersionedMessage::V0(message);

    let num_signers = signers::num_required_signatures(&message);
    let mut signatures = vec![Signature::default(); num_signers];

    if let Some(authority) = authority {
        let slot = signers::signer_index(&message, &authority.pubkey()).ok_or_else(|| {
            SwapError::internal(format!(
                "fee-vault authority {} is not a required signer",
                authority.pubkey()
            ))
        })?;
        if slot == 0 {
            return Err(SwapError::internal(
                "fee-vault authority compiled as fee payer",
            ));
        }
        signatures[slot] = authority.sign_message(&message.serialize());
    }

    Ok(VersionedTransaction {
        signatures,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_route;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
    };

    use crate::tx_builder::accounts::AccountRole;
    use crate::tx_builder::instructions::PlanStep;

    fn plan_with_transfer(authority: &Pubkey) -> InstructionPlan {
        InstructionPlan {
            instructions: vec![
                Instruction::new_with_bytes(
                    Pubkey::new_unique(),
                    &[1],
                    vec![AccountMeta::new(Pubkey::new_unique(), false)],
                ),
                Instruction::new_with_bytes(
                    spl_token::id(),
                    &[12],
                    vec![AccountMeta::new_readonly(*authority, true)],
                ),
            ],
            steps: vec![PlanStep::Swap, PlanStep::Transfer(AccountRole::Treasury)],
        }
    }

    fn block() -> BlockReference {
        BlockReference {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 1_000,
        }
    }

    #[test]
    fn test_assemble_partial_sign() {
        let payer = Pubkey::new_unique();
        let authority = Keypair::new();
        let plan = plan_with_transfer(&authority.pubkey());

        let tx = assemble(&plan, &[], &payer, &block(), Some(&authority)).unwrap();
        assert_eq!(tx.signatures.len(), 2);
        assert_eq!(tx.signatures[0], Signature::default());
        assert!(tx.signatures[1].verify(
            authority.pubkey().as_ref(),
            &tx.message.serialize()
        ));
        assert_eq!(signers::missing_signers(&tx), vec![payer]);
    }

    #[test]
    fn test_assemble_unsigned_without_authority() {
        let payer = Pubkey::new_unique();
        let plan = InstructionPlan {
            instructions: vec![Instruction::new_with_bytes(
                Pubkey::new_unique(),
                &[1],
                vec![],
            )],
            steps: vec![PlanStep::Swap],
        };
        let tx = assemble(&plan, &[], &payer, &block(), None).unwrap();
        assert_eq!(tx.signatures, vec![Signature::default()]);
    }

    #[test]
    fn test_assemble_rejects_authority_not_in_message() {
        let payer = Pubkey::new_unique();
        let plan = plan_with_transfer(&Pubkey::new_unique());
        let stranger = Keypair::new();
        let err = assemble(&plan, &[], &payer, &block(), Some(&stranger)).unwrap_err();
        assert!(matches!(err, SwapError::Internal(_)));
    }

    #[test]
    fn test_fee_basis_follows_fee_side() {
        let authority = Keypair::new();
        let mut request = BuildRequest {
            route: sample_route(),
            user: Pubkey::new_unique(),
            fee_vault_owner: authority.pubkey(),
            fee_vault_signer: FeeVaultSigner::from_keypair(authority),
            referrer: Some(ReferrerConfig {
                wallet: Pubkey::new_unique(),
                fee_bps: 40,
            }),
            treasury: Pubkey::new_unique(),
            total_fee_bps: 120,
            fee_side: FeeSide::Input,
            dynamic_slippage: false,
        };
        // inAmount = 1_000_000
        let (_, base) = request.fee_basis().unwrap();
        let split = fee::split(base, request.total_fee_bps, request.referrer_fee_bps()).unwrap();
        assert_eq!(split.referrer_atoms, 4_000);
        assert_eq!(split.treasury_atoms, 8_000);

        // otherAmountThreshold = 150_478
        request.fee_side = FeeSide::Output;
        let (mint, base) = request.fee_basis().unwrap();
        assert_eq!(mint.to_string(), request.route.output_mint);
        assert_eq!(base, 150_478);
    }
}
