//! Instruction composition and ordering validation
//!
//! This module merges the aggregator's bundle with our fee distribution into
//! one ordered list:
//! 1. Compute budget instructions
//! 2. Other aggregator instructions (tips etc.)
//! 3. Setup instructions
//! 4. Fee-vault account creation (if missing)
//! 5. The swap instruction
//! 6. Referrer account creation, then referrer transfer
//! 7. Treasury account creation, then treasury transfer
//! 8. Cleanup instruction
//!
//! ## Key Features
//! - The fee vault exists before the swap deposits into it
//! - Every distribution step runs after the swap has filled the vault
//! - A transfer always follows its own account's creation
//! - Each instruction is tagged with a [`PlanStep`] so ordering can be
//!   checked without decoding instruction data

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_token::instruction::transfer_checked;

use crate::aggregator::SwapBundle;
use crate::tx_builder::accounts::{AccountRole, AtaResolution, FeeAccounts, FeeMint};
use crate::tx_builder::errors::SwapError;
use crate::tx_builder::fee::FeeSplit;

/// What an instruction in a plan is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    ComputeBudget,
    Other,
    Setup,
    CreateAccount(AccountRole),
    Swap,
    Transfer(AccountRole),
    Cleanup,
}

/// Ordered instructions with a parallel step tag per instruction
#[derive(Debug, Clone, Default)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    pub steps: Vec<PlanStep>,
}

impl InstructionPlan {
    fn push(&mut self, step: PlanStep, ix: Instruction) {
        self.instructions.push(ix);
        self.steps.push(step);
    }

    fn extend(&mut self, step: PlanStep, ixs: impl IntoIterator<Item = Instruction>) {
        for ix in ixs {
            self.push(step, ix);
        }
    }

    /// Number of fee-distribution transfers; the server signs iff non-zero
    pub fn transfer_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, PlanStep::Transfer(_)))
            .count()
    }

    pub fn position(&self, step: PlanStep) -> Option<usize> {
        self.steps.iter().position(|s| *s == step)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Transfer `amount` atoms out of the fee vault, authorised by its owner
fn fee_transfer(
    mint: &FeeMint,
    fee_vault: &AtaResolution,
    destination: &AtaResolution,
    amount: u64,
) -> Result<Instruction, SwapError> {
    transfer_checked(
        &mint.token_program,
        &fee_vault.address,
        &mint.address,
        &destination.address,
        &fee_vault.owner,
        &[],
        amount,
        mint.decimals,
    )
    .map_err(|e| {
        SwapError::internal(format!(
            "failed to build {} fee transfer: {e}",
            destination.role
        ))
    })
}

/// Compose the full instruction list for one swap
///
/// # Errors
///
/// `Internal` if a recipient has a non-zero share but its account was not
/// resolved. The account resolver and the fee split disagree in that case and
/// building on would drop the share.
pub fn plan_swap_instructions(
    bundle: SwapBundle,
    accounts: &FeeAccounts,
    split: &FeeSplit,
    mint: &FeeMint,
) -> Result<InstructionPlan, SwapError> {
    let SwapBundle {
        compute_budget,
        other,
        setup,
        swap,
        cleanup,
        ..
    } = bundle;

    let mut plan = InstructionPlan::default();
    plan.extend(PlanStep::ComputeBudget, compute_budget);
    plan.extend(PlanStep::Other, other);
    plan.extend(PlanStep::Setup, setup);

    if let Some(create) = &accounts.fee_vault.create_ix {
        plan.push(PlanStep::CreateAccount(AccountRole::FeeVault), create.clone());
    }

    plan.push(PlanStep::Swap, swap);

    let distributions = [
        (AccountRole::Referrer, accounts.referrer.as_ref(), split.referrer_atoms),
        (AccountRole::Treasury, accounts.treasury.as_ref(), split.treasury_atoms),
    ];
    for (role, resolution, atoms) in distributions {
        if atoms == 0 {
            continue;
        }
        let resolution = resolution.ok_or_else(|| {
            SwapError::internal(format!("{role} token account unresolved for a {atoms} atom share"))
        })?;
        if let Some(create) = &resolution.create_ix {
            plan.push(PlanStep::CreateAccount(role), create.clone());
        }
        plan.push(
            PlanStep::Transfer(role),
            fee_transfer(mint, &accounts.fee_vault, resolution, atoms)?,
        );
    }

    if let Some(cleanup) = cleanup {
        plan.push(PlanStep::Cleanup, cleanup);
    }

    sanity_check_ix_order(&plan)?;
    Ok(plan)
}

/// Validate a plan against the ordering rules
///
/// Runs on every build: an out-of-order plan either moves fees out of an
/// empty vault or leaves the aggregator without a destination for its skim.
pub fn sanity_check_ix_order(plan: &InstructionPlan) -> Result<(), SwapError> {
    if plan.instructions.len() != plan.steps.len() {
        return Err(SwapError::internal(
            "instruction plan and step tags have different lengths",
        ));
    }

    let swaps: Vec<usize> = plan
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == PlanStep::Swap)
        .map(|(idx, _)| idx)
        .collect();
    let swap_idx = match swaps.as_slice() {
        [idx] => *idx,
        other => {
            return Err(SwapError::internal(format!(
                "plan must contain exactly one swap instruction, found {}",
                other.len()
            )))
        }
    };

    let rank = |step: &PlanStep| -> u8 {
        match step {
            PlanStep::ComputeBudget => 0,
            PlanStep::Other => 1,
            PlanStep::Setup => 2,
            _ => 3,
        }
    };
    for (idx, step) in plan.steps.iter().enumerate() {
        match step {
            PlanStep::ComputeBudget | PlanStep::Other | PlanStep::Setup
            | PlanStep::CreateAccount(AccountRole::FeeVault) => {
                if idx > swap_idx {
                    return Err(SwapError::internal(format!(
                        "{step:?} at position {idx} follows the swap at {swap_idx}"
                    )));
                }
            }
            PlanStep::CreateAccount(_) | PlanStep::Transfer(_) => {
                if idx < swap_idx {
                    return Err(SwapError::internal(format!(
                        "{step:?} at position {idx} precedes the swap at {swap_idx}"
                    )));
                }
            }
            PlanStep::Swap => {}
            PlanStep::Cleanup => {
                if idx != plan.steps.len() - 1 {
                    return Err(SwapError::internal(format!(
                        "cleanup at position {idx} is not last"
                    )));
                }
            }
        }
    }

    // Aggregator-supplied prefix keeps its own relative order
    let prefix: Vec<u8> = plan.steps[..swap_idx].iter().map(rank).collect();
    if prefix.windows(2).any(|w| w[0] > w[1]) {
        return Err(SwapError::internal(
            "compute budget, other and setup instructions are out of order",
        ));
    }

    for role in [AccountRole::Referrer, AccountRole::Treasury] {
        if let (Some(create), Some(transfer)) = (
            plan.position(PlanStep::CreateAccount(role)),
            plan.position(PlanStep::Transfer(role)),
        ) {
            if create > transfer {
                return Err(SwapError::internal(format!(
                    "{role} transfer at position {transfer} precedes its account creation at {create}"
                )));
            }
        }
    }

    Ok(())
}

/// Fee-vault owner, the sole authority over every distribution transfer
pub fn transfer_authority(accounts: &FeeAccounts) -> &Pubkey {
    &accounts.fee_vault.owner
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        compute_budget::{self, ComputeBudgetInstruction},
        instruction::AccountMeta,
    };

    fn opaque_ix(program_id: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            program_id,
            &[1, 2, 3, 4],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    fn bundle(swap_program: Pubkey, cleanup: bool) -> SwapBundle {
        SwapBundle {
            compute_budget: vec![
                ComputeBudgetInstruction::set_compute_unit_limit(400_000),
                ComputeBudgetInstruction::set_compute_unit_price(1_000),
            ],
            other: vec![],
            setup: vec![opaque_ix(spl_associated_token_account::id())],
            swap: opaque_ix(swap_program),
            cleanup: cleanup.then(|| opaque_ix(spl_token::id())),
            lookup_table_addresses: vec![],
        }
    }

    fn mint() -> FeeMint {
        FeeMint {
            address: Pubkey::new_unique(),
            decimals: 6,
            token_program: spl_token::id(),
        }
    }

    fn resolution(role: AccountRole, missing: bool, mint: &FeeMint, payer: &Pubkey) -> AtaResolution {
        let owner = Pubkey::new_unique();
        AtaResolution {
            role,
            owner,
            address: Pubkey::new_unique(),
            create_ix: missing.then(|| {
                spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                    payer,
                    &owner,
                    &mint.address,
                    &mint.token_program,
                )
            }),
        }
    }

    fn accounts(missing: bool, referrer: bool, treasury: bool, mint: &FeeMint) -> FeeAccounts {
        let payer = Pubkey::new_unique();
        FeeAccounts {
            fee_vault: resolution(AccountRole::FeeVault, missing, mint, &payer),
            referrer: referrer.then(|| resolution(AccountRole::Referrer, missing, mint, &payer)),
            treasury: treasury.then(|| resolution(AccountRole::Treasury, missing, mint, &payer)),
        }
    }

    #[test]
    fn test_full_plan_order() {
        let swap_program = Pubkey::new_unique();
        let mint = mint();
        let split = FeeSplit {
            referrer_atoms: 4_000,
            treasury_atoms: 8_000,
        };

        let plan = plan_swap_instructions(
            bundle(swap_program, true),
            &accounts(true, true, true, &mint),
            &split,
            &mint,
        )
        .expect("Should plan full swap");

        assert_eq!(
            plan.steps,
            vec![
                PlanStep::ComputeBudget,
                PlanStep::ComputeBudget,
                PlanStep::Setup,
                PlanStep::CreateAccount(AccountRole::FeeVault),
                PlanStep::Swap,
                PlanStep::CreateAccount(AccountRole::Referrer),
                PlanStep::Transfer(AccountRole::Referrer),
                PlanStep::CreateAccount(AccountRole::Treasury),
                PlanStep::Transfer(AccountRole::Treasury),
                PlanStep::Cleanup,
            ]
        );
        assert_eq!(plan.instructions[0].program_id, compute_budget::id());
        assert_eq!(plan.instructions[4].program_id, swap_program);
        assert_eq!(plan.instructions[6].program_id, spl_token::id());
        assert_eq!(plan.instructions[8].program_id, spl_token::id());
        assert_eq!(plan.transfer_count(), 2);
    }

    #[test]
    fn test_transfer_authority_is_vault_owner() {
        let mint = mint();
        let accounts = accounts(false, true, true, &mint);
        let split = FeeSplit {
            referrer_atoms: 1,
            treasury_atoms: 2,
        };
        let plan =
            plan_swap_instructions(bundle(Pubkey::new_unique(), false), &accounts, &split, &mint)
                .unwrap();

        let authority = *transfer_authority(&accounts);
        for (ix, step) in plan.instructions.iter().zip(&plan.steps) {
            if let PlanStep::Transfer(_) = step {
                // transfer_checked: [source, mint, destination, authority]
                assert_eq!(ix.accounts[0].pubkey, accounts.fee_vault.address);
                assert_eq!(ix.accounts[3].pubkey, authority);
                assert!(ix.accounts[3].is_signer);
            }
        }
    }

    #[test]
    fn test_existing_accounts_no_creates() {
        let mint = mint();
        let split = FeeSplit {
            referrer_atoms: 4_000,
            treasury_atoms: 8_000,
        };
        let plan = plan_swap_instructions(
            bundle(Pubkey::new_unique(), false),
            &accounts(false, true, true, &mint),
            &split,
            &mint,
        )
        .unwrap();

        assert!(!plan
            .steps
            .iter()
            .any(|s| matches!(s, PlanStep::CreateAccount(_))));
        assert_eq!(plan.transfer_count(), 2);
    }

    #[test]
    fn test_zero_fee_no_transfers() {
        let mint = mint();
        let plan = plan_swap_instructions(
            bundle(Pubkey::new_unique(), true),
            &accounts(true, false, false, &mint),
            &FeeSplit::default(),
            &mint,
        )
        .unwrap();

        assert_eq!(plan.transfer_count(), 0);
        // Only the vault create, which the aggregator's fee skim needs
        assert_eq!(
            plan.steps
                .iter()
                .filter(|s| matches!(s, PlanStep::CreateAccount(_)))
                .count(),
            1
        );
        assert_eq!(plan.steps.last(), Some(&PlanStep::Cleanup));
    }

    #[test]
    fn test_treasury_only_when_referrer_rounds_to_zero() {
        let mint = mint();
        let split = FeeSplit {
            referrer_atoms: 0,
            treasury_atoms: 1,
        };
        let plan = plan_swap_instructions(
            bundle(Pubkey::new_unique(), false),
            &accounts(false, false, true, &mint),
            &split,
            &mint,
        )
        .unwrap();

        assert_eq!(plan.transfer_count(), 1);
        assert!(plan
            .position(PlanStep::Transfer(AccountRole::Treasury))
            .is_some());
    }

    #[test]
    fn test_unresolved_recipient_is_internal() {
        let mint = mint();
        let split = FeeSplit {
            referrer_atoms: 10,
            treasury_atoms: 0,
        };
        let result = plan_swap_instructions(
            bundle(Pubkey::new_unique(), false),
            &accounts(false, false, false, &mint),
            &split,
            &mint,
        );
        match result {
            Err(SwapError::Internal(msg)) => assert!(msg.contains("referrer")),
            other => panic!("Expected Internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_sanity_check_rejects_transfer_before_swap() {
        let plan = InstructionPlan {
            instructions: vec![opaque_ix(spl_token::id()), opaque_ix(Pubkey::new_unique())],
            steps: vec![PlanStep::Transfer(AccountRole::Treasury), PlanStep::Swap],
        };
        let err = sanity_check_ix_order(&plan).unwrap_err();
        assert!(err.to_string().contains("precedes the swap"));
    }

    #[test]
    fn test_sanity_check_rejects_vault_create_after_swap() {
        let plan = InstructionPlan {
            instructions: vec![opaque_ix(Pubkey::new_unique()), opaque_ix(Pubkey::new_unique())],
            steps: vec![
                PlanStep::Swap,
                PlanStep::CreateAccount(AccountRole::FeeVault),
            ],
        };
        let err = sanity_check_ix_order(&plan).unwrap_err();
        assert!(err.to_string().contains("follows the swap"));
    }

    #[test]
    fn test_sanity_check_rejects_transfer_before_create() {
        let plan = InstructionPlan {
            instructions: (0..3).map(|_| opaque_ix(Pubkey::new_unique())).collect(),
            steps: vec![
                PlanStep::Swap,
                PlanStep::Transfer(AccountRole::Referrer),
                PlanStep::CreateAccount(AccountRole::Referrer),
            ],
        };
        let err = sanity_check_ix_order(&plan).unwrap_err();
        assert!(err.to_string().contains("precedes its account creation"));
    }

    #[test]
    fn test_sanity_check_cleanup_must_be_last() {
        let plan = InstructionPlan {
            instructions: (0..3).map(|_| opaque_ix(Pubkey::new_unique())).collect(),
            steps: vec![
                PlanStep::Swap,
                PlanStep::Cleanup,
                PlanStep::Transfer(AccountRole::Treasury),
            ],
        };
        assert!(sanity_check_ix_order(&plan).is_err());
    }

    #[test]
    fn test_sanity_check_requires_single_swap() {
        let plan = InstructionPlan {
            instructions: vec![opaque_ix(Pubkey::new_unique())],
            steps: vec![PlanStep::Setup],
        };
        assert!(sanity_check_ix_order(&plan).is_err());
        assert!(sanity_check_ix_order(&InstructionPlan::default()).is_err());
    }

    #[test]
    fn test_other_instructions_follow_compute_budget() {
        let mint = mint();
        let mut bundle = bundle(Pubkey::new_unique(), false);
        bundle.other = vec![opaque_ix(Pubkey::new_unique())];
        let plan = plan_swap_instructions(
            bundle,
            &accounts(false, false, false, &mint),
            &FeeSplit::default(),
            &mint,
        )
        .unwrap();
        assert_eq!(plan.steps[2], PlanStep::Other);
        assert_eq!(plan.steps[3], PlanStep::Setup);
    }
}
