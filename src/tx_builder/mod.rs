//! Quote-to-transaction pipeline
//!
//! Turns a priced aggregator route into one partially signed V0 transaction
//! that swaps for the user and distributes the protocol fee to a referrer
//! and the treasury in the same atomic unit.
//!
//! ## Architecture
//!
//! - **errors**: the `SwapError` taxonomy every stage returns
//! - **fee**: integer-exact basis-point split
//! - **accounts**: fee mint loading and associated token account resolution
//! - **lookup_tables**: address lookup table loading; unusable tables are
//!   dropped and counted
//! - **instructions**: the ordering authority, plus an ordering check
//! - **context**: block reference and trace context for one build
//! - **builder**: the pipeline driver, V0 compile and partial signing
//! - **output**: build output and its transport encoding
//! - **simulate**: dry-run policy
//!
//! ## Signing
//!
//! The server signs only as fee-vault owner and only when at least one fee
//! transfer was emitted. The user is the fee payer and always signs last,
//! client side.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use feeswap::tx_builder::{BuildRequest, SwapTxBuilder, SwapError};
//! use feeswap::observability::TraceContext;
//!
//! # async fn example(builder: SwapTxBuilder, request: BuildRequest) -> Result<(), SwapError> {
//! let output = builder.build(&request, &TraceContext::new("build_swap")).await?;
//! let result = output.into_result()?;
//! println!("{}", result.transaction_base64);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::SwapError;

pub mod accounts;
pub mod builder;
pub mod context;
pub mod fee;
pub mod instructions;
pub mod lookup_tables;
pub mod output;
pub mod simulate;

pub use accounts::{AccountRole, AtaResolution, FeeAccounts, FeeMint};
pub use builder::{assemble, BuildRequest, BuilderOptions, ReferrerConfig, SwapTxBuilder};
pub use context::BuildContext;
pub use fee::{split, FeeSplit, BPS_DENOMINATOR};
pub use instructions::{plan_swap_instructions, sanity_check_ix_order, InstructionPlan, PlanStep};
pub use output::{encode_transaction, BuildResult, SwapBuildOutput};
pub use simulate::SimulationPolicy;
