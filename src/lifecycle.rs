//! Quote lifecycle
//!
//! [`SwapService`] owns the two request flows that reach the pipeline:
//!
//! - **Pricing**: resolve the referral, ask the aggregator for a route at the
//!   total fee, persist the result as an immutable [`Quote`].
//! - **Building**: load a stored quote by id (or reprice one fresh), check it,
//!   resolve the referrer, then hand it to [`SwapTxBuilder`].
//!
//! Each build walks the stages of [`BuildStage`] in order and logs every
//! transition against the request's correlation id.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::{Aggregator, QuoteRequest};
use crate::identity::{Referral, User};
use crate::metrics::{Metrics, Timer};
use crate::observability::TraceContext;
use crate::quote::{Clock, FeeSide, Quote, ReferralLink, SwapMode};
use crate::store::{IdentityStore, QuoteStore};
use crate::tx_builder::{
    BuildRequest, BuildResult, ReferrerConfig, SwapError, SwapTxBuilder, BPS_DENOMINATOR,
};
use crate::wallet::{FeeVaultSigner, SecretSource};

/// Stages a build passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Loaded,
    Validated,
    ReferralResolved,
    NoReferral,
    Built,
    Simulated,
    Returned,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Validated => "validated",
            Self::ReferralResolved => "referral_resolved",
            Self::NoReferral => "no_referral",
            Self::Built => "built",
            Self::Simulated => "simulated",
            Self::Returned => "returned",
        }
    }
}

/// Raw trade parameters for pricing a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteParams {
    #[serde(default)]
    pub user_public_key: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    #[serde(with = "crate::quote::amount_string")]
    pub amount: u128,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default)]
    pub dynamic_slippage: bool,
    #[serde(default)]
    pub referral_slug: Option<String>,
}

fn default_slippage_bps() -> u16 {
    50
}

/// Build a stored quote for a user
///
/// `input_mint` and `amount` are what the client believes it was quoted;
/// when present they must match the stored quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildByIdParams {
    pub quote_id: String,
    pub user_public_key: String,
    #[serde(default)]
    pub input_mint: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

/// What a build hands back to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub transaction: BuildResult,
    pub referral: Option<Referral>,
    pub referrer_user: Option<User>,
    pub quote: Quote,
}

/// Deployment-wide fee and quote settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub fee_vault_owner: Pubkey,
    pub treasury: Pubkey,
    /// Platform fee for quotes priced without a referral
    pub default_platform_fee_bps: u16,
    pub fee_side: FeeSide,
    pub quote_ttl: Duration,
}

/// Collaborators a [`SwapService`] is assembled from
pub struct ServiceDeps {
    pub quotes: Arc<dyn QuoteStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub aggregator: Arc<dyn Aggregator>,
    pub builder: SwapTxBuilder,
    pub custody: Arc<dyn SecretSource>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

pub struct SwapService {
    quotes: Arc<dyn QuoteStore>,
    identities: Arc<dyn IdentityStore>,
    aggregator: Arc<dyn Aggregator>,
    builder: SwapTxBuilder,
    custody: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    settings: ServiceSettings,
}

/// A referral together with the user it pays
struct ResolvedReferral {
    referral: Referral,
    user: User,
    wallet: Pubkey,
}

impl SwapService {
    pub fn new(deps: ServiceDeps, settings: ServiceSettings) -> Self {
        Self {
            quotes: deps.quotes,
            identities: deps.identities,
            aggregator: deps.aggregator,
            builder: deps.builder,
            custody: deps.custody,
            clock: deps.clock,
            metrics: deps.metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Price a route at the referral's fee terms and persist it
    #[instrument(skip_all, fields(correlation_id = %trace.correlation_id()))]
    pub async fn get_and_store_quote(
        &self,
        params: &QuoteParams,
        trace: &TraceContext,
    ) -> Result<Quote, SwapError> {
        let timer = Timer::new();
        let result: Result<Quote, SwapError> = async {
            let quote = self.price_quote(params, trace).await?;
            self.quotes.create(&quote).await?;
            Ok(quote)
        }
        .await;
        timer.observe_duration(&self.metrics.quote_latency);

        match &result {
            Ok(quote) => {
                self.metrics.quotes_created.inc();
                info!(
                    correlation_id = %trace.correlation_id(),
                    quote_id = %quote.id,
                    total_fee_bps = quote.total_fee_bps(),
                    expires_at = %quote.expires_at,
                    "Quote stored"
                );
            }
            Err(e) => {
                self.metrics.record_quote_failure(e.category());
                warn!(
                    correlation_id = %trace.correlation_id(),
                    category = e.category(),
                    error = %e,
                    "Quote request failed"
                );
            }
        }
        result
    }

    /// Build the transaction for a stored quote
    #[instrument(
        skip_all,
        fields(correlation_id = %trace.correlation_id(), quote_id = %params.quote_id)
    )]
    pub async fn build_swap(
        &self,
        params: &BuildByIdParams,
        trace: &TraceContext,
    ) -> Result<SwapResponse, SwapError> {
        self.observe_build(trace, self.build_by_id(params, trace))
            .await
    }

    /// Reprice from raw parameters and build in one step
    ///
    /// The referral comes from `params.referral_slug`, not from any earlier
    /// quote. Nothing is persisted.
    #[instrument(skip_all, fields(correlation_id = %trace.correlation_id()))]
    pub async fn build_swap_fresh(
        &self,
        params: &QuoteParams,
        trace: &TraceContext,
    ) -> Result<SwapResponse, SwapError> {
        self.observe_build(trace, self.build_fresh(params, trace))
            .await
    }

    async fn observe_build(
        &self,
        trace: &TraceContext,
        build: impl std::future::Future<Output = Result<SwapResponse, SwapError>>,
    ) -> Result<SwapResponse, SwapError> {
        self.metrics.builds_total.inc();
        let timer = Timer::new();
        let result = build.await;
        timer.observe_duration(&self.metrics.build_latency);

        match &result {
            Ok(response) => {
                self.metrics.builds_success.inc();
                log_stage(trace, BuildStage::Returned);
                info!(
                    correlation_id = %trace.correlation_id(),
                    quote_id = %response.quote.id,
                    server_signed = response.transaction.server_signed,
                    elapsed_ms = timer.elapsed_ms(),
                    "Swap build returned"
                );
            }
            Err(e) => {
                self.metrics.record_build_failure(e.category());
                if matches!(e, SwapError::Internal(_)) {
                    error!(
                        correlation_id = %trace.correlation_id(),
                        error = %e,
                        "Swap build failed on an internal invariant"
                    );
                } else {
                    warn!(
                        correlation_id = %trace.correlation_id(),
                        category = e.category(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Swap build rejected"
                    );
                }
            }
        }
        result
    }

    async fn build_by_id(
        &self,
        params: &BuildByIdParams,
        trace: &TraceContext,
    ) -> Result<SwapResponse, SwapError> {
        let user = parse_pubkey("userPublicKey", &params.user_public_key)?;

        let quote = self
            .quotes
            .get(&params.quote_id)
            .await?
            .ok_or_else(|| SwapError::not_found(format!("quote {}", params.quote_id)))?;
        log_stage(trace, BuildStage::Loaded);

        let now = self.clock.now();
        if quote.is_expired(now) {
            return Err(SwapError::ResourceExpired(format!(
                "quote {} expired at {}",
                quote.id, quote.expires_at
            )));
        }
        check_claims(&quote, params)?;
        quote.validate_invariants()?;
        log_stage(trace, BuildStage::Validated);

        let referral = match &quote.referral {
            Some(link) => Some(self.resolve_link(link).await?),
            None => None,
        };
        self.build_quote(quote, user, referral, trace).await
    }

    async fn build_fresh(
        &self,
        params: &QuoteParams,
        trace: &TraceContext,
    ) -> Result<SwapResponse, SwapError> {
        let user_key = params
            .user_public_key
            .as_deref()
            .ok_or_else(|| SwapError::validation("userPublicKey is required to build"))?;
        let user = parse_pubkey("userPublicKey", user_key)?;

        let quote = self.price_quote(params, trace).await?;
        log_stage(trace, BuildStage::Loaded);
        log_stage(trace, BuildStage::Validated);

        let referral = match &quote.referral {
            Some(link) => Some(self.resolve_link(link).await?),
            None => None,
        };
        self.build_quote(quote, user, referral, trace).await
    }

    async fn build_quote(
        &self,
        quote: Quote,
        user: Pubkey,
        referral: Option<ResolvedReferral>,
        trace: &TraceContext,
    ) -> Result<SwapResponse, SwapError> {
        let referrer = match &referral {
            Some(resolved) => {
                log_stage(trace, BuildStage::ReferralResolved);
                Some(ReferrerConfig {
                    wallet: resolved.wallet,
                    fee_bps: quote.referrer_fee_bps,
                })
            }
            None => {
                log_stage(trace, BuildStage::NoReferral);
                None
            }
        };

        // Custody material lives only for the duration of this build
        let signer = FeeVaultSigner::from_source(self.custody.as_ref()).await?;
        let request = BuildRequest {
            route: quote.route.clone(),
            user,
            fee_vault_owner: self.settings.fee_vault_owner,
            fee_vault_signer: signer,
            referrer,
            treasury: self.settings.treasury,
            total_fee_bps: quote.total_fee_bps(),
            fee_side: self.settings.fee_side,
            dynamic_slippage: quote.dynamic_slippage,
        };

        let output = self.builder.build(&request, trace).await?;
        log_stage(trace, BuildStage::Built);
        if output.simulation.is_some() {
            log_stage(trace, BuildStage::Simulated);
        }

        let (referral, referrer_user) = match referral {
            Some(resolved) => (Some(resolved.referral), Some(resolved.user)),
            None => (None, None),
        };
        Ok(SwapResponse {
            transaction: output.into_result()?,
            referral,
            referrer_user,
            quote,
        })
    }

    /// Fetch a route and shape it into an unsaved quote
    async fn price_quote(
        &self,
        params: &QuoteParams,
        trace: &TraceContext,
    ) -> Result<Quote, SwapError> {
        let input_mint = parse_pubkey("inputMint", &params.input_mint)?;
        let output_mint = parse_pubkey("outputMint", &params.output_mint)?;
        if input_mint == output_mint {
            return Err(SwapError::validation("inputMint and outputMint are the same"));
        }
        if params.amount == 0 {
            return Err(SwapError::validation("amount must be positive"));
        }
        if params.slippage_bps > BPS_DENOMINATOR {
            return Err(SwapError::validation(format!(
                "slippageBps {} is above {BPS_DENOMINATOR}",
                params.slippage_bps
            )));
        }
        if let Some(user) = &params.user_public_key {
            parse_pubkey("userPublicKey", user)?;
        }

        let referral = match &params.referral_slug {
            Some(slug) => Some(self.usable_referral(slug).await?),
            None => None,
        };
        let (platform_fee_bps, referrer_fee_bps) = match &referral {
            Some(r) => (r.platform_fee_bps, r.referrer_fee_bps),
            None => (self.settings.default_platform_fee_bps, 0),
        };
        let total = u32::from(platform_fee_bps) + u32::from(referrer_fee_bps);
        if total > u32::from(BPS_DENOMINATOR) {
            return Err(SwapError::bad_request(format!(
                "total fee of {total} bps exceeds {BPS_DENOMINATOR}"
            )));
        }

        let route = self
            .aggregator
            .quote(&QuoteRequest {
                input_mint: params.input_mint.clone(),
                output_mint: params.output_mint.clone(),
                amount: params.amount,
                slippage_bps: params.slippage_bps,
                platform_fee_bps: platform_fee_bps + referrer_fee_bps,
                swap_mode: SwapMode::ExactIn.as_str().to_string(),
                dynamic_slippage: params.dynamic_slippage,
            })
            .await?;
        let swap_mode = SwapMode::from_str(&route.swap_mode)?;

        let created_at = self.clock.now();
        let quote = Quote {
            id: Uuid::new_v4().to_string(),
            created_at,
            expires_at: created_at + self.settings.quote_ttl,
            user_public_key: params.user_public_key.clone(),
            input_mint: params.input_mint.clone(),
            output_mint: params.output_mint.clone(),
            amount: params.amount,
            slippage_bps: params.slippage_bps,
            dynamic_slippage: params.dynamic_slippage,
            swap_mode,
            platform_fee_bps,
            referrer_fee_bps,
            referral: referral.map(|r| ReferralLink {
                referral_id: r.id,
                slug: r.slug,
                referrer_user_id: r.user_id,
            }),
            route,
        };
        quote.validate_invariants()?;
        debug!(
            correlation_id = %trace.correlation_id(),
            quote_id = %quote.id,
            platform_fee_bps,
            referrer_fee_bps,
            out_amount = %quote.route.out_amount,
            "Route priced"
        );
        Ok(quote)
    }

    async fn usable_referral(&self, slug: &str) -> Result<Referral, SwapError> {
        self.identities
            .get_referral_by_slug(slug)
            .await?
            .filter(Referral::is_usable)
            .ok_or_else(|| SwapError::not_found(format!("referral '{slug}'")))
    }

    /// Load the referral and its owner; both must exist and still belong together
    async fn resolve_link(&self, link: &ReferralLink) -> Result<ResolvedReferral, SwapError> {
        let (referral, user) = tokio::try_join!(
            self.usable_referral(&link.slug),
            async {
                self.identities
                    .get_user(&link.referrer_user_id)
                    .await
                    .map_err(SwapError::from)
            },
        )?;
        if referral.user_id != link.referrer_user_id {
            return Err(SwapError::not_found(format!(
                "referral '{}' for referrer user {}",
                link.slug, link.referrer_user_id
            )));
        }
        let user = user
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| {
                SwapError::not_found(format!("referrer user {}", link.referrer_user_id))
            })?;
        if user.wallet_address.trim().is_empty() {
            return Err(SwapError::not_found(format!(
                "wallet for referrer user {}",
                user.id
            )));
        }
        let wallet = Pubkey::from_str(&user.wallet_address).map_err(|_| {
            SwapError::not_found(format!("valid wallet for referrer user {}", user.id))
        })?;
        Ok(ResolvedReferral {
            referral,
            user,
            wallet,
        })
    }
}

fn log_stage(trace: &TraceContext, stage: BuildStage) {
    debug!(
        correlation_id = %trace.correlation_id(),
        stage = stage.as_str(),
        elapsed_ms = trace.elapsed_ms(),
        "Build stage"
    );
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, SwapError> {
    Pubkey::from_str(value)
        .map_err(|_| SwapError::validation(format!("{field} '{value}' is not a public key")))
}

/// The caller's view of the trade must agree with what was quoted
fn check_claims(quote: &Quote, params: &BuildByIdParams) -> Result<(), SwapError> {
    if let Some(mint) = &params.input_mint {
        if *mint != quote.input_mint {
            return Err(SwapError::validation(format!(
                "inputMint {mint} does not match quote {}",
                quote.id
            )));
        }
    }
    if let Some(amount) = &params.amount {
        let claimed: u128 = amount
            .parse()
            .map_err(|_| SwapError::validation(format!("amount '{amount}' is not an integer")))?;
        if claimed != quote.amount {
            return Err(SwapError::validation(format!(
                "amount {claimed} does not match quote {}",
                quote.id
            )));
        }
    }
    Ok(())
}
