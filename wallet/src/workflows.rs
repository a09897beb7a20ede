//! Marketplace money flows composed from single-account ledger calls.
//!
//! The ledger never spans accounts atomically. These workflows run their
//! steps in order and, when a later step fails, unwind the steps already
//! applied with compensating entries tagged with the same related id: a refund
//! for a debit, a withdrawal for a credit, and a refund followed by a new hold
//! for a capture.

use std::sync::Arc;

use boothpay_common::{AccountId, Amount, LedgerError, RelatedId, TransactionId};
use boothpay_ledger::{LedgerEngine, LedgerReceipt, TransactionKind};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::MAX_FEE_BPS;

/// Failure of a multi-step workflow.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The first step failed; nothing was applied.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A later step failed and every earlier step was reversed.
    #[error("{step} failed ({cause}); reversed with {} compensating entries", .reversals.len())]
    Compensated {
        step: &'static str,
        cause: LedgerError,
        reversals: Vec<TransactionId>,
    },

    /// A later step failed and the reversal failed too. Needs operator action.
    #[error("{step} failed ({cause}); compensation failed: {compensation}")]
    CompensationFailed {
        step: &'static str,
        cause: LedgerError,
        compensation: LedgerError,
    },
}

impl WorkflowError {
    /// The ledger error that stopped the workflow.
    pub fn cause(&self) -> &LedgerError {
        match self {
            WorkflowError::Ledger(err) => err,
            WorkflowError::Compensated { cause, .. } | WorkflowError::CompensationFailed { cause, .. } => {
                cause
            }
        }
    }

    /// Whether the user can fix this by adding funds.
    pub fn is_insufficient_funds(&self) -> bool {
        self.cause().is_insufficient_funds()
    }

    /// Whether ledger state is now inconsistent with the business workflow.
    pub fn needs_intervention(&self) -> bool {
        matches!(self, WorkflowError::CompensationFailed { .. })
    }
}

/// Result type for workflows.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Steps applied so far, unwound in reverse on failure.
struct AppliedSteps<'a> {
    engine: &'a LedgerEngine,
    related_id: RelatedId,
    applied: Vec<LedgerReceipt>,
}

impl<'a> AppliedSteps<'a> {
    fn new(engine: &'a LedgerEngine, related_id: RelatedId) -> Self {
        Self {
            engine,
            related_id,
            applied: Vec::new(),
        }
    }

    fn record(&mut self, receipt: LedgerReceipt) -> LedgerReceipt {
        self.applied.push(receipt.clone());
        receipt
    }

    async fn fail(self, step: &'static str, cause: LedgerError) -> WorkflowError {
        if self.applied.is_empty() {
            return WorkflowError::Ledger(cause);
        }

        warn!(
            related_id = %self.related_id,
            step,
            error = %cause,
            applied = self.applied.len(),
            "Workflow step failed, compensating"
        );

        let mut reversals = Vec::with_capacity(self.applied.len());
        for receipt in self.applied.iter().rev() {
            match self.reverse(receipt).await {
                Ok(ids) => reversals.extend(ids),
                Err(compensation) => {
                    error!(
                        related_id = %self.related_id,
                        step,
                        transaction_id = %receipt.transaction.id,
                        error = %compensation,
                        "Compensation failed"
                    );
                    return WorkflowError::CompensationFailed {
                        step,
                        cause,
                        compensation,
                    };
                }
            }
        }

        WorkflowError::Compensated {
            step,
            cause,
            reversals,
        }
    }

    /// Compensating entries for one applied step. A capture is undone by
    /// crediting the funds back and holding them again, so the escrow is
    /// restored as it was before the capture.
    async fn reverse(&self, receipt: &LedgerReceipt) -> Result<Vec<TransactionId>, LedgerError> {
        let tx = &receipt.transaction;
        let note = || Some(format!("reversal of {}", tx.id));
        let related = || Some(self.related_id.clone());
        let account = &tx.account_id;
        let amount = tx.requested;

        let reversal = match tx.kind {
            TransactionKind::Deposit | TransactionKind::Refund => {
                self.engine.withdraw(account, amount, note()).await?
            }
            TransactionKind::Withdrawal | TransactionKind::Payout => {
                self.engine.refund(account, amount, related(), note()).await?
            }
            TransactionKind::Capture => {
                let refund = self.engine.refund(account, amount, related(), note()).await?;
                let hold = self.engine.hold(account, amount, related(), note()).await?;
                return Ok(vec![refund.transaction.id, hold.transaction.id]);
            }
            TransactionKind::Hold => {
                self.engine.release(account, amount, related(), note()).await?
            }
            TransactionKind::Release => {
                self.engine.hold(account, amount, related(), note()).await?
            }
        };
        Ok(vec![reversal.transaction.id])
    }
}

/// Event escrow: a host's funds are held when a contractor is booked, then
/// either paid to the contractor or returned to the host.
#[derive(Clone)]
pub struct EscrowWorkflow {
    engine: Arc<LedgerEngine>,
}

/// Receipts of a settled escrow.
#[derive(Debug, Clone, Serialize)]
pub struct EscrowSettlement {
    pub capture: LedgerReceipt,
    pub credit: LedgerReceipt,
}

impl EscrowWorkflow {
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Hold the host's funds for a booking.
    #[instrument(skip(self), fields(host = %host, escrow = %escrow_id))]
    pub async fn reserve(
        &self,
        host: &AccountId,
        amount: Amount,
        escrow_id: &RelatedId,
    ) -> WorkflowResult<LedgerReceipt> {
        let receipt = self
            .engine
            .hold(host, amount, Some(escrow_id.clone()), Some("escrow reserved".into()))
            .await?;
        info!(host = %host, escrow = %escrow_id, amount = %amount, "Escrow reserved");
        Ok(receipt)
    }

    /// Return held funds to the host, e.g. the event was cancelled.
    #[instrument(skip(self), fields(host = %host, escrow = %escrow_id))]
    pub async fn cancel(
        &self,
        host: &AccountId,
        amount: Amount,
        escrow_id: &RelatedId,
    ) -> WorkflowResult<LedgerReceipt> {
        let receipt = self
            .engine
            .release(host, amount, Some(escrow_id.clone()), Some("escrow cancelled".into()))
            .await?;
        info!(host = %host, escrow = %escrow_id, amount = %amount, "Escrow cancelled");
        Ok(receipt)
    }

    /// Capture the held funds from the host and credit the contractor.
    #[instrument(skip(self), fields(host = %host, contractor = %contractor, escrow = %escrow_id))]
    pub async fn settle(
        &self,
        host: &AccountId,
        contractor: &AccountId,
        amount: Amount,
        escrow_id: &RelatedId,
    ) -> WorkflowResult<EscrowSettlement> {
        let mut steps = AppliedSteps::new(&self.engine, escrow_id.clone());

        let capture = match self
            .engine
            .capture(host, amount, Some(escrow_id.clone()), Some("escrow settled".into()))
            .await
        {
            Ok(receipt) => steps.record(receipt),
            Err(err) => return Err(steps.fail("capture", err).await),
        };

        let credit = match self
            .engine
            .deposit(contractor, amount, Some(format!("escrow {escrow_id} payout")))
            .await
        {
            Ok(receipt) => steps.record(receipt),
            Err(err) => return Err(steps.fail("contractor credit", err).await),
        };

        info!(
            host = %host,
            contractor = %contractor,
            escrow = %escrow_id,
            amount = %amount,
            "Escrow settled"
        );
        Ok(EscrowSettlement { capture, credit })
    }
}

/// Gross split into seller proceeds and platform fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaleSplit {
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
}

/// Receipts of a settled sale. Zero-valued legs are skipped.
#[derive(Debug, Clone, Serialize)]
pub struct SaleSettlement {
    pub split: SaleSplit,
    pub buyer: LedgerReceipt,
    pub seller: Option<LedgerReceipt>,
    pub platform: Option<LedgerReceipt>,
}

/// Event table sale with a platform cut: debit the buyer, credit the seller
/// net of fee, credit the platform the fee.
#[derive(Clone)]
pub struct FeeSplit {
    engine: Arc<LedgerEngine>,
    platform_account: AccountId,
    fee_bps: u32,
}

impl FeeSplit {
    /// Fails when the fee rate is above 100% of the sale.
    pub fn new(
        engine: Arc<LedgerEngine>,
        platform_account: AccountId,
        fee_bps: u32,
    ) -> Result<Self, LedgerError> {
        if fee_bps > MAX_FEE_BPS {
            return Err(LedgerError::ConfigurationError(format!(
                "Platform fee {fee_bps} bps exceeds {MAX_FEE_BPS}"
            )));
        }
        Ok(Self {
            engine,
            platform_account,
            fee_bps,
        })
    }

    /// Fee rounded down; the seller gets the remainder so the parts sum to gross.
    pub fn quote(&self, gross: Amount) -> Result<SaleSplit, LedgerError> {
        let fee = gross.basis_points(self.fee_bps);
        Ok(SaleSplit {
            gross,
            fee,
            net: gross.try_sub(fee)?,
        })
    }

    #[instrument(skip(self), fields(buyer = %buyer, seller = %seller, sale = %sale_id))]
    pub async fn settle_sale(
        &self,
        buyer: &AccountId,
        seller: &AccountId,
        gross: Amount,
        sale_id: &RelatedId,
    ) -> WorkflowResult<SaleSettlement> {
        let gross = gross.ensure_positive()?;
        let split = self.quote(gross)?;
        let mut steps = AppliedSteps::new(&self.engine, sale_id.clone());

        let buyer_receipt = match self
            .engine
            .withdraw(buyer, gross, Some(format!("table sale {sale_id}")))
            .await
        {
            Ok(receipt) => steps.record(receipt),
            Err(err) => return Err(steps.fail("buyer debit", err).await),
        };

        let seller_receipt = if split.net.is_positive() {
            match self
                .engine
                .deposit(seller, split.net, Some(format!("table sale {sale_id} proceeds")))
                .await
            {
                Ok(receipt) => Some(steps.record(receipt)),
                Err(err) => return Err(steps.fail("seller credit", err).await),
            }
        } else {
            None
        };

        let platform_receipt = if split.fee.is_positive() {
            match self
                .engine
                .deposit(
                    &self.platform_account,
                    split.fee,
                    Some(format!("table sale {sale_id} fee")),
                )
                .await
            {
                Ok(receipt) => Some(steps.record(receipt)),
                Err(err) => return Err(steps.fail("platform fee credit", err).await),
            }
        } else {
            None
        };

        info!(
            buyer = %buyer,
            seller = %seller,
            sale = %sale_id,
            gross = %split.gross,
            fee = %split.fee,
            "Table sale settled"
        );

        Ok(SaleSettlement {
            split,
            buyer: buyer_receipt,
            seller: seller_receipt,
            platform: platform_receipt,
        })
    }
}
