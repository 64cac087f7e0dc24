use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::domain::{
    AccrualKey, AccrualStatus, ClaimId, ClaimStatus, IncentivePayout, PayoutId, PayoutSource,
    PayoutStatus, PayoutType, ProgramType,
};
use super::repository::{IncentiveRepository, RepositoryError};

static PAYOUT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_payout_id() -> PayoutId {
    let id = PAYOUT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PayoutId(format!("pay-{id:06}"))
}

/// Error raised by payout operations.
#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("claim not found")]
    ClaimNotFound,
    #[error("only approved claims can be scheduled for payout")]
    ClaimNotApproved,
    #[error("claim has no approved amount")]
    MissingApprovedAmount,
    #[error("accrual not found")]
    AccrualNotFound,
    #[error("only finalized rebate accruals can be scheduled for payout")]
    AccrualNotPayable,
    #[error("payout not found")]
    PayoutNotFound,
    #[error("payout already completed")]
    AlreadyProcessed,
    #[error("dealer has no enrollment in the program")]
    EnrollmentMissing,
    #[error("program not found")]
    ProgramNotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Converts approved claims and finalized accruals into payout records and
/// settles them against the enrollment ledger.
pub struct PayoutService<R> {
    repository: Arc<R>,
}

impl<R> PayoutService<R>
where
    R: IncentiveRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Schedule a payout for an approved claim.
    ///
    /// The claim is marked paid as soon as the payout is scheduled, before
    /// funds actually move; money movement itself is tracked on the payout
    /// record through `process`.
    pub fn create_from_claim(
        &self,
        claim_id: &ClaimId,
        scheduled_date: Option<NaiveDate>,
    ) -> Result<IncentivePayout, PayoutError> {
        let mut claim = self
            .repository
            .fetch_claim(claim_id)?
            .ok_or(PayoutError::ClaimNotFound)?;

        if claim.status != ClaimStatus::Approved {
            return Err(PayoutError::ClaimNotApproved);
        }
        let amount = claim
            .approved_amount
            .ok_or(PayoutError::MissingApprovedAmount)?;

        let mut enrollment = self
            .repository
            .fetch_enrollment(&claim.dealer_id, &claim.program_id)?
            .ok_or(PayoutError::EnrollmentMissing)?;

        let payout = IncentivePayout {
            id: next_payout_id(),
            program_id: claim.program_id.clone(),
            dealer_id: claim.dealer_id.clone(),
            amount,
            payout_type: PayoutType::ClaimReimbursement,
            source: PayoutSource::Claim(claim.id.clone()),
            status: PayoutStatus::Pending,
            scheduled_date,
            paid_date: None,
            reference_number: None,
        };
        let stored = self.repository.insert_payout(payout)?;

        claim.status = ClaimStatus::Paid;
        self.repository.update_claim(claim)?;

        enrollment.pending_amount += amount;
        self.repository.update_enrollment(enrollment)?;

        Ok(stored)
    }

    /// Schedule a payout for a finalized rebate accrual and mark the accrual
    /// paid. Co-op accruals fund the enrollment balance instead and are not
    /// directly payable.
    pub fn create_from_accrual(
        &self,
        key: &AccrualKey,
        scheduled_date: Option<NaiveDate>,
    ) -> Result<IncentivePayout, PayoutError> {
        let mut accrual = self
            .repository
            .fetch_accrual(key)?
            .ok_or(PayoutError::AccrualNotFound)?;

        let program = self
            .repository
            .fetch_program(&key.program_id)?
            .ok_or(PayoutError::ProgramNotFound)?;
        if program.program_type != ProgramType::Rebate {
            return Err(PayoutError::AccrualNotPayable);
        }
        if accrual.status != AccrualStatus::Finalized {
            return Err(PayoutError::AccrualNotPayable);
        }

        let mut enrollment = self
            .repository
            .fetch_enrollment(&key.dealer_id, &key.program_id)?
            .ok_or(PayoutError::EnrollmentMissing)?;

        let amount = accrual.final_amount;
        let payout = IncentivePayout {
            id: next_payout_id(),
            program_id: key.program_id.clone(),
            dealer_id: key.dealer_id.clone(),
            amount,
            payout_type: PayoutType::RebateAccrual,
            source: PayoutSource::Accrual(key.clone()),
            status: PayoutStatus::Pending,
            scheduled_date,
            paid_date: None,
            reference_number: None,
        };
        let stored = self.repository.insert_payout(payout)?;

        accrual.status = AccrualStatus::Paid;
        self.repository.update_accrual(accrual)?;

        enrollment.pending_amount += amount;
        self.repository.update_enrollment(enrollment)?;

        Ok(stored)
    }

    /// Settle a payout: move the amount from pending to paid on the
    /// enrollment and complete the payout with its reference number and paid
    /// date. Both rows are written in a single repository transaction —
    /// completion is terminal.
    pub fn process(
        &self,
        payout_id: &PayoutId,
        reference_number: &str,
        paid_on: NaiveDate,
    ) -> Result<IncentivePayout, PayoutError> {
        let mut payout = self
            .repository
            .fetch_payout(payout_id)?
            .ok_or(PayoutError::PayoutNotFound)?;

        if payout.status == PayoutStatus::Completed {
            return Err(PayoutError::AlreadyProcessed);
        }

        let mut enrollment = self
            .repository
            .fetch_enrollment(&payout.dealer_id, &payout.program_id)?
            .ok_or(PayoutError::EnrollmentMissing)?;

        enrollment.paid_amount += payout.amount;
        enrollment.pending_amount -= payout.amount;

        payout.status = PayoutStatus::Completed;
        payout.paid_date = Some(paid_on);
        payout.reference_number = Some(reference_number.to_string());

        self.repository
            .complete_payout(payout.clone(), enrollment)?;

        info!(payout = %payout.id.0, reference = reference_number, amount = %payout.amount, "payout completed");
        Ok(payout)
    }

    /// Record a failed transfer attempt. The pending reservation stays on
    /// the enrollment so a later `process` retry settles the same amount.
    pub fn mark_failed(&self, payout_id: &PayoutId) -> Result<IncentivePayout, PayoutError> {
        let mut payout = self
            .repository
            .fetch_payout(payout_id)?
            .ok_or(PayoutError::PayoutNotFound)?;

        if payout.status == PayoutStatus::Completed {
            return Err(PayoutError::AlreadyProcessed);
        }

        payout.status = PayoutStatus::Failed;
        self.repository.update_payout(payout.clone())?;
        Ok(payout)
    }

    pub fn get(&self, payout_id: &PayoutId) -> Result<IncentivePayout, PayoutError> {
        self.repository
            .fetch_payout(payout_id)?
            .ok_or(PayoutError::PayoutNotFound)
    }
}
