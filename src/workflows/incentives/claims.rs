use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use super::coop::{CoopError, CoopFundTracker};
use super::domain::{
    ClaimId, ClaimStatus, ClaimType, DealerId, DocumentRef, EnrollmentStatus, IncentiveClaim,
    Program, ProgramId, ProgramStatus,
};
use super::repository::{IncentiveRepository, RepositoryError};

static CLAIM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_claim_id() -> ClaimId {
    let id = CLAIM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ClaimId(format!("claim-{id:06}"))
}

/// Inbound reimbursement request from a dealer.
#[derive(Debug, Clone)]
pub struct ClaimSubmission {
    pub dealer_id: DealerId,
    pub program_id: ProgramId,
    pub claim_type: ClaimType,
    pub requested_amount: Decimal,
    pub description: String,
    pub documents: Vec<DocumentRef>,
    pub submitted_on: NaiveDate,
}

/// Reviewer verdict for a submitted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Deny,
}

/// Full review instruction. The approved amount defaults to the requested
/// amount when the reviewer leaves it unset.
#[derive(Debug, Clone)]
pub struct ReviewCommand {
    pub reviewer: String,
    pub decision: ReviewDecision,
    pub approved_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub denial_reason: Option<String>,
    pub decided_on: NaiveDate,
}

/// Per-claim results of a batch approval; failures never abort the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReviewSummary {
    pub approved: Vec<ClaimId>,
    pub failures: Vec<(ClaimId, String)>,
}

/// Error raised by the claim workflow.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("requested amount must be positive")]
    InvalidAmount,
    #[error("program not found")]
    ProgramNotFound,
    #[error("claim not found")]
    ClaimNotFound,
    #[error("{claim_type} claims cannot draw on a {program_type} program")]
    ClaimTypeMismatch {
        claim_type: &'static str,
        program_type: &'static str,
    },
    #[error("program is not accepting claims")]
    ProgramNotAcceptingClaims,
    #[error("dealer has no active enrollment in the program")]
    EnrollmentNotActive,
    #[error("insufficient co-op balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
    #[error("illegal claim transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("a denial reason is required to deny a claim")]
    DenialReasonRequired,
    #[error("approving {amount} would exceed the program budget cap of {cap}")]
    BudgetExhausted { amount: Decimal, cap: Decimal },
    #[error(transparent)]
    Coop(#[from] CoopError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Claim intake and review workflow.
pub struct ClaimService<R> {
    repository: Arc<R>,
    coop: CoopFundTracker<R>,
    // Serializes submission so the co-op balance check and the insert act as
    // one step per service instance. A multi-node deployment would push this
    // guard into the store as a conditional insert.
    submission_gate: Mutex<()>,
}

impl<R> ClaimService<R>
where
    R: IncentiveRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        let coop = CoopFundTracker::new(repository.clone());
        Self {
            repository,
            coop,
            submission_gate: Mutex::new(()),
        }
    }

    /// Validate a submission and store the claim in Submitted status with a
    /// freshly assigned claim number.
    pub fn submit(&self, submission: ClaimSubmission) -> Result<IncentiveClaim, ClaimError> {
        let _gate = self
            .submission_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.check_submission(&submission)?;
        let claim_number = self.next_claim_number(submission.submitted_on)?;

        let claim = IncentiveClaim {
            id: next_claim_id(),
            claim_number: Some(claim_number),
            program_id: submission.program_id,
            dealer_id: submission.dealer_id,
            claim_type: submission.claim_type,
            requested_amount: submission.requested_amount,
            approved_amount: None,
            status: ClaimStatus::Submitted,
            description: submission.description,
            documents: submission.documents,
            submitted_on: Some(submission.submitted_on),
            reviewer: None,
            review_notes: None,
            denial_reason: None,
            approved_on: None,
        };

        Ok(self.repository.insert_claim(claim)?)
    }

    /// Store an unvalidated draft the dealer can finish later. Drafts carry
    /// no claim number; submission guards run when the draft is submitted.
    pub fn save_draft(&self, submission: ClaimSubmission) -> Result<IncentiveClaim, ClaimError> {
        if submission.requested_amount <= Decimal::ZERO {
            return Err(ClaimError::InvalidAmount);
        }

        let claim = IncentiveClaim {
            id: next_claim_id(),
            claim_number: None,
            program_id: submission.program_id,
            dealer_id: submission.dealer_id,
            claim_type: submission.claim_type,
            requested_amount: submission.requested_amount,
            approved_amount: None,
            status: ClaimStatus::Draft,
            description: submission.description,
            documents: submission.documents,
            submitted_on: None,
            reviewer: None,
            review_notes: None,
            denial_reason: None,
            approved_on: None,
        };

        Ok(self.repository.insert_claim(claim)?)
    }

    /// Promote a draft to Submitted, running the same guards as a direct
    /// submission.
    pub fn submit_draft(
        &self,
        claim_id: &ClaimId,
        submitted_on: NaiveDate,
    ) -> Result<IncentiveClaim, ClaimError> {
        let _gate = self
            .submission_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut claim = self.fetch_claim(claim_id)?;
        if !claim.status.can_transition(ClaimStatus::Submitted) {
            return Err(ClaimError::InvalidTransition {
                from: claim.status.label(),
                to: ClaimStatus::Submitted.label(),
            });
        }

        let submission = ClaimSubmission {
            dealer_id: claim.dealer_id.clone(),
            program_id: claim.program_id.clone(),
            claim_type: claim.claim_type,
            requested_amount: claim.requested_amount,
            description: claim.description.clone(),
            documents: claim.documents.clone(),
            submitted_on,
        };
        self.check_submission(&submission)?;

        claim.claim_number = Some(self.next_claim_number(submitted_on)?);
        claim.status = ClaimStatus::Submitted;
        claim.submitted_on = Some(submitted_on);
        self.repository.update_claim(claim.clone())?;
        Ok(claim)
    }

    /// Move a submitted claim under review and record the reviewer.
    pub fn start_review(
        &self,
        claim_id: &ClaimId,
        reviewer: &str,
    ) -> Result<IncentiveClaim, ClaimError> {
        let mut claim = self.fetch_claim(claim_id)?;
        if !claim.status.can_transition(ClaimStatus::UnderReview) {
            return Err(ClaimError::InvalidTransition {
                from: claim.status.label(),
                to: ClaimStatus::UnderReview.label(),
            });
        }

        claim.status = ClaimStatus::UnderReview;
        claim.reviewer = Some(reviewer.to_string());
        self.repository.update_claim(claim.clone())?;
        Ok(claim)
    }

    /// Apply a review decision. Legal only from Submitted or UnderReview;
    /// approvals count against the program budget cap when one is set.
    pub fn review(
        &self,
        claim_id: &ClaimId,
        command: ReviewCommand,
    ) -> Result<IncentiveClaim, ClaimError> {
        let mut claim = self.fetch_claim(claim_id)?;
        let target = match command.decision {
            ReviewDecision::Approve => ClaimStatus::Approved,
            ReviewDecision::Deny => ClaimStatus::Denied,
        };

        if !claim.status.can_transition(target) {
            return Err(ClaimError::InvalidTransition {
                from: claim.status.label(),
                to: target.label(),
            });
        }

        claim.reviewer = Some(command.reviewer);
        claim.review_notes = command.notes;

        match command.decision {
            ReviewDecision::Approve => {
                let amount = command.approved_amount.unwrap_or(claim.requested_amount);
                if amount <= Decimal::ZERO {
                    return Err(ClaimError::InvalidAmount);
                }

                let mut program = self
                    .repository
                    .fetch_program(&claim.program_id)?
                    .ok_or(ClaimError::ProgramNotFound)?;
                if let Some(cap) = program.budget_cap {
                    if program.spent_to_date + amount > cap {
                        return Err(ClaimError::BudgetExhausted { amount, cap });
                    }
                }
                program.spent_to_date += amount;
                self.repository.update_program(program)?;

                claim.status = ClaimStatus::Approved;
                claim.approved_amount = Some(amount);
                claim.approved_on = Some(command.decided_on);
            }
            ReviewDecision::Deny => {
                let reason = command
                    .denial_reason
                    .filter(|reason| !reason.trim().is_empty())
                    .ok_or(ClaimError::DenialReasonRequired)?;

                claim.status = ClaimStatus::Denied;
                claim.denial_reason = Some(reason);
            }
        }

        self.repository.update_claim(claim.clone())?;
        Ok(claim)
    }

    /// Approve each claim independently; one failure never aborts the rest.
    pub fn batch_approve(
        &self,
        claim_ids: &[ClaimId],
        reviewer: &str,
        notes: Option<String>,
        decided_on: NaiveDate,
    ) -> Result<BatchReviewSummary, ClaimError> {
        let mut summary = BatchReviewSummary::default();

        for claim_id in claim_ids {
            let command = ReviewCommand {
                reviewer: reviewer.to_string(),
                decision: ReviewDecision::Approve,
                approved_amount: None,
                notes: notes.clone(),
                denial_reason: None,
                decided_on,
            };
            match self.review(claim_id, command) {
                Ok(_) => summary.approved.push(claim_id.clone()),
                Err(err) => summary.failures.push((claim_id.clone(), err.to_string())),
            }
        }

        Ok(summary)
    }

    pub fn get(&self, claim_id: &ClaimId) -> Result<IncentiveClaim, ClaimError> {
        self.fetch_claim(claim_id)
    }

    fn check_submission(&self, submission: &ClaimSubmission) -> Result<(), ClaimError> {
        if submission.requested_amount <= Decimal::ZERO {
            return Err(ClaimError::InvalidAmount);
        }

        let program = self
            .repository
            .fetch_program(&submission.program_id)?
            .ok_or(ClaimError::ProgramNotFound)?;
        self.check_program(&program, submission.claim_type)?;

        let enrollment = self
            .repository
            .fetch_enrollment(&submission.dealer_id, &submission.program_id)?;
        let active = enrollment
            .map(|enrollment| enrollment.status == EnrollmentStatus::Active)
            .unwrap_or(false);
        if !active {
            return Err(ClaimError::EnrollmentNotActive);
        }

        if submission.claim_type == ClaimType::Coop {
            let balance = self
                .coop
                .balance(&submission.dealer_id, &submission.program_id)?;
            if submission.requested_amount > balance.available {
                return Err(ClaimError::InsufficientBalance {
                    requested: submission.requested_amount,
                    available: balance.available,
                });
            }
        }

        Ok(())
    }

    fn check_program(&self, program: &Program, claim_type: ClaimType) -> Result<(), ClaimError> {
        if !claim_type.matches(program.program_type) {
            return Err(ClaimError::ClaimTypeMismatch {
                claim_type: claim_type.label(),
                program_type: program.program_type.label(),
            });
        }

        // Dealers may still claim earned funds from paused or wound-down
        // programs; draft and cancelled programs accept nothing.
        if matches!(
            program.status,
            ProgramStatus::Draft | ProgramStatus::Cancelled
        ) {
            return Err(ClaimError::ProgramNotAcceptingClaims);
        }

        Ok(())
    }

    /// Claim numbers run `CLM-<year>-<seq>` with the sequence taken from the
    /// highest number already stored under the year prefix, so the counter
    /// restarts implicitly when the year rolls over.
    fn next_claim_number(&self, submitted_on: NaiveDate) -> Result<String, ClaimError> {
        let year = submitted_on.year();
        let sequence = self.repository.max_claim_sequence(year)? + 1;
        Ok(format!("CLM-{year}-{sequence:05}"))
    }

    fn fetch_claim(&self, claim_id: &ClaimId) -> Result<IncentiveClaim, ClaimError> {
        self.repository
            .fetch_claim(claim_id)?
            .ok_or(ClaimError::ClaimNotFound)
    }
}
