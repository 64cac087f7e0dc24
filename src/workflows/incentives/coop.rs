use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{ClaimStatus, DealerId, Enrollment, ProgramId, ProgramType};
use super::repository::{IncentiveRepository, RepositoryError};

/// Point-in-time co-op fund figures for one dealer under one program.
#[derive(Debug, Clone, Serialize)]
pub struct CoopFundBalance {
    pub program_id: ProgramId,
    pub dealer_id: DealerId,
    pub accrued: Decimal,
    pub approved_claims: Decimal,
    pub paid: Decimal,
    pub available: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum CoopError {
    #[error("program not found")]
    ProgramNotFound,
    #[error("program is not a co-op program")]
    NotCoopProgram,
    #[error("dealer is not enrolled in the program")]
    NotEnrolled,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Read model over the enrollment ledger and claim history. Accrual runs
/// feed a co-op dealer's spendable balance; claims draw it down once they
/// reach approved status. The available figure here is advisory at read
/// time — claim submission re-checks it under the submission gate.
pub struct CoopFundTracker<R> {
    repository: Arc<R>,
}

impl<R> CoopFundTracker<R>
where
    R: IncentiveRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Spendable balance: accrued minus the approved amounts of claims in
    /// approved or paid status.
    pub fn balance(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<CoopFundBalance, CoopError> {
        let program = self
            .repository
            .fetch_program(program_id)?
            .ok_or(CoopError::ProgramNotFound)?;
        if program.program_type != ProgramType::Coop {
            return Err(CoopError::NotCoopProgram);
        }

        let enrollment = self
            .repository
            .fetch_enrollment(dealer_id, program_id)?
            .ok_or(CoopError::NotEnrolled)?;

        Ok(self.figures(&enrollment)?)
    }

    /// Balances across every co-op program the dealer participates in.
    pub fn balances_for_dealer(
        &self,
        dealer_id: &DealerId,
    ) -> Result<Vec<CoopFundBalance>, CoopError> {
        let mut balances = Vec::new();
        for enrollment in self.repository.enrollments_for_dealer(dealer_id)? {
            let Some(program) = self.repository.fetch_program(&enrollment.program_id)? else {
                continue;
            };
            if program.program_type != ProgramType::Coop {
                continue;
            }
            balances.push(self.figures(&enrollment)?);
        }
        Ok(balances)
    }

    fn figures(&self, enrollment: &Enrollment) -> Result<CoopFundBalance, RepositoryError> {
        let approved: Decimal = self
            .repository
            .claims_for_dealer(&enrollment.program_id, &enrollment.dealer_id)?
            .iter()
            .filter(|claim| matches!(claim.status, ClaimStatus::Approved | ClaimStatus::Paid))
            .filter_map(|claim| claim.approved_amount)
            .sum();

        Ok(CoopFundBalance {
            program_id: enrollment.program_id.clone(),
            dealer_id: enrollment.dealer_id.clone(),
            accrued: enrollment.accrued_amount,
            approved_claims: approved,
            paid: enrollment.paid_amount,
            available: enrollment.accrued_amount - approved,
        })
    }
}
