use chrono::NaiveDate;

use super::domain::{
    AccrualKey, ClaimId, DealerId, Enrollment, IncentiveClaim, IncentivePayout, PayoutId, Program,
    ProgramId, RebateAccrual,
};

/// Storage abstraction over the relational store so the services can be
/// exercised in isolation. Implementations must enforce uniqueness on the
/// program code, on the `(dealer, program)` enrollment pair, and on the
/// `(program, dealer, period_start)` accrual key, surfacing violations as
/// [`RepositoryError::Conflict`] — the accrual key constraint is what makes
/// concurrent non-recalculate batch runs idempotent.
pub trait IncentiveRepository: Send + Sync {
    fn insert_program(&self, program: Program) -> Result<Program, RepositoryError>;
    fn update_program(&self, program: Program) -> Result<(), RepositoryError>;
    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, RepositoryError>;
    fn fetch_program_by_code(&self, code: &str) -> Result<Option<Program>, RepositoryError>;
    fn delete_program(&self, id: &ProgramId) -> Result<(), RepositoryError>;
    fn programs(&self) -> Result<Vec<Program>, RepositoryError>;

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError>;
    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError>;
    fn fetch_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollments_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;
    fn enrollments_for_dealer(
        &self,
        dealer_id: &DealerId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;

    /// Whether any enrollment, claim, or payout references the program.
    /// Guards draft-program deletion.
    fn program_has_dependents(&self, program_id: &ProgramId) -> Result<bool, RepositoryError>;

    fn insert_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError>;
    fn update_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError>;
    fn fetch_accrual(&self, key: &AccrualKey) -> Result<Option<RebateAccrual>, RepositoryError>;
    fn accruals_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<RebateAccrual>, RepositoryError>;

    fn insert_claim(&self, claim: IncentiveClaim) -> Result<IncentiveClaim, RepositoryError>;
    fn update_claim(&self, claim: IncentiveClaim) -> Result<(), RepositoryError>;
    fn fetch_claim(&self, id: &ClaimId) -> Result<Option<IncentiveClaim>, RepositoryError>;
    fn claims_for_dealer(
        &self,
        program_id: &ProgramId,
        dealer_id: &DealerId,
    ) -> Result<Vec<IncentiveClaim>, RepositoryError>;

    /// Highest sequence already issued under the `CLM-<year>-` prefix, or 0
    /// when the year has no claims yet.
    fn max_claim_sequence(&self, year: i32) -> Result<u32, RepositoryError>;

    fn insert_payout(&self, payout: IncentivePayout) -> Result<IncentivePayout, RepositoryError>;
    fn update_payout(&self, payout: IncentivePayout) -> Result<(), RepositoryError>;
    fn fetch_payout(&self, id: &PayoutId) -> Result<Option<IncentivePayout>, RepositoryError>;

    /// Persist a completed payout and the enrollment balances it settles in a
    /// single transaction. Implementations must write both rows atomically;
    /// a partial write here is the one place the ledger can diverge.
    fn complete_payout(
        &self,
        payout: IncentivePayout,
        enrollment: Enrollment,
    ) -> Result<(), RepositoryError>;

    /// Accrual rows in `[start, end]` by period start, for finalization and
    /// period summaries.
    fn accruals_in_range(
        &self,
        program_id: &ProgramId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RebateAccrual>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
