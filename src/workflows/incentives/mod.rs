//! Incentive program accrual, claims, and payout workflows for the dealer
//! portal.
//!
//! Program definitions and enrollments live in the catalog; the batch runner
//! turns qualifying purchase volume into period-keyed accruals; claims draw
//! on co-op balances through a reviewed workflow; payouts settle approved
//! claims and finalized accruals against the enrollment ledger.

pub mod accrual;
pub mod batch;
pub mod catalog;
pub mod claims;
pub mod coop;
pub mod domain;
pub mod memory;
pub mod payouts;
pub mod repository;
pub mod router;
pub mod volume;

#[cfg(test)]
mod tests;

pub use accrual::{
    AccrualBreakdown, AccrualEngine, AccrualPeriod, PeriodError, PeriodSpec, PeriodType,
};
pub use batch::{
    BatchAccrualRunner, BatchError, BatchSummary, DealerFailure, FinalizeSummary,
    PeriodAccrualSummary,
};
pub use catalog::{CatalogError, NewProgram, ProgramAction, ProgramCatalog, ProgramUpdate};
pub use claims::{
    BatchReviewSummary, ClaimError, ClaimService, ClaimSubmission, ReviewCommand, ReviewDecision,
};
pub use coop::{CoopError, CoopFundBalance, CoopFundTracker};
pub use domain::{
    AccrualKey, AccrualStatus, ClaimId, ClaimStatus, ClaimType, DealerId, DealerProfile,
    DocumentRef, Eligibility, Enrollment, EnrollmentStatus, IncentiveClaim, IncentivePayout,
    PayoutId, PayoutSource, PayoutStatus, PayoutType, Program, ProgramId, ProgramStatus,
    ProgramType, RateRules, RateRuleset, RebateAccrual, Tier,
};
pub use memory::InMemoryIncentiveRepository;
pub use payouts::{PayoutError, PayoutService};
pub use repository::{IncentiveRepository, RepositoryError};
pub use router::{incentive_router, IncentiveGateway};
pub use volume::{CsvVolumeFeed, VolumeError, VolumeImportError, VolumeSource};
