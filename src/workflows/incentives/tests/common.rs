use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::workflows::incentives::accrual::{AccrualPeriod, PeriodSpec, PeriodType};
use crate::workflows::incentives::batch::BatchAccrualRunner;
use crate::workflows::incentives::catalog::{NewProgram, ProgramAction, ProgramCatalog};
use crate::workflows::incentives::claims::{ClaimService, ClaimSubmission};
use crate::workflows::incentives::coop::CoopFundTracker;
use crate::workflows::incentives::domain::{
    AccrualKey, ClaimId, ClaimType, DealerId, DealerProfile, Eligibility, Enrollment,
    IncentiveClaim, IncentivePayout, PayoutId, Program, ProgramId, ProgramType, RateRules,
    RateRuleset, RebateAccrual, Tier,
};
use crate::workflows::incentives::memory::InMemoryIncentiveRepository;
use crate::workflows::incentives::payouts::PayoutService;
use crate::workflows::incentives::repository::{IncentiveRepository, RepositoryError};
use crate::workflows::incentives::router::IncentiveGateway;
use crate::workflows::incentives::volume::{VolumeError, VolumeSource};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn tier(name: &str, min_volume: Decimal, rate: Decimal) -> Tier {
    Tier {
        name: name.to_string(),
        min_volume,
        max_volume: None,
        rate,
    }
}

pub(super) fn tiered_ruleset() -> RateRuleset {
    RateRuleset {
        rules: RateRules::Tiered(vec![
            tier("Base", dec!(0), dec!(0.01)),
            tier("Silver", dec!(10000), dec!(0.02)),
            tier("Gold", dec!(50000), dec!(0.03)),
        ]),
        max_payout: None,
        max_payout_per_dealer: None,
    }
}

pub(super) fn flat_ruleset(rate: Decimal) -> RateRuleset {
    RateRuleset {
        rules: RateRules::Flat(rate),
        max_payout: None,
        max_payout_per_dealer: None,
    }
}

pub(super) fn program_definition(code: &str, program_type: ProgramType) -> NewProgram {
    NewProgram {
        code: code.to_string(),
        name: format!("{code} incentive"),
        program_type,
        starts_on: date(2026, 1, 1),
        ends_on: Some(date(2026, 12, 31)),
        enrollment_deadline: None,
        eligibility: Eligibility::default(),
        rates: tiered_ruleset(),
        budget_cap: None,
        auto_enroll: false,
        approval_required: false,
    }
}

/// Volume double with interior mutability so tests can restate a dealer's
/// volume between runs.
#[derive(Default, Clone)]
pub(super) struct FixedVolumes {
    volumes: Arc<Mutex<HashMap<String, Decimal>>>,
}

impl FixedVolumes {
    pub(super) fn set(&self, dealer: &str, volume: Decimal) {
        self.volumes
            .lock()
            .expect("volume mutex poisoned")
            .insert(dealer.to_string(), volume);
    }
}

impl VolumeSource for FixedVolumes {
    fn qualifying_volume(
        &self,
        _program: &Program,
        dealer_id: &DealerId,
        _period: &AccrualPeriod,
    ) -> Result<Decimal, VolumeError> {
        self.volumes
            .lock()
            .expect("volume mutex poisoned")
            .get(&dealer_id.0)
            .copied()
            .ok_or_else(|| VolumeError::Missing(dealer_id.0.clone()))
    }
}

pub(super) struct TestHarness {
    pub(super) repository: Arc<InMemoryIncentiveRepository>,
    pub(super) volumes: FixedVolumes,
    pub(super) catalog: ProgramCatalog<InMemoryIncentiveRepository>,
    pub(super) runner: BatchAccrualRunner<InMemoryIncentiveRepository, FixedVolumes>,
    pub(super) claims: ClaimService<InMemoryIncentiveRepository>,
    pub(super) payouts: PayoutService<InMemoryIncentiveRepository>,
    pub(super) coop: CoopFundTracker<InMemoryIncentiveRepository>,
}

pub(super) fn harness() -> TestHarness {
    let repository = Arc::new(InMemoryIncentiveRepository::default());
    let volumes = FixedVolumes::default();

    TestHarness {
        catalog: ProgramCatalog::new(repository.clone()),
        runner: BatchAccrualRunner::new(repository.clone(), Arc::new(volumes.clone())),
        claims: ClaimService::new(repository.clone()),
        payouts: PayoutService::new(repository.clone()),
        coop: CoopFundTracker::new(repository.clone()),
        volumes,
        repository,
    }
}

pub(super) fn gateway(
    harness: &TestHarness,
) -> Arc<IncentiveGateway<InMemoryIncentiveRepository, FixedVolumes>> {
    Arc::new(IncentiveGateway::new(
        harness.repository.clone(),
        Arc::new(harness.volumes.clone()),
    ))
}

pub(super) fn active_program(
    harness: &TestHarness,
    code: &str,
    program_type: ProgramType,
    rates: RateRuleset,
) -> Program {
    let mut definition = program_definition(code, program_type);
    definition.rates = rates;
    let program = harness
        .catalog
        .create_program(definition)
        .expect("program creates");
    harness
        .catalog
        .change_status(&program.id, ProgramAction::Activate)
        .expect("program activates")
}

pub(super) fn dealer(id: &str) -> DealerProfile {
    DealerProfile {
        dealer_id: DealerId(id.to_string()),
        tier: Some("authorized".to_string()),
        region: Some("midwest".to_string()),
    }
}

pub(super) fn enroll(harness: &TestHarness, program: &Program, dealer_id: &str) -> Enrollment {
    harness
        .catalog
        .enroll(&dealer(dealer_id), &program.id, date(2026, 1, 5))
        .expect("dealer enrolls")
}

/// Seed a co-op spendable balance directly on the enrollment, standing in
/// for prior accrual runs.
pub(super) fn credit_coop_balance(
    harness: &TestHarness,
    program: &Program,
    dealer_id: &str,
    amount: Decimal,
) {
    let dealer_id = DealerId(dealer_id.to_string());
    let mut enrollment = harness
        .repository
        .fetch_enrollment(&dealer_id, &program.id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    enrollment.accrued_amount += amount;
    harness
        .repository
        .update_enrollment(enrollment)
        .expect("enrollment updates");
}

pub(super) fn claim_submission(
    program: &Program,
    dealer_id: &str,
    claim_type: ClaimType,
    amount: Decimal,
    submitted_on: NaiveDate,
) -> ClaimSubmission {
    ClaimSubmission {
        dealer_id: DealerId(dealer_id.to_string()),
        program_id: program.id.clone(),
        claim_type,
        requested_amount: amount,
        description: "co-op advertising reimbursement".to_string(),
        documents: Vec::new(),
        submitted_on,
    }
}

pub(super) fn monthly(reference: NaiveDate) -> PeriodSpec {
    PeriodSpec::Named {
        period: PeriodType::Monthly,
        reference,
    }
}

pub(super) fn fetch_enrollment(
    harness: &TestHarness,
    program: &Program,
    dealer_id: &str,
) -> Enrollment {
    harness
        .repository
        .fetch_enrollment(&DealerId(dealer_id.to_string()), &program.id)
        .expect("fetch succeeds")
        .expect("enrollment present")
}

pub(super) fn fetch_accrual(
    harness: &TestHarness,
    program: &Program,
    dealer_id: &str,
    period_start: NaiveDate,
) -> RebateAccrual {
    harness
        .repository
        .fetch_accrual(&AccrualKey {
            program_id: program.id.clone(),
            dealer_id: DealerId(dealer_id.to_string()),
            period_start,
        })
        .expect("fetch succeeds")
        .expect("accrual present")
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Repository wrapper whose payout-completion transaction fails, for
/// exercising the all-or-nothing settlement contract.
pub(super) struct FailingCompletionRepository {
    pub(super) inner: Arc<InMemoryIncentiveRepository>,
}

impl IncentiveRepository for FailingCompletionRepository {
    fn insert_program(&self, program: Program) -> Result<Program, RepositoryError> {
        self.inner.insert_program(program)
    }

    fn update_program(&self, program: Program) -> Result<(), RepositoryError> {
        self.inner.update_program(program)
    }

    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, RepositoryError> {
        self.inner.fetch_program(id)
    }

    fn fetch_program_by_code(&self, code: &str) -> Result<Option<Program>, RepositoryError> {
        self.inner.fetch_program_by_code(code)
    }

    fn delete_program(&self, id: &ProgramId) -> Result<(), RepositoryError> {
        self.inner.delete_program(id)
    }

    fn programs(&self) -> Result<Vec<Program>, RepositoryError> {
        self.inner.programs()
    }

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError> {
        self.inner.insert_enrollment(enrollment)
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        self.inner.update_enrollment(enrollment)
    }

    fn fetch_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.fetch_enrollment(dealer_id, program_id)
    }

    fn enrollments_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_program(program_id)
    }

    fn enrollments_for_dealer(
        &self,
        dealer_id: &DealerId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_dealer(dealer_id)
    }

    fn program_has_dependents(&self, program_id: &ProgramId) -> Result<bool, RepositoryError> {
        self.inner.program_has_dependents(program_id)
    }

    fn insert_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError> {
        self.inner.insert_accrual(accrual)
    }

    fn update_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError> {
        self.inner.update_accrual(accrual)
    }

    fn fetch_accrual(&self, key: &AccrualKey) -> Result<Option<RebateAccrual>, RepositoryError> {
        self.inner.fetch_accrual(key)
    }

    fn accruals_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<RebateAccrual>, RepositoryError> {
        self.inner.accruals_for_program(program_id)
    }

    fn insert_claim(&self, claim: IncentiveClaim) -> Result<IncentiveClaim, RepositoryError> {
        self.inner.insert_claim(claim)
    }

    fn update_claim(&self, claim: IncentiveClaim) -> Result<(), RepositoryError> {
        self.inner.update_claim(claim)
    }

    fn fetch_claim(&self, id: &ClaimId) -> Result<Option<IncentiveClaim>, RepositoryError> {
        self.inner.fetch_claim(id)
    }

    fn claims_for_dealer(
        &self,
        program_id: &ProgramId,
        dealer_id: &DealerId,
    ) -> Result<Vec<IncentiveClaim>, RepositoryError> {
        self.inner.claims_for_dealer(program_id, dealer_id)
    }

    fn max_claim_sequence(&self, year: i32) -> Result<u32, RepositoryError> {
        self.inner.max_claim_sequence(year)
    }

    fn insert_payout(&self, payout: IncentivePayout) -> Result<IncentivePayout, RepositoryError> {
        self.inner.insert_payout(payout)
    }

    fn update_payout(&self, payout: IncentivePayout) -> Result<(), RepositoryError> {
        self.inner.update_payout(payout)
    }

    fn fetch_payout(&self, id: &PayoutId) -> Result<Option<IncentivePayout>, RepositoryError> {
        self.inner.fetch_payout(id)
    }

    fn complete_payout(
        &self,
        _payout: IncentivePayout,
        _enrollment: Enrollment,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable(
            "settlement store offline".to_string(),
        ))
    }

    fn accruals_in_range(
        &self,
        program_id: &ProgramId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RebateAccrual>, RepositoryError> {
        self.inner.accruals_in_range(program_id, start, end)
    }
}
