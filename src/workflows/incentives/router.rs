use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::accrual::{PeriodSpec, PeriodType};
use super::batch::{BatchAccrualRunner, BatchError};
use super::catalog::{CatalogError, NewProgram, ProgramAction, ProgramCatalog};
use super::claims::{ClaimError, ClaimService, ClaimSubmission, ReviewCommand, ReviewDecision};
use super::coop::{CoopError, CoopFundTracker};
use super::domain::{
    ClaimId, ClaimType, DealerId, DealerProfile, DocumentRef, Eligibility, PayoutId, ProgramId,
    ProgramType, RateRuleset,
};
use super::payouts::{PayoutError, PayoutService};
use super::repository::{IncentiveRepository, RepositoryError};
use super::volume::VolumeSource;

/// Bundle of the incentive services sharing one repository, used as router
/// state by the HTTP adapter. All semantics live in the services; handlers
/// only translate payloads and map errors onto status codes.
pub struct IncentiveGateway<R, V> {
    pub catalog: ProgramCatalog<R>,
    pub batch: BatchAccrualRunner<R, V>,
    pub claims: ClaimService<R>,
    pub payouts: PayoutService<R>,
    pub coop: CoopFundTracker<R>,
}

impl<R, V> IncentiveGateway<R, V>
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    pub fn new(repository: Arc<R>, volumes: Arc<V>) -> Self {
        Self {
            catalog: ProgramCatalog::new(repository.clone()),
            batch: BatchAccrualRunner::new(repository.clone(), volumes),
            claims: ClaimService::new(repository.clone()),
            payouts: PayoutService::new(repository.clone()),
            coop: CoopFundTracker::new(repository),
        }
    }
}

/// Router builder exposing the incentive operations.
pub fn incentive_router<R, V>(gateway: Arc<IncentiveGateway<R, V>>) -> Router
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    Router::new()
        .route(
            "/api/v1/incentives/programs",
            get(list_programs_handler::<R, V>).post(create_program_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/programs/:program_id/status",
            post(change_status_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/programs/:program_id/enrollments",
            post(enroll_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/programs/:program_id/accruals/run",
            post(run_batch_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/programs/:program_id/accruals/finalize",
            post(finalize_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/programs/:program_id/accruals/summary",
            get(accrual_summary_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/claims",
            post(submit_claim_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/claims/:claim_id/review",
            post(review_claim_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/payouts",
            post(create_payout_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/payouts/:payout_id/process",
            post(process_payout_handler::<R, V>),
        )
        .route(
            "/api/v1/incentives/dealers/:dealer_id/coop-balance",
            get(coop_balance_handler::<R, V>),
        )
        .with_state(gateway)
}

pub(crate) async fn list_programs_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    match gateway.catalog.list_programs() {
        Ok(programs) => (StatusCode::OK, axum::Json(programs)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewProgramRequest {
    pub(crate) code: String,
    pub(crate) name: String,
    pub(crate) program_type: ProgramType,
    pub(crate) starts_on: NaiveDate,
    #[serde(default)]
    pub(crate) ends_on: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) enrollment_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) eligibility: Eligibility,
    pub(crate) rates: RateRuleset,
    #[serde(default)]
    pub(crate) budget_cap: Option<Decimal>,
    #[serde(default)]
    pub(crate) auto_enroll: bool,
    #[serde(default)]
    pub(crate) approval_required: bool,
}

pub(crate) async fn create_program_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    axum::Json(request): axum::Json<NewProgramRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let definition = NewProgram {
        code: request.code,
        name: request.name,
        program_type: request.program_type,
        starts_on: request.starts_on,
        ends_on: request.ends_on,
        enrollment_deadline: request.enrollment_deadline,
        eligibility: request.eligibility,
        rates: request.rates,
        budget_cap: request.budget_cap,
        auto_enroll: request.auto_enroll,
        approval_required: request.approval_required,
    };

    match gateway.catalog.create_program(definition) {
        Ok(program) => (StatusCode::CREATED, axum::Json(program)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ProgramActionRequest {
    Activate,
    Pause,
    Complete,
    Cancel,
}

impl ProgramActionRequest {
    const fn action(&self) -> ProgramAction {
        match self {
            ProgramActionRequest::Activate => ProgramAction::Activate,
            ProgramActionRequest::Pause => ProgramAction::Pause,
            ProgramActionRequest::Complete => ProgramAction::Complete,
            ProgramActionRequest::Cancel => ProgramAction::Cancel,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChangeRequest {
    pub(crate) action: ProgramActionRequest,
}

pub(crate) async fn change_status_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(program_id): Path<String>,
    axum::Json(request): axum::Json<StatusChangeRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let id = ProgramId(program_id);
    match gateway.catalog.change_status(&id, request.action.action()) {
        Ok(program) => (StatusCode::OK, axum::Json(program)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollRequest {
    pub(crate) dealer_id: String,
    #[serde(default)]
    pub(crate) tier: Option<String>,
    #[serde(default)]
    pub(crate) region: Option<String>,
    #[serde(default)]
    pub(crate) requested_on: Option<NaiveDate>,
}

pub(crate) async fn enroll_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(program_id): Path<String>,
    axum::Json(request): axum::Json<EnrollRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let profile = DealerProfile {
        dealer_id: DealerId(request.dealer_id),
        tier: request.tier,
        region: request.region,
    };
    let requested_on = request
        .requested_on
        .unwrap_or_else(|| Local::now().date_naive());

    match gateway
        .catalog
        .enroll(&profile, &ProgramId(program_id), requested_on)
    {
        Ok(enrollment) => (StatusCode::CREATED, axum::Json(enrollment)).into_response(),
        Err(error) => catalog_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunBatchRequest {
    #[serde(default)]
    pub(crate) period_type: Option<PeriodType>,
    #[serde(default)]
    pub(crate) reference: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) period_start: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) period_end: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) recalculate: bool,
}

impl RunBatchRequest {
    fn period_spec(&self) -> Option<PeriodSpec> {
        if let (Some(start), Some(end)) = (self.period_start, self.period_end) {
            return Some(PeriodSpec::Explicit { start, end });
        }
        self.period_type.map(|period| PeriodSpec::Named {
            period,
            reference: self.reference.unwrap_or_else(|| Local::now().date_naive()),
        })
    }
}

pub(crate) async fn run_batch_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(program_id): Path<String>,
    axum::Json(request): axum::Json<RunBatchRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let Some(spec) = request.period_spec() else {
        let payload = json!({
            "error": "either period_type or explicit period_start/period_end is required",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    match gateway
        .batch
        .run_batch(&ProgramId(program_id), &spec, request.recalculate)
    {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => batch_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FinalizeRequest {
    pub(crate) period_start: NaiveDate,
    pub(crate) period_end: NaiveDate,
}

pub(crate) async fn finalize_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(program_id): Path<String>,
    axum::Json(request): axum::Json<FinalizeRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    match gateway.batch.finalize(
        &ProgramId(program_id),
        request.period_start,
        request.period_end,
    ) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => batch_error_response(error),
    }
}

pub(crate) async fn accrual_summary_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(program_id): Path<String>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    match gateway.batch.accrual_summary(&ProgramId(program_id)) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => batch_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimRequest {
    pub(crate) dealer_id: String,
    pub(crate) program_id: String,
    pub(crate) claim_type: ClaimType,
    pub(crate) requested_amount: Decimal,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) documents: Vec<DocumentRef>,
    #[serde(default)]
    pub(crate) submitted_on: Option<NaiveDate>,
}

pub(crate) async fn submit_claim_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    axum::Json(request): axum::Json<ClaimRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let submission = ClaimSubmission {
        dealer_id: DealerId(request.dealer_id),
        program_id: ProgramId(request.program_id),
        claim_type: request.claim_type,
        requested_amount: request.requested_amount,
        description: request.description,
        documents: request.documents,
        submitted_on: request
            .submitted_on
            .unwrap_or_else(|| Local::now().date_naive()),
    };

    match gateway.claims.submit(submission) {
        Ok(claim) => (StatusCode::ACCEPTED, axum::Json(claim)).into_response(),
        Err(error) => claim_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReviewDecisionRequest {
    Approve,
    Deny,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) reviewer: String,
    pub(crate) decision: ReviewDecisionRequest,
    #[serde(default)]
    pub(crate) approved_amount: Option<Decimal>,
    #[serde(default)]
    pub(crate) notes: Option<String>,
    #[serde(default)]
    pub(crate) denial_reason: Option<String>,
    #[serde(default)]
    pub(crate) decided_on: Option<NaiveDate>,
}

pub(crate) async fn review_claim_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(claim_id): Path<String>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let command = ReviewCommand {
        reviewer: request.reviewer,
        decision: match request.decision {
            ReviewDecisionRequest::Approve => ReviewDecision::Approve,
            ReviewDecisionRequest::Deny => ReviewDecision::Deny,
        },
        approved_amount: request.approved_amount,
        notes: request.notes,
        denial_reason: request.denial_reason,
        decided_on: request
            .decided_on
            .unwrap_or_else(|| Local::now().date_naive()),
    };

    match gateway.claims.review(&ClaimId(claim_id), command) {
        Ok(claim) => (StatusCode::OK, axum::Json(claim)).into_response(),
        Err(error) => claim_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatePayoutRequest {
    pub(crate) claim_id: String,
    #[serde(default)]
    pub(crate) scheduled_date: Option<NaiveDate>,
}

pub(crate) async fn create_payout_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    axum::Json(request): axum::Json<CreatePayoutRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    match gateway
        .payouts
        .create_from_claim(&ClaimId(request.claim_id), request.scheduled_date)
    {
        Ok(payout) => (StatusCode::CREATED, axum::Json(payout)).into_response(),
        Err(error) => payout_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessPayoutRequest {
    pub(crate) reference_number: String,
    #[serde(default)]
    pub(crate) paid_on: Option<NaiveDate>,
}

pub(crate) async fn process_payout_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(payout_id): Path<String>,
    axum::Json(request): axum::Json<ProcessPayoutRequest>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    let paid_on = request.paid_on.unwrap_or_else(|| Local::now().date_naive());
    match gateway.payouts.process(
        &PayoutId(payout_id),
        &request.reference_number,
        paid_on,
    ) {
        Ok(payout) => (StatusCode::OK, axum::Json(payout)).into_response(),
        Err(error) => payout_error_response(error),
    }
}

pub(crate) async fn coop_balance_handler<R, V>(
    State(gateway): State<Arc<IncentiveGateway<R, V>>>,
    Path(dealer_id): Path<String>,
) -> Response
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    match gateway.coop.balances_for_dealer(&DealerId(dealer_id)) {
        Ok(balances) => (StatusCode::OK, axum::Json(balances)).into_response(),
        Err(error) => coop_error_response(error),
    }
}

fn error_payload(status: StatusCode, message: String) -> Response {
    let payload = json!({ "error": message });
    (status, axum::Json(payload)).into_response()
}

fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_error_response(error: CatalogError) -> Response {
    let status = match &error {
        CatalogError::ProgramNotFound | CatalogError::EnrollmentNotFound => StatusCode::NOT_FOUND,
        CatalogError::CodeInUse(_) | CatalogError::AlreadyEnrolled => StatusCode::CONFLICT,
        CatalogError::Repository(repository) => repository_status(repository),
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_payload(status, error.to_string())
}

fn batch_error_response(error: BatchError) -> Response {
    let status = match &error {
        BatchError::ProgramNotFound => StatusCode::NOT_FOUND,
        BatchError::Repository(repository) => repository_status(repository),
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_payload(status, error.to_string())
}

fn claim_error_response(error: ClaimError) -> Response {
    let status = match &error {
        ClaimError::ProgramNotFound | ClaimError::ClaimNotFound => StatusCode::NOT_FOUND,
        ClaimError::Coop(CoopError::ProgramNotFound) | ClaimError::Coop(CoopError::NotEnrolled) => {
            StatusCode::NOT_FOUND
        }
        ClaimError::Repository(repository) => repository_status(repository),
        ClaimError::Coop(CoopError::Repository(repository)) => repository_status(repository),
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_payload(status, error.to_string())
}

fn payout_error_response(error: PayoutError) -> Response {
    let status = match &error {
        PayoutError::ClaimNotFound
        | PayoutError::AccrualNotFound
        | PayoutError::PayoutNotFound
        | PayoutError::ProgramNotFound => StatusCode::NOT_FOUND,
        PayoutError::AlreadyProcessed => StatusCode::CONFLICT,
        PayoutError::Repository(repository) => repository_status(repository),
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_payload(status, error.to_string())
}

fn coop_error_response(error: CoopError) -> Response {
    let status = match &error {
        CoopError::ProgramNotFound | CoopError::NotEnrolled => StatusCode::NOT_FOUND,
        CoopError::Repository(repository) => repository_status(repository),
        CoopError::NotCoopProgram => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_payload(status, error.to_string())
}
