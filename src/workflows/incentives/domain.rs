use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for incentive programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(pub String);

/// Identifier wrapper for dealers known to the portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DealerId(pub String);

/// Identifier wrapper for incentive claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

/// Identifier wrapper for payout records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayoutId(pub String);

/// Composite key for one dealer's accrual in one period. Period start is an
/// exact-match key, not an overlap range, so it can back a uniqueness
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccrualKey {
    pub program_id: ProgramId,
    pub dealer_id: DealerId,
    pub period_start: NaiveDate,
}

/// Kind of incentive a program pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    Rebate,
    Coop,
    Contest,
    Spiff,
}

impl ProgramType {
    pub const fn label(self) -> &'static str {
        match self {
            ProgramType::Rebate => "rebate",
            ProgramType::Coop => "coop",
            ProgramType::Contest => "contest",
            ProgramType::Spiff => "spiff",
        }
    }

    /// Program kinds whose accruals are computed by the batch runner.
    pub const fn accrues(self) -> bool {
        matches!(self, ProgramType::Rebate | ProgramType::Coop)
    }
}

/// Program lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl ProgramStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProgramStatus::Draft => "draft",
            ProgramStatus::Active => "active",
            ProgramStatus::Paused => "paused",
            ProgramStatus::Completed => "completed",
            ProgramStatus::Cancelled => "cancelled",
        }
    }

    /// Legal lifecycle edges. Completed and Cancelled are terminal.
    pub const fn can_transition(self, next: ProgramStatus) -> bool {
        matches!(
            (self, next),
            (ProgramStatus::Draft, ProgramStatus::Active)
                | (ProgramStatus::Active, ProgramStatus::Paused)
                | (ProgramStatus::Active, ProgramStatus::Completed)
                | (ProgramStatus::Active, ProgramStatus::Cancelled)
                | (ProgramStatus::Paused, ProgramStatus::Active)
                | (ProgramStatus::Paused, ProgramStatus::Cancelled)
        )
    }
}

/// A volume threshold mapping to a rebate rate. Tiers form a step function
/// over qualifying volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub min_volume: Decimal,
    pub max_volume: Option<Decimal>,
    pub rate: Decimal,
}

/// Rate definition: a single flat fraction or an ordered tier ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateRules {
    Flat(Decimal),
    Tiered(Vec<Tier>),
}

/// Structured rate ruleset owned by a program, with optional payout caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRuleset {
    pub rules: RateRules,
    pub max_payout: Option<Decimal>,
    pub max_payout_per_dealer: Option<Decimal>,
}

/// Who may enroll. Empty lists mean no restriction on that axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub dealer_tiers: Vec<String>,
    pub regions: Vec<String>,
    pub minimum_order_volume: Option<Decimal>,
}

/// An incentive program definition. Owns its rate ruleset by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub code: String,
    pub name: String,
    pub program_type: ProgramType,
    pub status: ProgramStatus,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub enrollment_deadline: Option<NaiveDate>,
    pub eligibility: Eligibility,
    pub rates: RateRuleset,
    pub budget_cap: Option<Decimal>,
    pub spent_to_date: Decimal,
    pub auto_enroll: bool,
    pub approval_required: bool,
}

/// Dealer attributes checked against program eligibility at enrollment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerProfile {
    pub dealer_id: DealerId,
    pub tier: Option<String>,
    pub region: Option<String>,
}

/// Participation status of a dealer in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Suspended,
    Withdrawn,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Suspended => "suspended",
            EnrollmentStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn can_transition(self, next: EnrollmentStatus) -> bool {
        matches!(
            (self, next),
            (EnrollmentStatus::Pending, EnrollmentStatus::Active)
                | (EnrollmentStatus::Pending, EnrollmentStatus::Withdrawn)
                | (EnrollmentStatus::Active, EnrollmentStatus::Suspended)
                | (EnrollmentStatus::Active, EnrollmentStatus::Withdrawn)
                | (EnrollmentStatus::Suspended, EnrollmentStatus::Active)
                | (EnrollmentStatus::Suspended, EnrollmentStatus::Withdrawn)
        )
    }
}

/// One dealer's participation record, holding the running program-ledger
/// balances. These fields are the single source of truth for how much the
/// dealer has accrued and been paid under the program; only the batch runner
/// touches `accrued_amount` and only the payout processor touches
/// `paid_amount`/`pending_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub dealer_id: DealerId,
    pub program_id: ProgramId,
    pub status: EnrollmentStatus,
    pub enrolled_on: NaiveDate,
    pub accrued_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub tier_achieved: Option<String>,
    pub tier_progress: u8,
}

impl Enrollment {
    pub fn new(
        dealer_id: DealerId,
        program_id: ProgramId,
        status: EnrollmentStatus,
        enrolled_on: NaiveDate,
    ) -> Self {
        Self {
            dealer_id,
            program_id,
            status,
            enrolled_on,
            accrued_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            pending_amount: Decimal::ZERO,
            tier_achieved: None,
            tier_progress: 0,
        }
    }
}

/// Accrual row status. Strictly monotonic: a finalized or paid row never
/// returns to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualStatus {
    Calculated,
    Finalized,
    Paid,
}

impl AccrualStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AccrualStatus::Calculated => "calculated",
            AccrualStatus::Finalized => "finalized",
            AccrualStatus::Paid => "paid",
        }
    }

    pub const fn can_transition(self, next: AccrualStatus) -> bool {
        matches!(
            (self, next),
            (AccrualStatus::Calculated, AccrualStatus::Finalized)
                | (AccrualStatus::Finalized, AccrualStatus::Paid)
        )
    }
}

/// One dealer's computed accrual for one period under one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebateAccrual {
    pub program_id: ProgramId,
    pub dealer_id: DealerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub qualifying_volume: Decimal,
    pub rebate_rate: Decimal,
    pub accrued_amount: Decimal,
    pub final_amount: Decimal,
    pub tier_achieved: Option<String>,
    pub status: AccrualStatus,
}

impl RebateAccrual {
    pub fn key(&self) -> AccrualKey {
        AccrualKey {
            program_id: self.program_id.clone(),
            dealer_id: self.dealer_id.clone(),
            period_start: self.period_start,
        }
    }
}

/// Kind of reimbursement a dealer is requesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Coop,
    Spiff,
    Contest,
}

impl ClaimType {
    pub const fn label(self) -> &'static str {
        match self {
            ClaimType::Coop => "coop",
            ClaimType::Spiff => "spiff",
            ClaimType::Contest => "contest",
        }
    }

    /// Claims draw against the matching program kind only.
    pub const fn matches(self, program_type: ProgramType) -> bool {
        matches!(
            (self, program_type),
            (ClaimType::Coop, ProgramType::Coop)
                | (ClaimType::Spiff, ProgramType::Spiff)
                | (ClaimType::Contest, ProgramType::Contest)
        )
    }
}

/// Pointer to supporting proof held in external document storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub name: String,
    pub storage_key: String,
}

/// Claim workflow status. Denied is terminal; approved claims move to paid
/// through the payout processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Denied,
    Paid,
}

impl ClaimStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClaimStatus::Draft => "draft",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Paid => "paid",
        }
    }

    pub const fn can_transition(self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::Draft, ClaimStatus::Submitted)
                | (ClaimStatus::Submitted, ClaimStatus::UnderReview)
                | (ClaimStatus::Submitted, ClaimStatus::Approved)
                | (ClaimStatus::Submitted, ClaimStatus::Denied)
                | (ClaimStatus::UnderReview, ClaimStatus::Approved)
                | (ClaimStatus::UnderReview, ClaimStatus::Denied)
                | (ClaimStatus::Approved, ClaimStatus::Paid)
        )
    }
}

/// A dealer-submitted reimbursement request. `approved_amount` is populated
/// exactly when the claim reaches Approved (and carries through Paid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentiveClaim {
    pub id: ClaimId,
    pub claim_number: Option<String>,
    pub program_id: ProgramId,
    pub dealer_id: DealerId,
    pub claim_type: ClaimType,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub status: ClaimStatus,
    pub description: String,
    pub documents: Vec<DocumentRef>,
    pub submitted_on: Option<NaiveDate>,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,
    pub denial_reason: Option<String>,
    pub approved_on: Option<NaiveDate>,
}

/// What a payout record settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutType {
    ClaimReimbursement,
    RebateAccrual,
}

impl PayoutType {
    pub const fn label(self) -> &'static str {
        match self {
            PayoutType::ClaimReimbursement => "claim_reimbursement",
            PayoutType::RebateAccrual => "rebate_accrual",
        }
    }
}

/// The record a payout settles against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutSource {
    Claim(ClaimId),
    Accrual(AccrualKey),
}

/// Payout processing status. Completed is terminal; a failed payout may be
/// retried until it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }

    pub const fn can_transition(self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Processing)
                | (PayoutStatus::Pending, PayoutStatus::Completed)
                | (PayoutStatus::Pending, PayoutStatus::Failed)
                | (PayoutStatus::Processing, PayoutStatus::Completed)
                | (PayoutStatus::Processing, PayoutStatus::Failed)
                | (PayoutStatus::Failed, PayoutStatus::Processing)
                | (PayoutStatus::Failed, PayoutStatus::Completed)
        )
    }
}

/// A scheduled or settled transfer of funds to a dealer.
/// `reference_number` and `paid_date` are set together, only on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentivePayout {
    pub id: PayoutId,
    pub program_id: ProgramId,
    pub dealer_id: DealerId,
    pub amount: Decimal,
    pub payout_type: PayoutType,
    pub source: PayoutSource,
    pub status: PayoutStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
}
