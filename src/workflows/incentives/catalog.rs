use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::domain::{
    DealerId, DealerProfile, Eligibility, Enrollment, EnrollmentStatus, Program, ProgramId,
    ProgramStatus, ProgramType, RateRules, RateRuleset,
};
use super::repository::{IncentiveRepository, RepositoryError};

static PROGRAM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_program_id() -> ProgramId {
    let id = PROGRAM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ProgramId(format!("prog-{id:06}"))
}

/// Inbound definition for a new program. The catalog assigns the identifier
/// and starts the lifecycle in Draft.
#[derive(Debug, Clone)]
pub struct NewProgram {
    pub code: String,
    pub name: String,
    pub program_type: ProgramType,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub enrollment_deadline: Option<NaiveDate>,
    pub eligibility: Eligibility,
    pub rates: RateRuleset,
    pub budget_cap: Option<Decimal>,
    pub auto_enroll: bool,
    pub approval_required: bool,
}

/// Field updates for an existing program. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProgramUpdate {
    pub name: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub enrollment_deadline: Option<NaiveDate>,
    pub eligibility: Option<Eligibility>,
    pub rates: Option<RateRuleset>,
    pub budget_cap: Option<Decimal>,
    pub auto_enroll: Option<bool>,
    pub approval_required: Option<bool>,
}

/// Lifecycle action requested by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramAction {
    Activate,
    Pause,
    Complete,
    Cancel,
}

impl ProgramAction {
    pub const fn target(self) -> ProgramStatus {
        match self {
            ProgramAction::Activate => ProgramStatus::Active,
            ProgramAction::Pause => ProgramStatus::Paused,
            ProgramAction::Complete => ProgramStatus::Completed,
            ProgramAction::Cancel => ProgramStatus::Cancelled,
        }
    }
}

/// Error raised by catalog and enrollment operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("program not found")]
    ProgramNotFound,
    #[error("program code '{0}' is already in use")]
    CodeInUse(String),
    #[error("invalid rate ruleset: {0}")]
    InvalidRuleset(&'static str),
    #[error("invalid program dates: {0}")]
    InvalidDates(&'static str),
    #[error("illegal program transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("completed or cancelled programs cannot be updated")]
    ProgramClosed,
    #[error("rate rules can only change while the program is in draft")]
    RulesLocked,
    #[error("only draft programs can be deleted")]
    NotDraft,
    #[error("program has enrollments, claims, or payouts and cannot be deleted")]
    HasDependents,
    #[error("program is not open for enrollment")]
    ProgramNotOpen,
    #[error("enrollment window closed on {0}")]
    EnrollmentClosed(NaiveDate),
    #[error("dealer is not eligible: {0}")]
    NotEligible(&'static str),
    #[error("dealer is already enrolled in this program")]
    AlreadyEnrolled,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("illegal enrollment transition {from} -> {to}")]
    InvalidEnrollmentTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Service owning program definitions and dealer enrollments.
pub struct ProgramCatalog<R> {
    repository: Arc<R>,
}

impl<R> ProgramCatalog<R>
where
    R: IncentiveRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Validate and persist a new program in Draft status.
    pub fn create_program(&self, definition: NewProgram) -> Result<Program, CatalogError> {
        validate_ruleset(&definition.rates)?;
        validate_dates(
            definition.starts_on,
            definition.ends_on,
            definition.enrollment_deadline,
        )?;

        if self
            .repository
            .fetch_program_by_code(&definition.code)?
            .is_some()
        {
            return Err(CatalogError::CodeInUse(definition.code));
        }

        let program = Program {
            id: next_program_id(),
            code: definition.code,
            name: definition.name,
            program_type: definition.program_type,
            status: ProgramStatus::Draft,
            starts_on: definition.starts_on,
            ends_on: definition.ends_on,
            enrollment_deadline: definition.enrollment_deadline,
            eligibility: definition.eligibility,
            rates: definition.rates,
            budget_cap: definition.budget_cap,
            spent_to_date: Decimal::ZERO,
            auto_enroll: definition.auto_enroll,
            approval_required: definition.approval_required,
        };

        Ok(self.repository.insert_program(program)?)
    }

    /// Apply field updates. Rate rules are locked once the program leaves
    /// Draft; terminal programs accept no changes at all.
    pub fn update_program(
        &self,
        program_id: &ProgramId,
        update: ProgramUpdate,
    ) -> Result<Program, CatalogError> {
        let mut program = self.fetch_program(program_id)?;

        if matches!(
            program.status,
            ProgramStatus::Completed | ProgramStatus::Cancelled
        ) {
            return Err(CatalogError::ProgramClosed);
        }

        if let Some(rates) = update.rates {
            if program.status != ProgramStatus::Draft {
                return Err(CatalogError::RulesLocked);
            }
            validate_ruleset(&rates)?;
            program.rates = rates;
        }

        if let Some(name) = update.name {
            program.name = name;
        }
        if let Some(starts_on) = update.starts_on {
            program.starts_on = starts_on;
        }
        if let Some(ends_on) = update.ends_on {
            program.ends_on = Some(ends_on);
        }
        if let Some(deadline) = update.enrollment_deadline {
            program.enrollment_deadline = Some(deadline);
        }
        if let Some(eligibility) = update.eligibility {
            program.eligibility = eligibility;
        }
        if let Some(budget_cap) = update.budget_cap {
            program.budget_cap = Some(budget_cap);
        }
        if let Some(auto_enroll) = update.auto_enroll {
            program.auto_enroll = auto_enroll;
        }
        if let Some(approval_required) = update.approval_required {
            program.approval_required = approval_required;
        }

        validate_dates(
            program.starts_on,
            program.ends_on,
            program.enrollment_deadline,
        )?;

        self.repository.update_program(program.clone())?;
        Ok(program)
    }

    /// Move the program along its lifecycle via the static transition table.
    pub fn change_status(
        &self,
        program_id: &ProgramId,
        action: ProgramAction,
    ) -> Result<Program, CatalogError> {
        let mut program = self.fetch_program(program_id)?;
        let target = action.target();

        if !program.status.can_transition(target) {
            return Err(CatalogError::InvalidTransition {
                from: program.status.label(),
                to: target.label(),
            });
        }

        program.status = target;
        self.repository.update_program(program.clone())?;
        Ok(program)
    }

    /// Delete a program. Permitted only while Draft and with no enrollments,
    /// claims, or payouts referencing it.
    pub fn delete_program(&self, program_id: &ProgramId) -> Result<(), CatalogError> {
        let program = self.fetch_program(program_id)?;

        if program.status != ProgramStatus::Draft {
            return Err(CatalogError::NotDraft);
        }
        if self.repository.program_has_dependents(program_id)? {
            return Err(CatalogError::HasDependents);
        }

        self.repository.delete_program(program_id)?;
        Ok(())
    }

    /// Enroll a dealer. The enrollment starts Pending when the program
    /// requires approval, otherwise Active immediately.
    pub fn enroll(
        &self,
        profile: &DealerProfile,
        program_id: &ProgramId,
        requested_on: NaiveDate,
    ) -> Result<Enrollment, CatalogError> {
        let program = self.fetch_program(program_id)?;

        if program.status != ProgramStatus::Active {
            return Err(CatalogError::ProgramNotOpen);
        }
        if let Some(deadline) = program.enrollment_deadline {
            if requested_on > deadline {
                return Err(CatalogError::EnrollmentClosed(deadline));
            }
        }
        check_eligibility(&program.eligibility, profile)?;

        if self
            .repository
            .fetch_enrollment(&profile.dealer_id, program_id)?
            .is_some()
        {
            return Err(CatalogError::AlreadyEnrolled);
        }

        let status = if program.approval_required {
            EnrollmentStatus::Pending
        } else {
            EnrollmentStatus::Active
        };
        let enrollment = Enrollment::new(
            profile.dealer_id.clone(),
            program_id.clone(),
            status,
            requested_on,
        );

        match self.repository.insert_enrollment(enrollment) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict) => Err(CatalogError::AlreadyEnrolled),
            Err(other) => Err(other.into()),
        }
    }

    pub fn approve_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Enrollment, CatalogError> {
        self.transition_enrollment(dealer_id, program_id, EnrollmentStatus::Active)
    }

    pub fn suspend_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Enrollment, CatalogError> {
        self.transition_enrollment(dealer_id, program_id, EnrollmentStatus::Suspended)
    }

    pub fn reinstate_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Enrollment, CatalogError> {
        self.transition_enrollment(dealer_id, program_id, EnrollmentStatus::Active)
    }

    /// Dealer-initiated withdrawal. Withdrawn enrollments are kept, never
    /// deleted, so historical balances stay attributable.
    pub fn withdraw_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Enrollment, CatalogError> {
        self.transition_enrollment(dealer_id, program_id, EnrollmentStatus::Withdrawn)
    }

    fn transition_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
        target: EnrollmentStatus,
    ) -> Result<Enrollment, CatalogError> {
        let mut enrollment = self
            .repository
            .fetch_enrollment(dealer_id, program_id)?
            .ok_or(CatalogError::EnrollmentNotFound)?;

        if !enrollment.status.can_transition(target) {
            return Err(CatalogError::InvalidEnrollmentTransition {
                from: enrollment.status.label(),
                to: target.label(),
            });
        }

        enrollment.status = target;
        self.repository.update_enrollment(enrollment.clone())?;
        Ok(enrollment)
    }

    pub fn list_programs(&self) -> Result<Vec<Program>, CatalogError> {
        Ok(self.repository.programs()?)
    }

    fn fetch_program(&self, program_id: &ProgramId) -> Result<Program, CatalogError> {
        self.repository
            .fetch_program(program_id)?
            .ok_or(CatalogError::ProgramNotFound)
    }
}

/// A ruleset defines either a positive flat rate or a non-empty ascending
/// tier ladder with distinct thresholds, never an all-zero ambiguity.
fn validate_ruleset(ruleset: &RateRuleset) -> Result<(), CatalogError> {
    match &ruleset.rules {
        RateRules::Flat(rate) => {
            if *rate <= Decimal::ZERO {
                return Err(CatalogError::InvalidRuleset("flat rate must be positive"));
            }
        }
        RateRules::Tiered(tiers) => {
            if tiers.is_empty() {
                return Err(CatalogError::InvalidRuleset("tier list is empty"));
            }
            for tier in tiers {
                if tier.rate < Decimal::ZERO {
                    return Err(CatalogError::InvalidRuleset("tier rate is negative"));
                }
                if tier.min_volume < Decimal::ZERO {
                    return Err(CatalogError::InvalidRuleset("tier threshold is negative"));
                }
                if let Some(max_volume) = tier.max_volume {
                    if max_volume <= tier.min_volume {
                        return Err(CatalogError::InvalidRuleset(
                            "tier max volume must exceed its threshold",
                        ));
                    }
                }
            }
            for pair in tiers.windows(2) {
                if pair[1].min_volume <= pair[0].min_volume {
                    return Err(CatalogError::InvalidRuleset(
                        "tier thresholds must be distinct and ascending",
                    ));
                }
            }
        }
    }

    for cap in [ruleset.max_payout, ruleset.max_payout_per_dealer]
        .into_iter()
        .flatten()
    {
        if cap <= Decimal::ZERO {
            return Err(CatalogError::InvalidRuleset(
                "payout caps must be positive when set",
            ));
        }
    }

    Ok(())
}

fn validate_dates(
    starts_on: NaiveDate,
    ends_on: Option<NaiveDate>,
    enrollment_deadline: Option<NaiveDate>,
) -> Result<(), CatalogError> {
    if let Some(ends_on) = ends_on {
        if ends_on < starts_on {
            return Err(CatalogError::InvalidDates("end date precedes start date"));
        }
        if let Some(deadline) = enrollment_deadline {
            if deadline > ends_on {
                return Err(CatalogError::InvalidDates(
                    "enrollment deadline falls after the program ends",
                ));
            }
        }
    }
    Ok(())
}

fn check_eligibility(
    eligibility: &Eligibility,
    profile: &DealerProfile,
) -> Result<(), CatalogError> {
    if !eligibility.dealer_tiers.is_empty() {
        let tier_allowed = profile
            .tier
            .as_ref()
            .map(|tier| eligibility.dealer_tiers.contains(tier))
            .unwrap_or(false);
        if !tier_allowed {
            return Err(CatalogError::NotEligible(
                "dealer tier is outside the program's tier list",
            ));
        }
    }

    if !eligibility.regions.is_empty() {
        let region_allowed = profile
            .region
            .as_ref()
            .map(|region| eligibility.regions.contains(region))
            .unwrap_or(false);
        if !region_allowed {
            return Err(CatalogError::NotEligible(
                "dealer region is outside the program's region list",
            ));
        }
    }

    Ok(())
}
