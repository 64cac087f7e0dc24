use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use super::accrual::{AccrualEngine, AccrualPeriod, PeriodError, PeriodSpec};
use super::domain::{
    AccrualKey, AccrualStatus, DealerId, Enrollment, EnrollmentStatus, Program, ProgramId,
    ProgramStatus, RebateAccrual,
};
use super::repository::{IncentiveRepository, RepositoryError};
use super::volume::VolumeSource;

/// Error aborting a batch operation before any dealer is touched.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("program not found")]
    ProgramNotFound,
    #[error("program is not eligible for accrual runs: {0}")]
    ProgramNotEligible(&'static str),
    #[error(transparent)]
    Period(#[from] PeriodError),
    #[error("finalizing would push the program past its payout cap of {cap}")]
    ProgramBudgetExceeded { cap: Decimal },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Per-dealer failure collected without aborting the run.
#[derive(Debug, Clone, Serialize)]
pub struct DealerFailure {
    pub dealer_id: DealerId,
    pub reason: String,
}

/// Outcome of one accrual batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub program_id: ProgramId,
    pub period: AccrualPeriod,
    pub processed_count: usize,
    pub total_accrued: Decimal,
    pub errors: Vec<DealerFailure>,
}

/// Outcome of locking a period range for payout.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeSummary {
    pub count: usize,
    pub total_amount: Decimal,
}

/// Accrual counts and totals for one period bucket.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodAccrualSummary {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub calculated: usize,
    pub finalized: usize,
    pub paid: usize,
    pub accrued_total: Decimal,
    pub final_total: Decimal,
}

/// Orchestrates the accrual calculator across a program's active
/// enrollments. One dealer's failure never stops the others; the summary
/// carries the per-dealer reasons back to the caller.
pub struct BatchAccrualRunner<R, V> {
    repository: Arc<R>,
    volumes: Arc<V>,
}

impl<R, V> BatchAccrualRunner<R, V>
where
    R: IncentiveRepository + 'static,
    V: VolumeSource + 'static,
{
    pub fn new(repository: Arc<R>, volumes: Arc<V>) -> Self {
        Self {
            repository,
            volumes,
        }
    }

    /// Compute accruals for every active enrollment in the resolved period.
    ///
    /// Existing rows for the `(program, dealer, period_start)` key are
    /// skipped with a per-dealer error unless `recalculate` is set, and even
    /// then only rows still in `Calculated` are recomputed; finalized and
    /// paid rows stay locked. Enrollment balances are adjusted by the delta
    /// against the previous row so re-runs never double-count.
    pub fn run_batch(
        &self,
        program_id: &ProgramId,
        spec: &PeriodSpec,
        recalculate: bool,
    ) -> Result<BatchSummary, BatchError> {
        let program = self
            .repository
            .fetch_program(program_id)?
            .ok_or(BatchError::ProgramNotFound)?;

        if !program.program_type.accrues() {
            return Err(BatchError::ProgramNotEligible(
                "only rebate and co-op programs accrue",
            ));
        }
        if program.status != ProgramStatus::Active {
            return Err(BatchError::ProgramNotEligible("program is not active"));
        }

        let period = spec.resolve()?;
        let engine = AccrualEngine::new(program.rates.clone());

        let mut summary = BatchSummary {
            program_id: program_id.clone(),
            period,
            processed_count: 0,
            total_accrued: Decimal::ZERO,
            errors: Vec::new(),
        };

        for enrollment in self.repository.enrollments_for_program(program_id)? {
            if enrollment.status != EnrollmentStatus::Active {
                continue;
            }

            let dealer_id = enrollment.dealer_id.clone();
            match self.process_dealer(&program, &engine, enrollment, &period, recalculate) {
                Ok(accrued) => {
                    summary.processed_count += 1;
                    summary.total_accrued += accrued;
                }
                Err(reason) => summary.errors.push(DealerFailure { dealer_id, reason }),
            }
        }

        info!(
            program = %program.code,
            period_start = %period.start,
            processed = summary.processed_count,
            failed = summary.errors.len(),
            "accrual batch finished"
        );
        Ok(summary)
    }

    fn process_dealer(
        &self,
        program: &Program,
        engine: &AccrualEngine,
        mut enrollment: Enrollment,
        period: &AccrualPeriod,
        recalculate: bool,
    ) -> Result<Decimal, String> {
        let key = AccrualKey {
            program_id: program.id.clone(),
            dealer_id: enrollment.dealer_id.clone(),
            period_start: period.start,
        };
        let existing = self
            .repository
            .fetch_accrual(&key)
            .map_err(|err| err.to_string())?;

        if let Some(existing) = &existing {
            if !recalculate {
                return Err(format!(
                    "duplicate accrual: row already {} for period starting {}",
                    existing.status.label(),
                    period.start
                ));
            }
            if existing.status != AccrualStatus::Calculated {
                return Err(format!(
                    "accrual is {} and locked against recalculation",
                    existing.status.label()
                ));
            }
        }

        let volume = self
            .volumes
            .qualifying_volume(program, &enrollment.dealer_id, period)
            .map_err(|err| err.to_string())?;
        let breakdown = engine.evaluate(volume);

        let row = RebateAccrual {
            program_id: program.id.clone(),
            dealer_id: enrollment.dealer_id.clone(),
            period_start: period.start,
            period_end: period.end,
            qualifying_volume: volume,
            rebate_rate: breakdown.rate,
            accrued_amount: breakdown.accrued_amount,
            final_amount: breakdown.final_amount,
            tier_achieved: breakdown.tier_achieved.clone(),
            status: AccrualStatus::Calculated,
        };

        let previous_final = existing
            .as_ref()
            .map(|accrual| accrual.final_amount)
            .unwrap_or(Decimal::ZERO);
        let write = if existing.is_some() {
            self.repository.update_accrual(row)
        } else {
            self.repository.insert_accrual(row)
        };
        write.map_err(|err| err.to_string())?;

        enrollment.accrued_amount += breakdown.final_amount - previous_final;
        enrollment.tier_achieved = breakdown.tier_achieved;
        enrollment.tier_progress = breakdown.tier_progress;
        self.repository
            .update_enrollment(enrollment)
            .map_err(|err| err.to_string())?;

        Ok(breakdown.accrued_amount)
    }

    /// Lock every `Calculated` accrual in the range for payout. When the
    /// program carries a program-wide payout cap, the whole range is refused
    /// if locking it would exceed the cap.
    pub fn finalize(
        &self,
        program_id: &ProgramId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<FinalizeSummary, BatchError> {
        let program = self
            .repository
            .fetch_program(program_id)?
            .ok_or(BatchError::ProgramNotFound)?;

        let in_range = self
            .repository
            .accruals_in_range(program_id, period_start, period_end)?;
        let candidates: Vec<RebateAccrual> = in_range
            .into_iter()
            .filter(|accrual| accrual.status == AccrualStatus::Calculated)
            .collect();
        let locking_total: Decimal = candidates
            .iter()
            .map(|accrual| accrual.final_amount)
            .sum();

        if let Some(cap) = program.rates.max_payout {
            let already_locked: Decimal = self
                .repository
                .accruals_for_program(program_id)?
                .iter()
                .filter(|accrual| accrual.status != AccrualStatus::Calculated)
                .map(|accrual| accrual.final_amount)
                .sum();
            if already_locked + locking_total > cap {
                return Err(BatchError::ProgramBudgetExceeded { cap });
            }
        }

        let count = candidates.len();
        for mut accrual in candidates {
            accrual.status = AccrualStatus::Finalized;
            self.repository.update_accrual(accrual)?;
        }

        info!(
            program = %program.code,
            count,
            total = %locking_total,
            "accruals finalized for payout"
        );
        Ok(FinalizeSummary {
            count,
            total_amount: locking_total,
        })
    }

    /// Aggregate counts and amounts by period bucket across the program.
    pub fn accrual_summary(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<PeriodAccrualSummary>, BatchError> {
        if self.repository.fetch_program(program_id)?.is_none() {
            return Err(BatchError::ProgramNotFound);
        }

        let mut buckets: BTreeMap<NaiveDate, PeriodAccrualSummary> = BTreeMap::new();
        for accrual in self.repository.accruals_for_program(program_id)? {
            let bucket = buckets
                .entry(accrual.period_start)
                .or_insert_with(|| PeriodAccrualSummary {
                    period_start: accrual.period_start,
                    period_end: accrual.period_end,
                    calculated: 0,
                    finalized: 0,
                    paid: 0,
                    accrued_total: Decimal::ZERO,
                    final_total: Decimal::ZERO,
                });

            match accrual.status {
                AccrualStatus::Calculated => bucket.calculated += 1,
                AccrualStatus::Finalized => bucket.finalized += 1,
                AccrualStatus::Paid => bucket.paid += 1,
            }
            bucket.accrued_total += accrual.accrued_amount;
            bucket.final_total += accrual.final_amount;
        }

        Ok(buckets.into_values().collect())
    }
}
