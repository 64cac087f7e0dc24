use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    AccrualKey, ClaimId, DealerId, Enrollment, IncentiveClaim, IncentivePayout, PayoutId, Program,
    ProgramId, RebateAccrual,
};
use super::repository::{IncentiveRepository, RepositoryError};

#[derive(Default)]
struct Store {
    programs: HashMap<ProgramId, Program>,
    enrollments: HashMap<(DealerId, ProgramId), Enrollment>,
    accruals: HashMap<AccrualKey, RebateAccrual>,
    claims: HashMap<ClaimId, IncentiveClaim>,
    payouts: HashMap<PayoutId, IncentivePayout>,
}

/// In-memory store backing the development server and the test suites. One
/// mutex guards all tables, so the multi-row payout completion write is
/// naturally transactional and check-then-insert sequences serialize.
#[derive(Default, Clone)]
pub struct InMemoryIncentiveRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryIncentiveRepository {
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IncentiveRepository for InMemoryIncentiveRepository {
    fn insert_program(&self, program: Program) -> Result<Program, RepositoryError> {
        let mut store = self.lock();
        if store.programs.contains_key(&program.id)
            || store.programs.values().any(|p| p.code == program.code)
        {
            return Err(RepositoryError::Conflict);
        }
        store.programs.insert(program.id.clone(), program.clone());
        Ok(program)
    }

    fn update_program(&self, program: Program) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        if !store.programs.contains_key(&program.id) {
            return Err(RepositoryError::NotFound);
        }
        store.programs.insert(program.id.clone(), program);
        Ok(())
    }

    fn fetch_program(&self, id: &ProgramId) -> Result<Option<Program>, RepositoryError> {
        Ok(self.lock().programs.get(id).cloned())
    }

    fn fetch_program_by_code(&self, code: &str) -> Result<Option<Program>, RepositoryError> {
        Ok(self
            .lock()
            .programs
            .values()
            .find(|program| program.code == code)
            .cloned())
    }

    fn delete_program(&self, id: &ProgramId) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        store
            .programs
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn programs(&self) -> Result<Vec<Program>, RepositoryError> {
        let mut programs: Vec<Program> = self.lock().programs.values().cloned().collect();
        programs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(programs)
    }

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError> {
        let mut store = self.lock();
        let key = (enrollment.dealer_id.clone(), enrollment.program_id.clone());
        if store.enrollments.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        store.enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        let key = (enrollment.dealer_id.clone(), enrollment.program_id.clone());
        if !store.enrollments.contains_key(&key) {
            return Err(RepositoryError::NotFound);
        }
        store.enrollments.insert(key, enrollment);
        Ok(())
    }

    fn fetch_enrollment(
        &self,
        dealer_id: &DealerId,
        program_id: &ProgramId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .lock()
            .enrollments
            .get(&(dealer_id.clone(), program_id.clone()))
            .cloned())
    }

    fn enrollments_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments: Vec<Enrollment> = self
            .lock()
            .enrollments
            .values()
            .filter(|enrollment| &enrollment.program_id == program_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| a.dealer_id.cmp(&b.dealer_id));
        Ok(enrollments)
    }

    fn enrollments_for_dealer(
        &self,
        dealer_id: &DealerId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments: Vec<Enrollment> = self
            .lock()
            .enrollments
            .values()
            .filter(|enrollment| &enrollment.dealer_id == dealer_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| a.program_id.cmp(&b.program_id));
        Ok(enrollments)
    }

    fn program_has_dependents(&self, program_id: &ProgramId) -> Result<bool, RepositoryError> {
        let store = self.lock();
        let has = store
            .enrollments
            .values()
            .any(|enrollment| &enrollment.program_id == program_id)
            || store
                .claims
                .values()
                .any(|claim| &claim.program_id == program_id)
            || store
                .payouts
                .values()
                .any(|payout| &payout.program_id == program_id);
        Ok(has)
    }

    fn insert_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        let key = accrual.key();
        if store.accruals.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        store.accruals.insert(key, accrual);
        Ok(())
    }

    fn update_accrual(&self, accrual: RebateAccrual) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        let key = accrual.key();
        if !store.accruals.contains_key(&key) {
            return Err(RepositoryError::NotFound);
        }
        store.accruals.insert(key, accrual);
        Ok(())
    }

    fn fetch_accrual(&self, key: &AccrualKey) -> Result<Option<RebateAccrual>, RepositoryError> {
        Ok(self.lock().accruals.get(key).cloned())
    }

    fn accruals_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<RebateAccrual>, RepositoryError> {
        let mut accruals: Vec<RebateAccrual> = self
            .lock()
            .accruals
            .values()
            .filter(|accrual| &accrual.program_id == program_id)
            .cloned()
            .collect();
        accruals.sort_by(|a, b| {
            (a.period_start, &a.dealer_id).cmp(&(b.period_start, &b.dealer_id))
        });
        Ok(accruals)
    }

    fn insert_claim(&self, claim: IncentiveClaim) -> Result<IncentiveClaim, RepositoryError> {
        let mut store = self.lock();
        if store.claims.contains_key(&claim.id) {
            return Err(RepositoryError::Conflict);
        }
        store.claims.insert(claim.id.clone(), claim.clone());
        Ok(claim)
    }

    fn update_claim(&self, claim: IncentiveClaim) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        if !store.claims.contains_key(&claim.id) {
            return Err(RepositoryError::NotFound);
        }
        store.claims.insert(claim.id.clone(), claim);
        Ok(())
    }

    fn fetch_claim(&self, id: &ClaimId) -> Result<Option<IncentiveClaim>, RepositoryError> {
        Ok(self.lock().claims.get(id).cloned())
    }

    fn claims_for_dealer(
        &self,
        program_id: &ProgramId,
        dealer_id: &DealerId,
    ) -> Result<Vec<IncentiveClaim>, RepositoryError> {
        Ok(self
            .lock()
            .claims
            .values()
            .filter(|claim| &claim.program_id == program_id && &claim.dealer_id == dealer_id)
            .cloned()
            .collect())
    }

    fn max_claim_sequence(&self, year: i32) -> Result<u32, RepositoryError> {
        let prefix = format!("CLM-{year}-");
        let max = self
            .lock()
            .claims
            .values()
            .filter_map(|claim| claim.claim_number.as_deref())
            .filter_map(|number| number.strip_prefix(&prefix))
            .filter_map(|sequence| sequence.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(max)
    }

    fn insert_payout(&self, payout: IncentivePayout) -> Result<IncentivePayout, RepositoryError> {
        let mut store = self.lock();
        if store.payouts.contains_key(&payout.id) {
            return Err(RepositoryError::Conflict);
        }
        store.payouts.insert(payout.id.clone(), payout.clone());
        Ok(payout)
    }

    fn update_payout(&self, payout: IncentivePayout) -> Result<(), RepositoryError> {
        let mut store = self.lock();
        if !store.payouts.contains_key(&payout.id) {
            return Err(RepositoryError::NotFound);
        }
        store.payouts.insert(payout.id.clone(), payout);
        Ok(())
    }

    fn fetch_payout(&self, id: &PayoutId) -> Result<Option<IncentivePayout>, RepositoryError> {
        Ok(self.lock().payouts.get(id).cloned())
    }

    fn complete_payout(
        &self,
        payout: IncentivePayout,
        enrollment: Enrollment,
    ) -> Result<(), RepositoryError> {
        // Both rows change under one lock acquisition; either both land or
        // neither does.
        let mut store = self.lock();
        if !store.payouts.contains_key(&payout.id) {
            return Err(RepositoryError::NotFound);
        }
        let enrollment_key = (enrollment.dealer_id.clone(), enrollment.program_id.clone());
        if !store.enrollments.contains_key(&enrollment_key) {
            return Err(RepositoryError::NotFound);
        }

        store.payouts.insert(payout.id.clone(), payout);
        store.enrollments.insert(enrollment_key, enrollment);
        Ok(())
    }

    fn accruals_in_range(
        &self,
        program_id: &ProgramId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RebateAccrual>, RepositoryError> {
        Ok(self
            .lock()
            .accruals
            .values()
            .filter(|accrual| {
                &accrual.program_id == program_id
                    && accrual.period_start >= start
                    && accrual.period_start <= end
            })
            .cloned()
            .collect())
    }
}
