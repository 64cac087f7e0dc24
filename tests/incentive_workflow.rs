//! End-to-end scenarios for the incentive engine, exercised through the
//! public service facade and the HTTP router so accrual, claim, and payout
//! behavior is validated without reaching into private modules.

mod common {
    use std::io::Cursor;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use dealer_incentives::workflows::incentives::{
        BatchAccrualRunner, ClaimService, CoopFundTracker, CsvVolumeFeed, InMemoryIncentiveRepository,
        NewProgram, PayoutService, Program, ProgramAction, ProgramCatalog, ProgramType, RateRules,
        RateRuleset, Tier,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub(super) struct Stack {
        pub(super) repository: Arc<InMemoryIncentiveRepository>,
        pub(super) catalog: ProgramCatalog<InMemoryIncentiveRepository>,
        pub(super) runner: BatchAccrualRunner<InMemoryIncentiveRepository, CsvVolumeFeed>,
        pub(super) claims: ClaimService<InMemoryIncentiveRepository>,
        pub(super) payouts: PayoutService<InMemoryIncentiveRepository>,
        pub(super) coop: CoopFundTracker<InMemoryIncentiveRepository>,
    }

    /// Build the full service stack over one in-memory store, hydrating the
    /// volume feed from an order-system CSV extract.
    pub(super) fn stack(volume_csv: &str) -> Stack {
        let repository = Arc::new(InMemoryIncentiveRepository::default());
        let volumes =
            CsvVolumeFeed::from_reader(Cursor::new(volume_csv.to_string())).expect("feed parses");

        Stack {
            catalog: ProgramCatalog::new(repository.clone()),
            runner: BatchAccrualRunner::new(repository.clone(), Arc::new(volumes)),
            claims: ClaimService::new(repository.clone()),
            payouts: PayoutService::new(repository.clone()),
            coop: CoopFundTracker::new(repository.clone()),
            repository,
        }
    }

    pub(super) fn tiered_rates() -> RateRuleset {
        RateRuleset {
            rules: RateRules::Tiered(vec![
                Tier {
                    name: "Base".to_string(),
                    min_volume: Decimal::ZERO,
                    max_volume: None,
                    rate: dec!(0.01),
                },
                Tier {
                    name: "Silver".to_string(),
                    min_volume: dec!(10000),
                    max_volume: None,
                    rate: dec!(0.02),
                },
                Tier {
                    name: "Gold".to_string(),
                    min_volume: dec!(50000),
                    max_volume: None,
                    rate: dec!(0.03),
                },
            ]),
            max_payout: None,
            max_payout_per_dealer: None,
        }
    }

    pub(super) fn flat_rates(rate: Decimal) -> RateRuleset {
        RateRuleset {
            rules: RateRules::Flat(rate),
            max_payout: None,
            max_payout_per_dealer: None,
        }
    }

    pub(super) fn launch_program(
        stack: &Stack,
        code: &str,
        program_type: ProgramType,
        rates: RateRuleset,
    ) -> Program {
        let program = stack
            .catalog
            .create_program(NewProgram {
                code: code.to_string(),
                name: format!("{code} program"),
                program_type,
                starts_on: date(2026, 1, 1),
                ends_on: Some(date(2026, 12, 31)),
                enrollment_deadline: None,
                eligibility: Default::default(),
                rates,
                budget_cap: None,
                auto_enroll: false,
                approval_required: false,
            })
            .expect("program creates");
        stack
            .catalog
            .change_status(&program.id, ProgramAction::Activate)
            .expect("program activates")
    }
}

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tower::ServiceExt;

use dealer_incentives::workflows::incentives::{
    incentive_router, AccrualKey, AccrualStatus, ClaimError, ClaimStatus, ClaimSubmission,
    ClaimType, CsvVolumeFeed, DealerId, DealerProfile, IncentiveGateway,
    InMemoryIncentiveRepository, PayoutStatus, PeriodSpec, PeriodType, ProgramType, ReviewCommand,
    ReviewDecision, IncentiveRepository,
};

#[test]
fn rebate_program_accrues_finalizes_and_pays_out() {
    let stack = stack("program,dealer,period_start,volume\nREB-26,d-100,2026-03-01,60000\n");
    let program = launch_program(&stack, "REB-26", ProgramType::Rebate, tiered_rates());
    let dealer = DealerProfile {
        dealer_id: DealerId("d-100".to_string()),
        tier: None,
        region: None,
    };
    stack
        .catalog
        .enroll(&dealer, &program.id, date(2026, 1, 5))
        .expect("dealer enrolls");

    let summary = stack
        .runner
        .run_batch(
            &program.id,
            &PeriodSpec::Named {
                period: PeriodType::Monthly,
                reference: date(2026, 3, 15),
            },
            false,
        )
        .expect("batch runs");
    assert_eq!(summary.processed_count, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.total_accrued, dec!(1800.00));

    let finalized = stack
        .runner
        .finalize(&program.id, date(2026, 3, 1), date(2026, 3, 31))
        .expect("period finalizes");
    assert_eq!(finalized.count, 1);
    assert_eq!(finalized.total_amount, dec!(1800.00));

    let key = AccrualKey {
        program_id: program.id.clone(),
        dealer_id: dealer.dealer_id.clone(),
        period_start: date(2026, 3, 1),
    };
    let payout = stack
        .payouts
        .create_from_accrual(&key, Some(date(2026, 4, 5)))
        .expect("payout schedules");
    let payout = stack
        .payouts
        .process(&payout.id, "ACH-20260405-777", date(2026, 4, 5))
        .expect("payout settles");
    assert_eq!(payout.status, PayoutStatus::Completed);

    let accrual = stack
        .repository
        .fetch_accrual(&key)
        .expect("fetch succeeds")
        .expect("accrual present");
    assert_eq!(accrual.status, AccrualStatus::Paid);

    let enrollment = stack
        .repository
        .fetch_enrollment(&dealer.dealer_id, &program.id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(enrollment.paid_amount, dec!(1800.00));
    assert_eq!(enrollment.pending_amount, Decimal::ZERO);
    assert_eq!(enrollment.accrued_amount, dec!(1800.00));
}

#[test]
fn coop_claims_draw_down_the_fund_and_settle_through_payouts() {
    let stack = stack("program,dealer,period_start,volume\nCOOP-26,d-200,2026-03-01,50000\n");
    let program = launch_program(&stack, "COOP-26", ProgramType::Coop, flat_rates(dec!(0.02)));
    let dealer = DealerProfile {
        dealer_id: DealerId("d-200".to_string()),
        tier: None,
        region: None,
    };
    stack
        .catalog
        .enroll(&dealer, &program.id, date(2026, 1, 5))
        .expect("dealer enrolls");

    stack
        .runner
        .run_batch(
            &program.id,
            &PeriodSpec::Named {
                period: PeriodType::Monthly,
                reference: date(2026, 3, 15),
            },
            false,
        )
        .expect("batch runs");

    let balance = stack
        .coop
        .balance(&dealer.dealer_id, &program.id)
        .expect("balance reads");
    assert_eq!(balance.available, dec!(1000.00));

    let claim = stack
        .claims
        .submit(ClaimSubmission {
            dealer_id: dealer.dealer_id.clone(),
            program_id: program.id.clone(),
            claim_type: ClaimType::Coop,
            requested_amount: dec!(400),
            description: "regional ad campaign".to_string(),
            documents: Vec::new(),
            submitted_on: date(2026, 4, 1),
        })
        .expect("claim submits");
    assert_eq!(claim.claim_number.as_deref(), Some("CLM-2026-00001"));

    stack
        .claims
        .start_review(&claim.id, "mgr-12")
        .expect("review starts");
    let claim = stack
        .claims
        .review(
            &claim.id,
            ReviewCommand {
                reviewer: "mgr-12".to_string(),
                decision: ReviewDecision::Approve,
                approved_amount: Some(dec!(350)),
                notes: Some("receipts verified".to_string()),
                denial_reason: None,
                decided_on: date(2026, 4, 3),
            },
        )
        .expect("claim approves");
    assert_eq!(claim.approved_amount, Some(dec!(350)));

    let balance = stack
        .coop
        .balance(&dealer.dealer_id, &program.id)
        .expect("balance reads");
    assert_eq!(balance.available, dec!(650.00));

    let payout = stack
        .payouts
        .create_from_claim(&claim.id, Some(date(2026, 4, 10)))
        .expect("payout schedules");
    let claim = stack.claims.get(&claim.id).expect("claim fetches");
    assert_eq!(claim.status, ClaimStatus::Paid);

    stack
        .payouts
        .process(&payout.id, "ACH-20260410-101", date(2026, 4, 10))
        .expect("payout settles");

    let balance = stack
        .coop
        .balance(&dealer.dealer_id, &program.id)
        .expect("balance reads");
    assert_eq!(balance.paid, dec!(350));
    assert_eq!(balance.available, dec!(650.00));

    // the fund will not cover more than what remains
    match stack.claims.submit(ClaimSubmission {
        dealer_id: dealer.dealer_id.clone(),
        program_id: program.id.clone(),
        claim_type: ClaimType::Coop,
        requested_amount: dec!(700),
        description: "follow-up campaign".to_string(),
        documents: Vec::new(),
        submitted_on: date(2026, 4, 12),
    }) {
        Err(ClaimError::InsufficientBalance { available, .. }) => {
            assert_eq!(available, dec!(650.00));
        }
        other => panic!("expected balance rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn router_drives_a_program_from_creation_to_summary() {
    let repository = Arc::new(InMemoryIncentiveRepository::default());
    let volumes = CsvVolumeFeed::from_reader(std::io::Cursor::new(
        "program,dealer,period_start,volume\nREB-HTTP,d-1,2026-03-01,25000\n".to_string(),
    ))
    .expect("feed parses");
    let router = incentive_router(Arc::new(IncentiveGateway::new(
        repository,
        Arc::new(volumes),
    )));

    let create_payload = json!({
        "code": "REB-HTTP",
        "name": "HTTP rebate",
        "program_type": "rebate",
        "starts_on": "2026-01-01",
        "rates": {
            "rules": { "tiered": [
                { "name": "Base", "min_volume": "0", "max_volume": null, "rate": "0.01" },
                { "name": "Silver", "min_volume": "10000", "max_volume": null, "rate": "0.02" }
            ]},
            "max_payout": null,
            "max_payout_per_dealer": null
        }
    });
    let response = router
        .clone()
        .oneshot(post_json("/api/v1/incentives/programs", &create_payload))
        .await
        .expect("create responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let program = read_body(response).await;
    let program_id = program["id"].as_str().expect("program id").to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/incentives/programs")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("list responds");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = read_body(response).await;
    assert_eq!(listed.as_array().expect("program array").len(), 1);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/incentives/programs/{program_id}/status"),
            &json!({ "action": "activate" }),
        ))
        .await
        .expect("status responds");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/incentives/programs/{program_id}/enrollments"),
            &json!({ "dealer_id": "d-1", "requested_on": "2026-01-10" }),
        ))
        .await
        .expect("enroll responds");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/incentives/programs/{program_id}/accruals/run"),
            &json!({
                "period_start": "2026-03-01",
                "period_end": "2026-03-31",
                "recalculate": false
            }),
        ))
        .await
        .expect("run responds");
    assert_eq!(response.status(), StatusCode::OK);
    let summary = read_body(response).await;
    assert_eq!(summary["processed_count"], 1);

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/api/v1/incentives/programs/{program_id}/accruals/summary"
        ))
        .body(Body::empty())
        .expect("request builds");
    let response = router.clone().oneshot(request).await.expect("summary responds");
    assert_eq!(response.status(), StatusCode::OK);
    let buckets = read_body(response).await;
    assert_eq!(buckets.as_array().expect("bucket array").len(), 1);
    assert_eq!(buckets[0]["calculated"], 1);
}

fn post_json(uri: &str, payload: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

async fn read_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json payload")
}
