//! Return/refund adjudication.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use marketplace_core::returns::{ReturnDecision, ReturnReason};
use marketplace_core::{
    Actor, Clock, FulfillmentStatus, MarketplaceError, Money, PreconditionFailed, ReturnId,
    ReturnStatus, UserId, ValidationError,
};
use marketplace_fulfillment::returns::{ReturnCommand, ReturnReducer, pending_return_ages};
use marketplace_fulfillment::settlement::item_net_contribution;
use marketplace_testing::ReducerTest;
use marketplace_testing::fixtures::{LedgerFixture, line};
use marketplace_testing::reducer_test::assertions::assert_event_types;

#[test]
fn request_on_delivered_item_is_pending() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(2, 1000, 10);
    let request_id = ReturnId::new();
    let vendor = fixture.cast.vendor.user_id;

    ReducerTest::new(ReturnReducer::new())
        .with_env(fixture.env.clone())
        .given_state(fixture.ledger.clone())
        .when_command(ReturnCommand::RequestReturn {
            request_id,
            order_item_id: item,
            reason: ReturnReason::Defective,
            description: "  Stopped charging  ".into(),
            requested_amount: Money::from_cents(500),
            actor: fixture.cast.customer,
        })
        .then_events(|events| assert_event_types(events, &["ReturnRequested.v1"]))
        .then_state(move |ledger| {
            let request = ledger.return_request(request_id).unwrap();
            assert_eq!(request.status, ReturnStatus::Pending);
            assert_eq!(request.vendor_id, vendor);
            assert_eq!(request.description, "Stopped charging");
            assert_eq!(ledger.active_return(item).unwrap().id, request_id);
        })
        .run();
}

#[test]
fn undelivered_item_cannot_be_returned() {
    let mut fixture = LedgerFixture::new();
    let order = fixture.place_order(&[line(fixture.cast.vendor.user_id, 1, 1000, 10)]);
    let item = fixture.item_ids(order)[0];

    let result = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::ChangedMind,
        description: String::new(),
        requested_amount: Money::from_cents(100),
        actor: fixture.cast.customer,
    });
    assert!(matches!(
        result,
        Err(MarketplaceError::PreconditionFailed(
            PreconditionFailed::ItemNotDelivered {
                current: FulfillmentStatus::Pending,
                ..
            }
        ))
    ));
}

#[test]
fn refund_above_line_total_is_rejected() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(2, 1000, 10);

    let result = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::Damaged,
        description: String::new(),
        requested_amount: Money::from_cents(2001),
        actor: fixture.cast.customer,
    });
    assert!(matches!(
        result,
        Err(MarketplaceError::Validation(
            ValidationError::RefundExceedsLineTotal { .. }
        ))
    ));
}

#[test]
fn second_request_while_pending_is_a_duplicate() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let first = fixture.request_return(item, 400);

    let second = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::Damaged,
        description: String::new(),
        requested_amount: Money::from_cents(400),
        actor: fixture.cast.customer,
    });
    assert_eq!(
        second.unwrap_err(),
        MarketplaceError::PreconditionFailed(PreconditionFailed::DuplicateReturn {
            existing: first
        })
    );
    assert_eq!(fixture.ledger.item_returns(item).count(), 1);
}

#[test]
fn cumulative_refunds_are_capped_at_line_total() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let first = fixture.request_return(item, 700);
    fixture.approve_return(first);
    fixture
        .execute(ReturnCommand::Complete {
            request_id: first,
            actor: fixture.cast.admin,
        })
        .unwrap();

    let over = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::Other,
        description: String::new(),
        requested_amount: Money::from_cents(301),
        actor: fixture.cast.customer,
    });
    assert!(matches!(
        over,
        Err(MarketplaceError::Validation(
            ValidationError::RefundExceedsLineTotal { refundable, .. }
        )) if refundable == Money::from_cents(300)
    ));
    fixture.request_return(item, 300);
}

#[test]
fn window_closes_after_configured_hours() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    fixture.clock.advance(Duration::hours(25));

    let result = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::Damaged,
        description: String::new(),
        requested_amount: Money::from_cents(100),
        actor: fixture.cast.customer,
    });
    assert!(matches!(
        result,
        Err(MarketplaceError::PreconditionFailed(
            PreconditionFailed::ReturnWindowClosed { .. }
        ))
    ));
}

#[test]
fn only_the_buyer_may_request() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let result = fixture.execute(ReturnCommand::RequestReturn {
        request_id: ReturnId::new(),
        order_item_id: item,
        reason: ReturnReason::Damaged,
        description: String::new(),
        requested_amount: Money::from_cents(100),
        actor: Actor::customer(UserId::new()),
    });
    assert!(matches!(result, Err(MarketplaceError::Forbidden { .. })));
}

#[test]
fn approval_issues_a_dropoff_code() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let request = fixture.request_return(item, 500);

    ReducerTest::new(ReturnReducer::new())
        .with_env(fixture.env.clone())
        .given_state(fixture.ledger.clone())
        .when_command(ReturnCommand::Decide {
            request_id: request,
            decision: ReturnDecision::Approve,
            response: None,
            actor: fixture.cast.vendor,
        })
        .then_events(|events| assert_event_types(events, &["ReturnDecided.v1"]))
        .then_state(move |ledger| {
            let stored = ledger.return_request(request).unwrap();
            assert_eq!(stored.status, ReturnStatus::Approved);
            assert!(stored.dropoff_code.is_some());
            assert!(stored.decided_at.is_some());
            assert_eq!(ledger.active_code_count(), 1);
        })
        .run();
}

#[test]
fn rejection_needs_a_reason() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let request = fixture.request_return(item, 500);

    let result = fixture.execute(ReturnCommand::Decide {
        request_id: request,
        decision: ReturnDecision::Reject,
        response: Some("   ".into()),
        actor: fixture.cast.vendor,
    });
    assert_eq!(
        result.unwrap_err(),
        MarketplaceError::Validation(ValidationError::MissingRejectionReason)
    );

    fixture
        .execute(ReturnCommand::Decide {
            request_id: request,
            decision: ReturnDecision::Reject,
            response: Some("Item shows wear".into()),
            actor: fixture.cast.vendor,
        })
        .unwrap();
    assert_eq!(item_net_contribution(&fixture.ledger, item).cents(), 900);
    assert!(fixture.ledger.active_return(item).is_none());
}

#[test]
fn second_decision_reports_already_decided() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let request = fixture.request_return(item, 500);
    fixture.approve_return(request);

    let result = fixture.execute(ReturnCommand::Decide {
        request_id: request,
        decision: ReturnDecision::Approve,
        response: None,
        actor: fixture.cast.admin,
    });
    assert_eq!(
        result.unwrap_err(),
        MarketplaceError::PreconditionFailed(PreconditionFailed::AlreadyDecided {
            request,
            current: ReturnStatus::Approved,
        })
    );
}

#[test]
fn dropoff_is_single_use() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(1, 1000, 10);
    let request = fixture.request_return(item, 500);
    fixture.approve_return(request);
    let code = fixture
        .ledger
        .return_request(request)
        .unwrap()
        .dropoff_code
        .clone()
        .unwrap();

    let command = ReturnCommand::ConfirmDropoff {
        request_id: request,
        code: code.as_str().to_string(),
        actor: fixture.cast.agent,
    };
    fixture.execute(command.clone()).unwrap();
    assert!(fixture.ledger.return_request(request).unwrap().dropped_off_at.is_some());
    assert_eq!(fixture.ledger.active_code_count(), 0);

    assert!(matches!(
        fixture.execute(command),
        Err(MarketplaceError::PreconditionFailed(
            PreconditionFailed::DropoffAlreadyConfirmed { .. }
        ))
    ));
}

#[test]
fn completing_twice_deducts_once() {
    let mut fixture = LedgerFixture::new();
    let item = fixture.delivered_item(2, 1000, 10);
    let request = fixture.request_return(item, 500);
    fixture.approve_return(request);
    assert_eq!(item_net_contribution(&fixture.ledger, item).cents(), 1300);

    let complete = ReturnCommand::Complete {
        request_id: request,
        actor: fixture.cast.admin,
    };
    fixture.execute(complete.clone()).unwrap();
    let again = fixture.execute(complete);
    assert_eq!(
        again.unwrap_err(),
        MarketplaceError::PreconditionFailed(PreconditionFailed::AlreadyCompleted { request })
    );
    assert_eq!(item_net_contribution(&fixture.ledger, item).cents(), 1300);
    assert_eq!(
        fixture.ledger.return_request(request).unwrap().status,
        ReturnStatus::Completed
    );
}

#[test]
fn pending_requests_report_their_age() {
    let mut fixture = LedgerFixture::new();
    let older = fixture.delivered_item(1, 1000, 10);
    let newer = fixture.delivered_item(1, 1000, 10);
    let first = fixture.request_return(older, 100);
    fixture.clock.advance(Duration::hours(2));
    fixture.request_return(newer, 100);
    fixture.clock.advance(Duration::hours(1));

    let ages = pending_return_ages(&fixture.ledger, fixture.clock.now());
    assert_eq!(ages.len(), 2);
    assert_eq!(ages[0].request_id, first);
    assert_eq!(ages[0].age, Duration::hours(3));
    assert_eq!(ages[1].age, Duration::hours(1));
}
