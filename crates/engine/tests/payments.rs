mod common;

use chrono::{Duration, Utc};
use common::{harness, payment_method, TENANT};
use notifyhub_core::credits::Credits;
use notifyhub_core::mpesa::{CallbackAck, GatewayCallback};
use notifyhub_core::types::{SessionMode, SessionStatus, TransactionStatus};
use notifyhub_db::Store;
use notifyhub_engine::payments::PurchaseRequest;
use notifyhub_engine::sessions::{CreateSession, SessionPayment};
use notifyhub_engine::EngineError;

fn purchase(amount: u64) -> PurchaseRequest {
    PurchaseRequest {
        amount,
        phone_number: "0712345678".to_string(),
        payment_method_id: None,
    }
}

fn success(checkout: &str) -> GatewayCallback {
    GatewayCallback {
        checkout_request_id: checkout.to_string(),
        success: true,
        result_code: 0,
        result_desc: "The service request is processed successfully.".to_string(),
        settlement_reference: Some("QK12ABC".to_string()),
    }
}

#[tokio::test]
async fn purchase_settles_once_on_replayed_callback() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();

    let started = h
        .engine
        .initiate_payment(TENANT, Some("usr_1"), purchase(100), now)
        .await
        .unwrap();
    let txn = started.transaction;
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert_eq!(txn.tokens, Credits::whole(100));
    assert_eq!(txn.phone, "254712345678");
    assert_eq!(txn.checkout_request_id.as_deref(), Some("ws_CO_1"));
    assert_eq!(h.gateway.last_push().unwrap().amount, 100);

    let first = h.engine.handle_payment_callback(success("ws_CO_1"), now).await.unwrap();
    let second = h.engine.handle_payment_callback(success("ws_CO_1"), now).await.unwrap();
    assert_eq!(first, CallbackAck::accepted());
    assert_eq!(second, CallbackAck::accepted());
    assert_eq!(h.balance().await, Credits::whole(100));

    let settled = h.engine.get_transaction(TENANT, &txn.id).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert_eq!(settled.settlement_reference.as_deref(), Some("QK12ABC"));
    assert_eq!(settled.metadata["phoneNumber"], "254712345678");
    assert_eq!(settled.metadata["callback"]["resultCode"], 0);
}

#[tokio::test]
async fn failed_callback_credits_nothing() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();
    h.engine
        .initiate_payment(TENANT, None, purchase(50), now)
        .await
        .unwrap();

    let ack = h
        .engine
        .handle_payment_callback(
            GatewayCallback {
                checkout_request_id: "ws_CO_1".to_string(),
                success: false,
                result_code: 1032,
                result_desc: "Request cancelled by user".to_string(),
                settlement_reference: None,
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(ack, CallbackAck::accepted());

    // a late success for the same checkout must not resurrect it
    h.engine.handle_payment_callback(success("ws_CO_1"), now).await.unwrap();

    let txns = h.engine.list_transactions(TENANT, 10).await.unwrap();
    assert_eq!(txns[0].status, TransactionStatus::Failed);
    assert_eq!(txns[0].metadata["callback"]["resultDesc"], "Request cancelled by user");
    assert_eq!(h.balance().await, Credits::ZERO);
}

#[tokio::test]
async fn unknown_checkout_is_acknowledged_as_not_found() {
    let h = harness(Credits::ZERO).await;
    let ack = h
        .engine
        .handle_payment_callback(success("ws_CO_unknown"), Utc::now())
        .await
        .unwrap();
    assert_eq!(ack, CallbackAck::not_found());
}

#[tokio::test]
async fn gateway_failure_marks_transaction_failed() {
    let h = harness(Credits::ZERO).await;
    h.gateway.set_failing(true);

    let err = h
        .engine
        .initiate_payment(TENANT, Some("usr_1"), purchase(100), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));

    let txns = h.engine.list_transactions(TENANT, 10).await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].status, TransactionStatus::Failed);
    assert!(txns[0].metadata["error"]
        .as_str()
        .unwrap()
        .contains("initiator information"));
}

#[tokio::test]
async fn explicit_inactive_method_is_rejected() {
    let h = harness(Credits::ZERO).await;
    let mut inactive = payment_method("pm_off", false);
    inactive.is_active = false;
    h.store.seed_payment_method(inactive).await;

    let mut req = purchase(10);
    req.payment_method_id = Some("pm_off".to_string());
    let err = h
        .engine
        .initiate_payment(TENANT, None, req, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.gateway.pushes(), 0);
}

#[tokio::test]
async fn tenant_assigned_method_preferred_over_default() {
    let h = harness(Credits::ZERO).await;
    h.store.seed_payment_method(payment_method("pm_acme", false)).await;
    h.store
        .update_tenant(TENANT, |t| t.payment_method_id = Some("pm_acme".to_string()))
        .await;

    let started = h
        .engine
        .initiate_payment(TENANT, None, purchase(10), Utc::now())
        .await
        .unwrap();
    assert_eq!(started.transaction.payment_method_id.as_deref(), Some("pm_acme"));
}

#[tokio::test]
async fn zero_amount_is_rejected() {
    let h = harness(Credits::ZERO).await;
    let err = h
        .engine
        .initiate_payment(TENANT, None, purchase(0), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.engine.list_transactions(TENANT, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn flexible_session_is_consumed_once() {
    let h = harness(Credits::whole(2)).await;
    let now = Utc::now();

    let session = h
        .engine
        .create_session(TENANT, "usr_admin", CreateSession::default(), now)
        .await
        .unwrap();
    assert!(session.token.starts_with("pay_"));
    assert_eq!(session.mode, SessionMode::Flexible);

    let view = h.engine.public_session(&session.token, now).await.unwrap();
    assert_eq!(view.tenant_name, "Acme Ltd");

    let started = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(50),
            },
            now,
        )
        .await
        .unwrap();
    assert!(started.transaction.user_id.is_none());

    let claimed = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(claimed.status, SessionStatus::Processing);
    assert_eq!(claimed.checkout_request_id.as_deref(), Some("ws_CO_1"));

    let again = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0799999999".to_string(),
                amount: Some(50),
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::Conflict(_)));

    h.engine.handle_payment_callback(success("ws_CO_1"), now).await.unwrap();
    h.engine.handle_payment_callback(success("ws_CO_1"), now).await.unwrap();

    let done = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(h.balance().await, Credits::whole(52));

    let gone = h.engine.public_session(&session.token, now).await.unwrap_err();
    assert!(matches!(gone, EngineError::NotFound(_)));
}

#[tokio::test]
async fn fixed_session_enforces_amount() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();

    let missing = h
        .engine
        .create_session(
            TENANT,
            "usr_admin",
            CreateSession {
                mode: SessionMode::Fixed,
                ..CreateSession::default()
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::Validation(_)));

    let session = h
        .engine
        .create_session(
            TENANT,
            "usr_admin",
            CreateSession {
                mode: SessionMode::Fixed,
                amount: Some(200),
                ..CreateSession::default()
            },
            now,
        )
        .await
        .unwrap();

    let wrong = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(10),
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(wrong, EngineError::Validation(_)));
    // a rejected attempt leaves the link usable
    let still = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(still.status, SessionStatus::Pending);

    let started = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: None,
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(started.transaction.amount, Credits::whole(200));
}

#[tokio::test]
async fn expired_session_is_not_found() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();
    let session = h
        .engine
        .create_session(
            TENANT,
            "usr_admin",
            CreateSession {
                ttl_minutes: Some(1),
                ..CreateSession::default()
            },
            now,
        )
        .await
        .unwrap();

    let err = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(10),
            },
            now + Duration::minutes(2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(h.gateway.pushes(), 0);
}

#[tokio::test]
async fn gateway_failure_fails_the_session() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();
    let session = h
        .engine
        .create_session(TENANT, "usr_admin", CreateSession::default(), now)
        .await
        .unwrap();
    h.gateway.set_failing(true);

    let err = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(10),
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Gateway(_)));

    let failed = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(failed.status, SessionStatus::Failed);
}

#[tokio::test]
async fn oversized_amount_is_rejected_before_any_write() {
    let h = harness(Credits::ZERO).await;
    let err = h
        .engine
        .initiate_payment(TENANT, Some("usr_1"), purchase(1u64 << 62), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.gateway.last_push().is_none());
    assert!(h.engine.list_transactions(TENANT, 10).await.unwrap().is_empty());

    let fixed = h
        .engine
        .create_session(
            TENANT,
            "usr_admin",
            CreateSession {
                amount: Some(u64::MAX),
                mode: SessionMode::Fixed,
                ..CreateSession::default()
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(fixed, EngineError::Validation(_)));
}

#[tokio::test]
async fn bad_phone_leaves_session_open_for_retry() {
    let h = harness(Credits::ZERO).await;
    let now = Utc::now();
    let session = h
        .engine
        .create_session(TENANT, "usr_admin", CreateSession::default(), now)
        .await
        .unwrap();

    let err = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "07-12 345".to_string(),
                amount: Some(50),
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    let untouched = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(untouched.status, SessionStatus::Pending);

    let huge = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(u64::MAX),
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(huge, EngineError::Validation(_)));

    let started = h
        .engine
        .initiate_session_payment(
            &session.token,
            SessionPayment {
                phone_number: "0712345678".to_string(),
                amount: Some(50),
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(started.transaction.phone, "254712345678");
    let claimed = h.store.get_session(&session.token).await.unwrap().unwrap();
    assert_eq!(claimed.status, SessionStatus::Processing);
    assert_eq!(claimed.phone.as_deref(), Some("254712345678"));
}
