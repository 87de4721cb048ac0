//! Verification code request and confirmation through the service facade

mod support;

use chrono::Duration;

use carrier_auth::{
    error::AuthError,
    models::{CodeStatus, RequestType},
    repositories::VerificationCodeStore,
};
use support::Harness;

const EMAIL: &str = "a@example.com";

#[tokio::test]
async fn test_code_confirms_once_inside_window() {
    let h = Harness::new().with_codes(&["483920"]);

    let issued = h.auth.request_verification(EMAIL).await.unwrap();
    assert_eq!(issued.request_type, RequestType::Signup);
    assert_eq!(h.notifier.last_code(EMAIL).await.as_deref(), Some("483920"));

    h.clock.advance(Duration::minutes(2));
    assert!(
        h.auth
            .confirm_verification(EMAIL, "483920", RequestType::Signup)
            .await
            .unwrap()
    );
    let rows = h.codes.find_by_email(EMAIL).await.unwrap();
    assert_eq!(rows[0].status, CodeStatus::Complete);

    h.clock.advance(Duration::minutes(1));
    assert!(
        !h.auth
            .confirm_verification(EMAIL, "483920", RequestType::Signup)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_code_is_rejected_after_validity_window() {
    let h = Harness::new().with_codes(&["483920"]);
    h.auth.request_verification(EMAIL).await.unwrap();

    h.clock.advance(Duration::minutes(6));
    assert!(
        !h.auth
            .confirm_verification(EMAIL, "483920", RequestType::Signup)
            .await
            .unwrap()
    );
    assert!(h.codes.find_by_email(EMAIL).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_request_within_throttle_window_is_refused() {
    let h = Harness::new().with_codes(&["111111", "222222"]);
    h.auth.request_verification(EMAIL).await.unwrap();

    h.clock.advance(Duration::seconds(30));
    let err = h.auth.request_verification(EMAIL).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Throttled {
            retry_after_seconds: 30
        }
    ));
    assert_eq!(h.notifier.sent().await.len(), 1);

    h.clock.advance(Duration::seconds(30));
    h.auth.request_verification(EMAIL).await.unwrap();
    assert_eq!(h.notifier.last_code(EMAIL).await.as_deref(), Some("222222"));

    assert!(
        !h.auth
            .confirm_verification(EMAIL, "111111", RequestType::Signup)
            .await
            .unwrap()
    );
    assert!(
        h.auth
            .confirm_verification(EMAIL, "222222", RequestType::Signup)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_throttle_is_per_email() {
    let h = Harness::new();
    h.auth.request_verification(EMAIL).await.unwrap();
    assert!(h.auth.request_verification("b@example.com").await.is_ok());
}

#[tokio::test]
async fn test_registered_email_gets_password_reset_code() {
    let h = Harness::new().with_codes(&["654321"]);
    h.add_user(9, EMAIL).await;

    let issued = h.auth.request_verification(EMAIL).await.unwrap();
    assert_eq!(issued.request_type, RequestType::ForgetPassword);

    assert!(
        !h.auth
            .confirm_verification(EMAIL, "654321", RequestType::Signup)
            .await
            .unwrap()
    );
    assert!(
        h.auth
            .confirm_verification(EMAIL, "654321", RequestType::ForgetPassword)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_delivery_failure_is_reported_after_storing() {
    let h = Harness::new().with_codes(&["483920"]);
    h.notifier.fail_deliveries(true).await;

    assert!(matches!(
        h.auth.request_verification(EMAIL).await,
        Err(AuthError::Notification(_))
    ));

    let rows = h.codes.find_by_email(EMAIL).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CodeStatus::Waiting);
}

#[tokio::test]
async fn test_invalid_email_touches_nothing() {
    let h = Harness::new();

    assert!(matches!(
        h.auth.request_verification("not-an-email").await,
        Err(AuthError::InvalidInput(_))
    ));
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_brute_force_is_cut_off() {
    let h = Harness::new().with_codes(&["483920"]);
    h.auth.request_verification(EMAIL).await.unwrap();

    for guess in ["000001", "000002", "000003", "000004", "000005"] {
        assert!(
            !h.auth
                .confirm_verification(EMAIL, guess, RequestType::Signup)
                .await
                .unwrap()
        );
    }

    assert!(matches!(
        h.auth
            .confirm_verification(EMAIL, "483920", RequestType::Signup)
            .await,
        Err(AuthError::TooManyAttempts)
    ));

    // A fresh window restores the budget, but the old code has expired with it
    h.clock.advance(Duration::minutes(5) + Duration::seconds(1));
    assert!(
        !h.auth
            .confirm_verification(EMAIL, "483920", RequestType::Signup)
            .await
            .unwrap()
    );
}
