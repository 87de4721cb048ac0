//! Session issuance, validation, rotation and teardown against in-memory stores

mod support;

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use carrier_auth::{
    clock::Clock,
    error::AuthError,
    jwt::{JwtConfig, TokenIssuer},
    models::{NewSession, TokenKind},
    repositories::{SessionStore, user::hash_password},
};
use support::{ACCESS_TTL, Harness, LEEWAY, REFRESH_TTL, jwt_config, user};

#[tokio::test]
async fn test_issued_access_token_authenticates_its_user() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;

    let tokens = h.auth.issue_session(1).await.unwrap();
    let user = h.auth.authenticate_token(&tokens.access_token).await.unwrap();
    assert_eq!(user.id, 1);

    let header = format!("Bearer {}", tokens.access_token);
    let user = h.auth.authenticate(Some(&header)).await.unwrap();
    assert_eq!(user.email, "a@example.com");
}

#[tokio::test]
async fn test_elapsed_access_ttl_is_session_expired() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.clock.advance(Duration::seconds(ACCESS_TTL));
    assert!(h.auth.authenticate_token(&tokens.access_token).await.is_ok());

    h.clock.advance(Duration::seconds(1));
    assert!(matches!(
        h.auth.authenticate_token(&tokens.access_token).await,
        Err(AuthError::SessionExpired)
    ));
}

#[tokio::test]
async fn test_token_past_leeway_is_token_expired() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.clock.advance(Duration::seconds(ACCESS_TTL + LEEWAY + 1));
    assert!(matches!(
        h.auth.authenticate_token(&tokens.access_token).await,
        Err(AuthError::TokenExpired)
    ));
}

#[tokio::test]
async fn test_missing_or_non_bearer_header() {
    let h = Harness::new();

    assert!(matches!(
        h.auth.authenticate(None).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.auth.authenticate(Some("Basic dXNlcjpwYXNz")).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.auth.authenticate(Some("Bearer not.a.jwt")).await,
        Err(AuthError::MalformedToken)
    ));
}

#[tokio::test]
async fn test_token_from_foreign_secret_is_rejected() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;

    let foreign = TokenIssuer::new(
        JwtConfig {
            access_secret: "someone-elses-access".to_string(),
            refresh_secret: "someone-elses-refresh".to_string(),
            ..jwt_config()
        },
        Arc::new(h.clock.clone()),
    );
    let forged = foreign.issue_access_token(1).unwrap();

    assert!(matches!(
        h.auth.authenticate_token(&forged.token).await,
        Err(AuthError::InvalidSignature)
    ));
}

#[tokio::test]
async fn test_second_login_is_refused_until_logout() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;

    h.auth.issue_session(1).await.unwrap();
    assert!(matches!(
        h.auth.issue_session(1).await,
        Err(AuthError::SessionConflict)
    ));

    h.auth.end_session(1).await.unwrap();
    assert!(h.sessions.all_rows().await.is_empty());

    let tokens = h.auth.issue_session(1).await.unwrap();
    assert!(h.auth.authenticate_token(&tokens.access_token).await.is_ok());
}

#[tokio::test]
async fn test_login_allowed_again_once_access_session_lapses() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;

    h.auth.issue_session(1).await.unwrap();
    h.clock.advance(Duration::seconds(ACCESS_TTL + 1));

    assert!(h.auth.issue_session(1).await.is_ok());
    assert_eq!(
        h.sessions
            .count_active(1, TokenKind::Refresh, h.clock.now())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_refresh_replaces_the_access_session() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.clock.advance(Duration::seconds(10));
    let access = h.auth.refresh_session(&tokens.refresh_token).await.unwrap();

    assert_eq!(h.auth.authenticate_token(&access).await.unwrap().id, 1);
    assert!(matches!(
        h.auth.authenticate_token(&tokens.access_token).await,
        Err(AuthError::SessionExpired)
    ));
    assert_eq!(
        h.sessions
            .count_active(1, TokenKind::Access, h.clock.now())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_refresh_with_expired_or_unknown_token_mints_nothing() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    // An access token is not a refresh token
    assert!(h.auth.refresh_session(&tokens.access_token).await.is_err());
    assert!(matches!(
        h.auth.refresh_session("garbage").await,
        Err(AuthError::MalformedToken)
    ));

    h.clock.advance(Duration::seconds(REFRESH_TTL + 1));
    let err = h.auth.refresh_session(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired));
    assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

    assert!(h.sessions.list_active(1, h.clock.now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_after_logout_fails() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.auth.end_session(1).await.unwrap();
    assert!(matches!(
        h.auth.refresh_session(&tokens.refresh_token).await,
        Err(AuthError::SessionExpired)
    ));
    assert!(h.sessions.all_rows().await.is_empty());
}

#[tokio::test]
async fn test_auto_login_rotates_both_tokens() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let first = h.auth.issue_session(1).await.unwrap();

    h.clock.advance(Duration::minutes(30));
    let second = h.auth.auto_login(&first.refresh_token).await.unwrap();

    assert!(h.auth.authenticate_token(&second.access_token).await.is_ok());
    assert!(matches!(
        h.auth.auto_login(&first.refresh_token).await,
        Err(AuthError::SessionExpired)
    ));
    assert!(h.auth.refresh_session(&second.refresh_token).await.is_ok());

    let rows = h.sessions.list_active(1, h.clock.now()).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_deleted_account_clears_its_sessions() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.users.remove(1).await;
    assert!(matches!(
        h.auth.authenticate_token(&tokens.access_token).await,
        Err(AuthError::AccountNotFound)
    ));
    assert!(h.sessions.all_rows().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_access_rows_are_reported_not_resolved() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.sessions
        .replace_access(
            1,
            &NewSession {
                session_uuid: Uuid::new_v4(),
                kind: TokenKind::Access,
                expires_at: h.clock.now() + Duration::minutes(5),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        h.auth.authenticate_token(&tokens.access_token).await,
        Err(AuthError::MultiSessionAnomaly(1))
    ));
}

#[tokio::test]
async fn test_login_checks_password() {
    let h = Harness::new();
    h.users
        .insert(user(4, "d@example.com", &hash_password("correct horse").unwrap()))
        .await;

    assert!(matches!(
        h.auth.login("d@example.com", "battery staple").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        h.auth.login("nobody@example.com", "correct horse").await,
        Err(AuthError::InvalidCredentials)
    ));

    let tokens = h.auth.login("d@example.com", "correct horse").await.unwrap();
    assert_eq!(h.auth.authenticate_token(&tokens.access_token).await.unwrap().id, 4);
}

#[tokio::test]
async fn test_corrupt_password_hash_is_an_internal_error() {
    let h = Harness::new();
    h.users
        .insert(user(5, "e@example.com", "not-a-phc-string"))
        .await;

    let err = h.auth.login("e@example.com", "anything").await.unwrap_err();
    assert!(matches!(err, AuthError::PasswordHash(_)));
    assert!(err.is_internal());
    assert!(h.sessions.all_rows().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_open_exactly_one_session() {
    const LOGINS: usize = 16;
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;

    let mut handles = Vec::new();
    for _ in 0..LOGINS {
        let auth = h.auth.clone();
        handles.push(tokio::spawn(async move { auth.issue_session(1).await }));
    }

    let mut opened = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(AuthError::SessionConflict) => refused += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(opened, 1);
    assert_eq!(refused, LOGINS - 1);
    assert_eq!(
        h.sessions
            .count_active(1, TokenKind::Access, h.clock.now())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replayed_refresh_token_auto_logs_in_once() {
    const REPLAYS: usize = 12;
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let first = h.auth.issue_session(1).await.unwrap();
    h.clock.advance(Duration::minutes(1));

    let mut handles = Vec::new();
    for _ in 0..REPLAYS {
        let auth = h.auth.clone();
        let refresh = first.refresh_token.clone();
        handles.push(tokio::spawn(async move { auth.auto_login(&refresh).await }));
    }

    let mut winners = Vec::new();
    let mut expired = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(tokens) => winners.push(tokens),
            Err(AuthError::SessionExpired) => expired += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(expired, REPLAYS - 1);

    let now = h.clock.now();
    assert_eq!(h.sessions.count_active(1, TokenKind::Access, now).await.unwrap(), 1);
    assert_eq!(h.sessions.count_active(1, TokenKind::Refresh, now).await.unwrap(), 1);
    assert!(h.auth.authenticate_token(&winners[0].access_token).await.is_ok());
    assert!(h.auth.refresh_session(&winners[0].refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_session_rows_carry_the_injected_time() {
    let h = Harness::new();
    h.add_user(1, "a@example.com").await;
    let tokens = h.auth.issue_session(1).await.unwrap();

    h.clock.advance(Duration::minutes(3));
    h.auth.auto_login(&tokens.refresh_token).await.unwrap();

    let rotated_at = h.clock.now();
    let rows = h.sessions.all_rows().await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.created_at == rotated_at));
}
