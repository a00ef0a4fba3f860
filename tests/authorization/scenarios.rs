//! End-to-end scenarios for the discuss model and the token lifecycle.

use turnstile::{Credentials, Error, Mode, PermissionValue, permission};

use super::harness::{DISCUSS, fixture};

#[tokio::test]
async fn guest_can_view_but_not_modify() {
    let fx = fixture().await;
    let anonymous = Credentials::anonymous();

    let actor = fx
        .interceptor
        .authorize(&anonymous, "discuss", "view")
        .await
        .unwrap();
    assert!(actor.is_guest());

    let err = fx
        .interceptor
        .authorize(&anonymous, "discuss", "modifyOwn")
        .await
        .unwrap_err();
    match err {
        Error::PermissionDenied {
            actor_id,
            permission,
        } => {
            assert_eq!(actor_id, 0);
            assert_eq!(permission, "modifyOwn");
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn actor_without_row_gets_default() {
    let fx = fixture().await;
    let session = fx.sessions.create(7, 3600).await.unwrap();
    let creds = Credentials::token(session.token);

    for allowed in ["view", "modifyOwn"] {
        fx.interceptor
            .authorize(&creds, "discuss", allowed)
            .await
            .unwrap();
    }
    let err = fx
        .interceptor
        .authorize(&creds, "discuss", "modifyAll")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PermissionDenied { actor_id: 7, .. }
    ));
}

#[tokio::test]
async fn gate_values_match_model_defaults() {
    let guest = PermissionValue::Bitmask(1);
    let default = PermissionValue::Bitmask(3);

    assert!(permission::check(guest, &DISCUSS, "view").unwrap());
    assert!(!permission::check(guest, &DISCUSS, "modifyOwn").unwrap());
    assert!(permission::check(default, &DISCUSS, "view").unwrap());
    assert!(permission::check(default, &DISCUSS, "modifyOwn").unwrap());
    assert!(!permission::check(default, &DISCUSS, "modifyAll").unwrap());
}

#[tokio::test]
async fn stored_value_overrides_default() {
    let fx = fixture().await;
    let session = fx.sessions.create(9, 3600).await.unwrap();
    let creds = Credentials::claimed(9, session.token);

    fx.interceptor
        .grants()
        .grant(9, "discuss", &["modifyAll"], Mode::Require)
        .await
        .unwrap();
    fx.interceptor
        .authorize(&creds, "discuss", "modifyAll")
        .await
        .unwrap();

    fx.interceptor
        .grants()
        .revoke(9, "discuss", &["view"], Mode::Require)
        .await
        .unwrap();
    assert!(
        fx.interceptor
            .authorize(&creds, "discuss", "view")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn all_granted_passes_every_check() {
    let fx = fixture().await;
    let session = fx.sessions.create(1, 3600).await.unwrap();
    let creds = Credentials::token(session.token);
    fx.interceptor
        .grants()
        .set(1, "discuss", PermissionValue::AllGranted)
        .await
        .unwrap();

    for name in DISCUSS {
        fx.interceptor
            .authorize(&creds, "discuss", name)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn token_lifecycle() {
    let fx = fixture().await;
    let session = fx.sessions.create(5, 3600).await.unwrap();
    assert!(fx.sessions.validate(5, &session.token).await.unwrap());

    fx.clock.advance(3601);
    assert!(!fx.sessions.validate(5, &session.token).await.unwrap());

    fx.clock.set(session.created_at);
    assert!(fx.sessions.validate(5, &session.token).await.unwrap());
    fx.sessions.revoke(&session.token).await.unwrap();
    assert!(!fx.sessions.validate(5, &session.token).await.unwrap());
    assert_eq!(fx.sessions.strip_actor_id(&session.token).await.unwrap(), None);
}

#[tokio::test]
async fn revoke_all_is_strict_for_cached_tokens() {
    let fx = fixture().await;
    let session = fx.sessions.create(42, 600).await.unwrap();
    assert_eq!(
        fx.sessions.strip_actor_id(&session.token).await.unwrap(),
        Some(42)
    );

    fx.sessions.revoke_all(42).await.unwrap();

    assert_eq!(fx.sessions.strip_actor_id(&session.token).await.unwrap(), None);
    assert!(!fx.sessions.validate(42, &session.token).await.unwrap());
    // The revoked token no longer authenticates, so the caller is a guest.
    let actor = fx
        .interceptor
        .resolve_actor(&Credentials::token(session.token))
        .await
        .unwrap();
    assert!(actor.is_guest());
}

#[tokio::test]
async fn revoked_token_is_not_backfilled_from_a_late_row() {
    let fx = fixture().await;
    let session = fx.sessions.create(42, 600).await.unwrap();
    fx.sessions.revoke(&session.token).await.unwrap();

    // A row reappearing in the durable store (a write racing the revoke)
    // must not resurrect the token while the revocation marker is cached.
    fx.db
        .insert_token(&turnstile::db::TokenRow {
            token: session.token.clone(),
            actor_id: 42,
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
        .await
        .unwrap();
    assert_eq!(fx.sessions.strip_actor_id(&session.token).await.unwrap(), None);
}

#[tokio::test]
async fn decode_lists_granted_names() {
    let fx = fixture().await;
    fx.interceptor
        .grants()
        .grant(3, "comment", &["delete"], Mode::Require)
        .await
        .unwrap();
    assert_eq!(
        fx.interceptor.grants().list(3, "comment").await.unwrap(),
        vec!["view", "modifyOwn", "delete"]
    );
}

#[tokio::test]
async fn token_bound_to_guest_id_stays_guest() {
    let fx = fixture().await;
    assert!(matches!(
        fx.sessions.create(0, 600).await,
        Err(Error::Validation(_))
    ));

    // A row for id 0 written by some other path must not authenticate.
    let token = "00000000000000000000000000000000";
    fx.db
        .insert_token(&turnstile::db::TokenRow {
            token: token.to_string(),
            actor_id: 0,
            created_at: super::harness::NOW,
            expires_at: super::harness::NOW + 600,
        })
        .await
        .unwrap();

    for creds in [Credentials::token(token), Credentials::claimed(0, token)] {
        let actor = fx.interceptor.resolve_actor(&creds).await.unwrap();
        assert!(actor.is_guest());
        let err = fx
            .interceptor
            .authorize(&creds, "discuss", "modifyOwn")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { actor_id: 0, .. }));
    }
}
