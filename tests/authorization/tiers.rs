//! Cache-tier failures fall over to the durable store; durable-store failures
//! surface as infrastructure errors, never as denials.

use std::path::Path;
use std::time::{Duration, Instant};

use turnstile::{Credentials, DbHandle, Error, MemoryCache};

use super::harness::{BrokenCache, Fixture, StalledCache, fixture_on, fixture_with_cache};

/// A fixture on a database file, so a second connection can alter it.
async fn file_fixture(path: &Path) -> Fixture {
    let db = DbHandle::open(path.to_str().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    fixture_on(db, MemoryCache::new(1024))
}

async fn drop_perm_table(path: &Path) {
    let db = libsql::Builder::new_local(path).build().await.unwrap();
    db.connect()
        .unwrap()
        .execute_batch("DROP TABLE perm;")
        .await
        .unwrap();
}

#[tokio::test]
async fn stalled_cache_falls_over_to_durable_store() {
    let fx = fixture_with_cache(StalledCache).await;

    let started = Instant::now();
    let session = fx.sessions.create(21, 600).await.unwrap();
    assert!(fx.sessions.validate(21, &session.token).await.unwrap());
    assert_eq!(
        fx.sessions.strip_actor_id(&session.token).await.unwrap(),
        Some(21)
    );
    // Each cache call is cut off at the configured 50ms.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn broken_cache_falls_over_to_durable_store() {
    let fx = fixture_with_cache(BrokenCache).await;
    let session = fx.sessions.create(22, 600).await.unwrap();

    fx.interceptor
        .authorize(&Credentials::token(session.token), "discuss", "modifyOwn")
        .await
        .unwrap();
}

#[tokio::test]
async fn revoke_with_stalled_cache_still_deletes_row() {
    let fx = fixture_with_cache(StalledCache).await;
    let session = fx.sessions.create(23, 600).await.unwrap();

    let err = fx.sessions.revoke(&session.token).await.unwrap_err();
    assert!(matches!(err, Error::Timeout("cache")));
    assert!(err.is_infrastructure());

    assert_eq!(fx.db.find_token(&session.token).await.unwrap(), None);
    assert!(!fx.sessions.validate(23, &session.token).await.unwrap());
}

#[tokio::test]
async fn revoke_with_broken_cache_logs_the_actor_out() {
    let fx = fixture_with_cache(BrokenCache).await;
    let session = fx.sessions.create(30, 600).await.unwrap();

    assert!(matches!(
        fx.sessions.revoke(&session.token).await,
        Err(Error::Cache(_))
    ));
    assert!(!fx.sessions.validate(30, &session.token).await.unwrap());
    let actor = fx
        .interceptor
        .resolve_actor(&Credentials::token(session.token))
        .await
        .unwrap();
    assert!(actor.is_guest());
}

#[tokio::test]
async fn revoke_all_with_broken_cache_deletes_every_row() {
    let fx = fixture_with_cache(BrokenCache).await;
    let first = fx.sessions.create(30, 600).await.unwrap();
    let second = fx.sessions.create(30, 30 * 24 * 3600).await.unwrap();
    let other = fx.sessions.create(31, 600).await.unwrap();

    assert!(matches!(
        fx.sessions.revoke_all(30).await,
        Err(Error::Cache(_))
    ));
    assert!(!fx.sessions.validate(30, &first.token).await.unwrap());
    assert!(!fx.sessions.validate(30, &second.token).await.unwrap());
    assert!(fx.sessions.validate(31, &other.token).await.unwrap());
}

#[tokio::test]
async fn missing_table_is_infrastructure_not_denial() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perm.db");
    let fx = file_fixture(&path).await;
    let session = fx.sessions.create(24, 600).await.unwrap();
    drop_perm_table(&path).await;

    let err = fx
        .interceptor
        .authorize(&Credentials::token(session.token), "discuss", "view")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));
    assert!(err.is_infrastructure());
}

#[tokio::test]
async fn guest_check_does_not_touch_durable_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perm.db");
    let fx = file_fixture(&path).await;
    drop_perm_table(&path).await;

    fx.interceptor
        .authorize(&Credentials::anonymous(), "discuss", "view")
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_token_is_guest_not_error() {
    let fx = fixture_with_cache(MemoryCache::new(16)).await;
    let actor = fx
        .interceptor
        .resolve_actor(&Credentials::token("0123456789abcdef0123456789abcdef"))
        .await
        .unwrap();
    assert!(actor.is_guest());
}
