//! PostgreSQL 凭据存储测试
//! 需要设置 TEST_DATABASE_URL，未设置时跳过

use rbac_service::{
    auth::error::AuthError,
    db,
    models::user::Identity,
    repository::{CredentialStore, PgCredentialStore},
};
use secrecy::Secret;

mod common;
use common::{create_test_config, t0};

async fn setup_store() -> Option<PgCredentialStore> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let config = create_test_config();
    let pool = db::create_pool(&Secret::new(url), &config.database)
        .await
        .expect("Failed to create test database pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("TRUNCATE TABLE identities")
        .execute(&pool)
        .await
        .expect("Failed to cleanup test database");

    Some(PgCredentialStore::new(pool))
}

fn identity(id: &str, name: &str, roles: &[&str]) -> Identity {
    Identity::new(
        id,
        name,
        format!("{}@example.com", id),
        "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA",
        roles.iter().map(|r| r.to_string()).collect(),
        t0(),
    )
}

#[tokio::test]
#[serial_test::serial]
async fn test_save_and_find() {
    let Some(store) = setup_store().await else {
        return;
    };

    let alice = identity("alice", "Alice", &["USER", "ADMIN"]);
    store.save(&alice).await.unwrap();

    assert!(store.exists("alice").await.unwrap());
    assert!(!store.exists("bob").await.unwrap());
    assert_eq!(store.find("alice").await.unwrap(), Some(alice));
    assert_eq!(store.find("bob").await.unwrap(), None);
    assert!(store.ping().await.is_ok());
}

#[tokio::test]
#[serial_test::serial]
async fn test_save_duplicate_keeps_first() {
    let Some(store) = setup_store().await else {
        return;
    };

    store.save(&identity("alice", "First", &["USER"])).await.unwrap();
    let err = store
        .save(&identity("alice", "Second", &["ADMIN"]))
        .await
        .unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthError::AlreadyExists));
    assert_eq!(store.find("alice").await.unwrap().unwrap().name, "First");
}
