//! Database tests

use super::*;
use crate::error::AppError;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn bare_account(name: &str, followers: Option<&str>) -> Account {
    Account {
        name: name.to_string(),
        privkey: Some("test_private_key".to_string()),
        pubkey: Some("test_public_key".to_string()),
        apikey: Some("test_api_key".to_string()),
        followers: followers.map(str::to_string),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert_eq!(db.count_messages().await.unwrap(), 0);
}

#[tokio::test]
async fn test_key_store_lookups() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account(&bare_account(
        "alice@example.com",
        Some(r#"["https://remote.example/u/bob"]"#),
    ))
    .await
    .unwrap();

    let key = db.lookup_private_key("alice@example.com").await.unwrap();
    assert_eq!(key.as_deref(), Some("test_private_key"));

    let followers = db.lookup_followers("alice@example.com").await.unwrap();
    assert_eq!(followers, vec!["https://remote.example/u/bob".to_string()]);

    assert!(
        db.lookup_private_key("nobody@example.com")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        db.lookup_followers("nobody@example.com")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_null_followers_column_is_empty() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account(&bare_account("alice@example.com", None))
        .await
        .unwrap();

    assert!(
        db.lookup_followers("alice@example.com")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_message_put_is_insert_or_replace() {
    let (db, _temp_dir) = create_test_db().await;

    db.put("guid-1", r#"{"type":"Note"}"#).await.unwrap();
    db.put("guid-1", r#"{"type":"Create"}"#).await.unwrap();
    db.put("guid-2", r#"{"type":"Note"}"#).await.unwrap();

    assert_eq!(db.count_messages().await.unwrap(), 2);
    let stored = db.get_message("guid-1").await.unwrap().unwrap();
    assert_eq!(stored.message, r#"{"type":"Create"}"#);
}

#[tokio::test]
async fn test_create_account_and_add_follower() {
    let (db, _temp_dir) = create_test_db().await;
    let actor = Actor::new("alice", "example.com");

    let created = db.create_account(&actor, 1024).await.unwrap();
    assert_eq!(created.account_id, "alice@example.com");
    assert_eq!(created.api_key.len(), 32);
    assert!(created.public_key_pem.contains("BEGIN PUBLIC KEY"));

    assert_eq!(
        db.get_api_key("alice@example.com").await.unwrap(),
        Some(created.api_key.clone())
    );
    assert!(
        db.lookup_private_key("alice@example.com")
            .await
            .unwrap()
            .is_some_and(|pem| pem.contains("BEGIN PRIVATE KEY"))
    );

    assert!(
        db.add_follower("alice@example.com", "https://remote.example/u/bob")
            .await
            .unwrap()
    );
    assert!(
        !db.add_follower("alice@example.com", "https://remote.example/u/bob")
            .await
            .unwrap()
    );
    assert_eq!(
        db.lookup_followers("alice@example.com").await.unwrap(),
        vec!["https://remote.example/u/bob".to_string()]
    );

    match db.create_account(&actor, 1024).await {
        Err(AppError::Validation(msg)) => assert!(msg.contains("already exists")),
        other => panic!("expected duplicate account error, got: {other:?}"),
    }
}
