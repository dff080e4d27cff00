//! Postgres-backed integration tests for the messaging core.
//!
//! These need a reachable database (see `common::test_database_url`)
//! and are ignored by default.
//! Run with: cargo test --test chat_flow_test -- --ignored

mod common;

use sage_messaging::config::Config;
use sage_messaging::db::MIGRATOR;
use sage_messaging::models::{ConversationKey, MessageKind};
use sage_messaging::services::chat_service::ChatService;
use sage_messaging::services::conversation_service::{ConversationService, TouchOutcome};
use sage_messaging::services::message_service::MessageService;
use sage_messaging::websocket::SessionRegistry;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

async fn setup() -> Pool<Postgres> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&common::test_database_url())
        .await
        .expect("failed to connect to test database");
    MIGRATOR.run(&pool).await.expect("migrations failed");
    pool
}

async fn conversation_rows(db: &Pool<Postgres>, key: &ConversationKey) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE conversation_key = $1")
        .bind(key.as_str())
        .fetch_one(db)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn send_creates_exactly_one_conversation_listed_for_both_parties() {
    let db = setup().await;
    let registry = SessionRegistry::new(8);
    let config = Config::test_defaults();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    let key = ConversationKey::between(u1, u2).unwrap();

    let message = ChatService::send(
        &db,
        &registry,
        &config,
        u1,
        u2,
        "hi".into(),
        MessageKind::Text,
        None,
    )
    .await
    .unwrap();
    assert_eq!(message.conversation_key, key);
    assert!(!message.read);

    assert_eq!(conversation_rows(&db, &key).await, 1);

    for user in [u1, u2] {
        let listed = ChatService::list_conversations(&db, user).await.unwrap();
        let hits = listed
            .iter()
            .filter(|c| c.conversation_key == key)
            .count();
        assert_eq!(hits, 1, "user {user} should see the conversation exactly once");
    }

    let mine = ChatService::list_conversations(&db, Uuid::new_v4())
        .await
        .unwrap();
    assert!(mine.iter().all(|c| c.conversation_key != key));
}

#[tokio::test]
#[ignore]
async fn racing_first_messages_never_create_two_conversations() {
    let db = setup().await;
    let registry = SessionRegistry::new(8);
    let config = Config::test_defaults();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    let key = ConversationKey::between(u1, u2).unwrap();

    // Both directions' first message fired simultaneously.
    let (a, b) = tokio::join!(
        ChatService::send(&db, &registry, &config, u1, u2, "hello from u1".into(), MessageKind::Text, None),
        ChatService::send(&db, &registry, &config, u2, u1, "hello from u2".into(), MessageKind::Text, None),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(conversation_rows(&db, &key).await, 1);
}

#[tokio::test]
#[ignore]
async fn touch_reports_created_then_updated() {
    let db = setup().await;
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    let key = ConversationKey::between(u1, u2).unwrap();

    let first = MessageService::append(&db, &key, u1, u2, MessageKind::Text, "one".into())
        .await
        .unwrap();
    let (conv, outcome) = ConversationService::touch(&db, &key, &first).await.unwrap();
    assert_eq!(outcome, TouchOutcome::Created);
    assert_eq!(conv.last_message_id, Some(first.id));

    let second = MessageService::append(&db, &key, u2, u1, MessageKind::Text, "two".into())
        .await
        .unwrap();
    let (conv, outcome) = ConversationService::touch(&db, &key, &second).await.unwrap();
    assert_eq!(outcome, TouchOutcome::Updated);
    assert_eq!(conv.last_message_id, Some(second.id));
    assert_eq!(conversation_rows(&db, &key).await, 1);
}

#[tokio::test]
#[ignore]
async fn history_pages_are_disjoint_and_stay_reverse_chronological() {
    let db = setup().await;
    let registry = SessionRegistry::new(8);
    let config = Config::test_defaults();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    let mut sent_ids = Vec::new();
    for i in 0..5 {
        let msg = ChatService::send(
            &db,
            &registry,
            &config,
            u1,
            u2,
            format!("message {i}"),
            MessageKind::Text,
            None,
        )
        .await
        .unwrap();
        sent_ids.push(msg.id);
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = ChatService::history(&db, &config, u2, u1, Some(2), cursor.as_deref())
            .await
            .unwrap();
        assert!(page.messages.len() <= 2);
        for window in page.messages.windows(2) {
            assert!(
                (window[0].created_at, window[0].id) > (window[1].created_at, window[1].id),
                "page must be reverse-chronological"
            );
        }
        seen.extend(page.messages.iter().map(|m| m.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    // Every message exactly once, newest first overall.
    assert_eq!(seen.len(), 5);
    let mut expected = sent_ids.clone();
    expected.reverse();
    assert_eq!(seen, expected);
}

#[tokio::test]
#[ignore]
async fn three_messages_with_limit_two_paginate_as_two_then_one() {
    let db = setup().await;
    let registry = SessionRegistry::new(8);
    let config = Config::test_defaults();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    for i in 0..3 {
        ChatService::send(
            &db,
            &registry,
            &config,
            u1,
            u2,
            format!("m{i}"),
            MessageKind::Text,
            None,
        )
        .await
        .unwrap();
    }

    let first = ChatService::history(&db, &config, u2, u1, Some(2), None)
        .await
        .unwrap();
    assert_eq!(first.messages.len(), 2);
    assert_eq!(first.messages[0].body, "m2");
    assert_eq!(first.messages[1].body, "m1");
    let cursor = first.next_cursor.expect("a further page exists");

    let second = ChatService::history(&db, &config, u2, u1, Some(2), Some(&cursor))
        .await
        .unwrap();
    assert_eq!(second.messages.len(), 1);
    assert_eq!(second.messages[0].body, "m0");
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
#[ignore]
async fn mark_read_is_idempotent_and_receiver_scoped() {
    let db = setup().await;
    let registry = SessionRegistry::new(8);
    let config = Config::test_defaults();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    for body in ["hello", "are you there?"] {
        ChatService::send(&db, &registry, &config, u1, u2, body.into(), MessageKind::Text, None)
            .await
            .unwrap();
    }
    ChatService::send(&db, &registry, &config, u2, u1, "yes".into(), MessageKind::Text, None)
        .await
        .unwrap();

    // u2 opens the conversation: only the two messages addressed to u2
    // flip, not u1's copy of its own sent messages.
    let marked = ChatService::mark_conversation_read(&db, u2, u1).await.unwrap();
    assert_eq!(marked, 2);
    let again = ChatService::mark_conversation_read(&db, u2, u1).await.unwrap();
    assert_eq!(again, 0);

    let page = ChatService::history(&db, &config, u2, u1, None, None)
        .await
        .unwrap();
    for message in &page.messages {
        if message.recipient_id == u2 {
            assert!(message.read, "messages addressed to u2 must now be read");
        } else {
            assert!(
                !message.read,
                "the message addressed to u1 must be untouched"
            );
        }
    }
    assert_eq!(page.messages.len(), 3);
}
