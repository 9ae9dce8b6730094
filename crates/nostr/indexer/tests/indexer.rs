//! Integration tests for the indexer actor.

use futures::future::join_all;
use nostr::{
    Admission, Event, EventError, EventTemplate, KIND_CARD_DEFINITION, KIND_PORTFOLIO,
    KIND_PRICE_QUOTE, KIND_TRADE_OFFER, Keypair, SchemaRegistry, create_address,
};
use nostr_indexer::{ChangeKey, Indexer, IndexerConfig, IndexerError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn spawn() -> Indexer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
    Indexer::spawn(
        Arc::new(SchemaRegistry::standard()),
        IndexerConfig::default(),
    )
}

fn card_definition(keys: &Keypair, d: &str, created_at: u64, content: &str) -> Event {
    keys.finalize(
        &EventTemplate::new(KIND_CARD_DEFINITION, content)
            .tag(["d", d])
            .tag(["name", "Dragon"])
            .tag(["rarity", "legendary"])
            .created_at(created_at),
    )
    .unwrap()
}

fn price_quote(keys: &Keypair, card: &str, price: &str, created_at: u64) -> Event {
    keys.finalize(
        &EventTemplate::new(KIND_PRICE_QUOTE, "")
            .tag(["card", card])
            .tag(["price", price])
            .created_at(created_at),
    )
    .unwrap()
}

#[tokio::test]
async fn test_submit_then_read() {
    let indexer = spawn();
    let keys = Keypair::generate();
    let card = card_definition(&keys, "dragon", 100, "{}");

    assert_eq!(indexer.submit(card.clone()).await.unwrap(), Admission::Admitted);
    assert_eq!(indexer.get(KIND_CARD_DEFINITION, "dragon"), Some(card.clone()));
    assert_eq!(
        indexer.get_authored(KIND_CARD_DEFINITION, &keys.public_key_hex(), "dragon"),
        Some(card.clone())
    );
    assert!(indexer.contains(&card.id));
}

#[tokio::test]
async fn test_replace_on_write_both_orders() {
    let keys = Keypair::generate();
    let v1 = card_definition(&keys, "dragon", 100, r#"{"v":1}"#);
    let v2 = card_definition(&keys, "dragon", 200, r#"{"v":2}"#);

    let forward = spawn();
    forward.submit(v1.clone()).await.unwrap();
    assert_eq!(
        forward.submit(v2.clone()).await.unwrap(),
        Admission::Replaced {
            previous: v1.id.clone()
        }
    );

    let backward = spawn();
    backward.submit(v2.clone()).await.unwrap();
    assert_eq!(
        backward.submit(v1.clone()).await.unwrap(),
        Admission::Superseded {
            current: v2.id.clone()
        }
    );

    for indexer in [&forward, &backward] {
        assert_eq!(indexer.get(KIND_CARD_DEFINITION, "dragon"), Some(v2.clone()));
        assert_eq!(indexer.list(KIND_CARD_DEFINITION).len(), 1);
    }
}

#[tokio::test]
async fn test_tie_break_higher_id_wins() {
    let keys = Keypair::generate();
    let a = card_definition(&keys, "dragon", 100, r#"{"v":"a"}"#);
    let b = card_definition(&keys, "dragon", 100, r#"{"v":"b"}"#);
    let winner = if a.id > b.id { a.clone() } else { b.clone() };

    for order in [[a.clone(), b.clone()], [b.clone(), a.clone()]] {
        let indexer = spawn();
        for event in order {
            indexer.submit(event).await.unwrap();
        }
        assert_eq!(indexer.get(KIND_CARD_DEFINITION, "dragon"), Some(winner.clone()));
    }
}

#[tokio::test]
async fn test_duplicate_is_idempotent() {
    let indexer = spawn();
    let keys = Keypair::generate();
    let card = create_address(KIND_CARD_DEFINITION, &keys.public_key_hex(), "dragon");
    let quote = price_quote(&keys, &card, "2100", 100);
    let mut changes = indexer.subscribe();

    assert_eq!(indexer.submit(quote.clone()).await.unwrap(), Admission::Admitted);
    assert_eq!(indexer.submit(quote.clone()).await.unwrap(), Admission::Duplicate);
    assert_eq!(indexer.stats().regular, 1);

    // Only the first submission notifies.
    let change = changes.recv().await.unwrap();
    assert_eq!(change.event, quote);
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_rejections() {
    let indexer = spawn();
    let keys = Keypair::generate();
    let card = create_address(KIND_CARD_DEFINITION, &keys.public_key_hex(), "dragon");

    let bad_price = price_quote(&keys, &card, "abc", 100);
    let err = indexer.submit(bad_price).await.unwrap_err();
    match err {
        IndexerError::Rejected(EventError::ValidationFailed(violations)) => {
            assert!(violations.iter().any(|v| v.references_tag("price")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    let mut tampered = price_quote(&keys, &card, "2100", 100);
    tampered.content = "edited".to_string();
    assert!(matches!(
        indexer.submit(tampered).await,
        Err(IndexerError::Rejected(EventError::IdentityMismatch { .. }))
    ));

    let no_d = keys
        .finalize(&EventTemplate::new(KIND_PORTFOLIO, "{}"))
        .unwrap();
    assert!(matches!(
        indexer.submit(no_d).await,
        Err(IndexerError::Rejected(EventError::MissingDiscriminator { .. }))
    ));

    let both = keys
        .finalize(
            &EventTemplate::new(KIND_TRADE_OFFER, "")
                .tag(["card", card.as_str()])
                .tag(["quantity", "1"])
                .tag(["side", "sell"])
                .tag(["price", "10"])
                .tag(["swap", card.as_str()]),
        )
        .unwrap();
    assert!(matches!(
        indexer.submit(both).await,
        Err(IndexerError::Rejected(EventError::ValidationFailed(_)))
    ));

    assert_eq!(indexer.stats().regular + indexer.stats().addressable, 0);
}

#[tokio::test]
async fn test_change_notifications() {
    let indexer = spawn();
    let keys = Keypair::generate();
    let mut changes = indexer.subscribe();

    let v1 = card_definition(&keys, "dragon", 100, "{}");
    let v2 = card_definition(&keys, "dragon", 200, "{}");
    indexer.submit(v1.clone()).await.unwrap();
    indexer.submit(v2.clone()).await.unwrap();

    let first = changes.recv().await.unwrap();
    assert_eq!(first.kind, KIND_CARD_DEFINITION);
    assert_eq!(
        first.key,
        ChangeKey::Address {
            pubkey: keys.public_key_hex(),
            d: "dragon".to_string()
        }
    );
    assert_eq!(first.replaced, None);

    let second = changes.recv().await.unwrap();
    assert_eq!(second.event, v2);
    assert_eq!(second.replaced, Some(v1.id));
}

#[tokio::test]
async fn test_log_and_query() {
    let indexer = spawn();
    let keys = Keypair::generate();
    let card = create_address(KIND_CARD_DEFINITION, &keys.public_key_hex(), "dragon");

    for (price, at) in [("100", 1), ("110", 2), ("120", 3)] {
        indexer
            .submit(price_quote(&keys, &card, price, at))
            .await
            .unwrap();
    }

    let prices: Vec<String> = indexer
        .log(|e| e.kind == KIND_PRICE_QUOTE)
        .iter()
        .filter_map(|e| e.tag_value("price").map(str::to_string))
        .collect();
    assert_eq!(prices, vec!["100", "110", "120"]);

    let latest = indexer.query(
        &nostr::Filter::new()
            .kind(KIND_PRICE_QUOTE)
            .tag("card", card.clone())
            .limit(1),
    );
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].tag_value("price"), Some("120"));
}

#[tokio::test]
async fn test_concurrent_submissions_converge() {
    let indexer = spawn();
    let keys = Arc::new(Keypair::generate());
    let submissions = (1..=20u64).map(|at| {
        let indexer = indexer.clone();
        let keys = Arc::clone(&keys);
        tokio::spawn(async move {
            let event = card_definition(&keys, "dragon", at, "{}");
            indexer.submit(event).await
        })
    });
    for outcome in join_all(submissions).await {
        outcome.unwrap().unwrap();
    }

    let current = indexer.get(KIND_CARD_DEFINITION, "dragon").unwrap();
    assert_eq!(current.created_at, 20);
    assert_eq!(indexer.stats().addressable, 1);
}

#[test]
fn test_submit_times_out_when_writer_is_stalled() {
    // The writer task lives on a runtime that is never driven.
    let stalled = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let config = IndexerConfig {
        queue_capacity: 1,
        submit_timeout: Duration::from_millis(50),
        ..IndexerConfig::default()
    };
    let indexer = {
        let _guard = stalled.enter();
        Indexer::spawn(Arc::new(SchemaRegistry::standard()), config)
    };

    let driver = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let keys = Keypair::generate();
    driver.block_on(async {
        // Queued but never answered.
        let first = indexer.submit(card_definition(&keys, "a", 1, "{}")).await;
        assert!(matches!(first, Err(IndexerError::Timeout(_))));

        // Queue full.
        let second = indexer.submit(card_definition(&keys, "b", 1, "{}")).await;
        match second {
            Err(err @ IndexerError::Timeout(_)) => assert!(err.is_retryable()),
            other => panic!("expected timeout, got {other:?}"),
        }
    });
    assert!(!indexer.contains(&card_definition(&keys, "a", 1, "{}").id));
}
