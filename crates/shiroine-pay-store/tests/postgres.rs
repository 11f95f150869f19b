//! PostgreSQL round-trip tests.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p shiroine-pay-store -- --ignored`.

use chrono::{Duration, Utc};

use shiroine_pay_core::{Entitlement, OrderItem, Payer, Plan, Transaction, TransactionStatus};
use shiroine_pay_store::{Directory, Entitlements, Ledger, PgStore, StoreError};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgStore::connect(&url).await.expect("Failed to connect");
    store.bootstrap().await.expect("Failed to bootstrap schema");
    store
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn transaction(reference: &str, payer: Payer) -> Transaction {
    Transaction::unpaid(
        reference,
        format!("PREMIUM-{reference}"),
        payer,
        "Budi",
        "QRIS",
        15000,
        vec![OrderItem::new("User Premium - 15 Days", 15000)],
    )
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn ledger_round_trip() {
    let store = store().await;
    let reference = unique("T");
    let tx = transaction(&reference, Payer::Individual(unique("628")));

    store.insert(&tx).await.unwrap();
    assert!(matches!(
        store.insert(&tx).await,
        Err(StoreError::DuplicateReference { .. })
    ));

    let found = store.find(&tx.merchant_ref).await.unwrap().unwrap();
    assert_eq!(found.reference, reference);
    assert_eq!(found.order_items, tx.order_items);
    assert_eq!(found.payer, tx.payer);

    let (payer, items) = store.find_payer_and_items(&reference).await.unwrap().unwrap();
    assert_eq!(payer, tx.payer);
    assert_eq!(items.len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn conditional_transition_has_one_winner() {
    let store = store().await;
    let reference = unique("T");
    store
        .insert(&transaction(&reference, Payer::Individual(unique("628"))))
        .await
        .unwrap();

    let paid_at = Some(Utc::now());
    let (a, b) = tokio::join!(
        store.transition_status(&reference, TransactionStatus::Unpaid, TransactionStatus::Paid, paid_at),
        store.transition_status(&reference, TransactionStatus::Unpaid, TransactionStatus::Paid, paid_at),
    );
    assert_ne!(a.unwrap(), b.unwrap());
    assert_eq!(
        store.current_status(&reference).await.unwrap(),
        Some(TransactionStatus::Paid)
    );
    assert!(store.find(&reference).await.unwrap().unwrap().paid_at.is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn history_is_scoped_to_payer() {
    let store = store().await;
    let group = unique("g");
    for _ in 0..3 {
        store
            .insert(&transaction(&unique("G"), Payer::Group(group.clone())))
            .await
            .unwrap();
    }

    let page = store.history(&Payer::Group(group), 1, 2).await.unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.history.len(), 2);
    assert!(page.has_next);
    assert!(page.history[0].created_at >= page.history[1].created_at);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn entitlement_upsert_and_directory() {
    let store = store().await;
    let jid = unique("628");
    let lid = unique("lid");
    let now = Utc::now();

    assert!(store.get_entitlement(&jid, &lid).await.unwrap().is_none());
    let first = Entitlement::activate(None, jid.clone(), lid.clone(), Plan::User15d, now);
    store.upsert_entitlement(&first).await.unwrap();

    let stored = store.get_entitlement(&jid, &lid).await.unwrap().unwrap();
    let second = Entitlement::activate(Some(&stored), jid.clone(), lid.clone(), Plan::User1m, now);
    store.upsert_entitlement(&second).await.unwrap();

    let stored = store.get_entitlement(&jid, &lid).await.unwrap().unwrap();
    assert_eq!(stored.max_special_limit, 15);
    let expected = now + Duration::days(45);
    assert!((stored.expired.unwrap() - expected).num_seconds().abs() <= 1);

    sqlx::query("INSERT INTO users (phone_number, lid) VALUES ($1, $2)")
        .bind(&jid)
        .bind(&lid)
        .execute(store.pool())
        .await
        .unwrap();
    assert_eq!(store.lid_for_phone(&jid).await.unwrap(), Some(lid.clone()));
    assert_eq!(store.push_name(&lid).await.unwrap(), None);
}
