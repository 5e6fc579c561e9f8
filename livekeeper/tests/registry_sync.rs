mod common;

use common::{Harness, advance, registry_path};
use livekeeper::domain::{Entity, SubscriptionFlags};
use livekeeper::registry::RegistryStore;

#[tokio::test(start_paused = true)]
async fn external_edits_are_reconciled() {
    let h = Harness::new(&[]).await;
    h.provider.set_live(6, true);
    let _plane = h.start();
    advance(1).await;
    assert!(h.container.mailboxes.entity_ids().is_empty());

    std::fs::write(
        registry_path(&h.temp),
        r#"{"entities": [{"id": 6, "notify_live": true}]}"#,
    )
    .unwrap();
    advance(7).await;

    assert_eq!(h.container.mailboxes.entity_ids(), vec![6]);
    assert!(h.container.board.is_live(6));

    std::fs::write(registry_path(&h.temp), r#"{"entities": []}"#).unwrap();
    advance(7).await;

    assert!(h.container.mailboxes.entity_ids().is_empty());
    assert!(!h.container.board.is_live(6));
}

#[tokio::test(start_paused = true)]
async fn malformed_edit_keeps_previous_state() {
    let h = Harness::new(&[Entity::new(
        4,
        SubscriptionFlags {
            notify_live: true,
            ..Default::default()
        },
    )])
    .await;
    let _plane = h.start();
    advance(1).await;
    assert_eq!(h.container.mailboxes.entity_ids(), vec![4]);

    std::fs::write(registry_path(&h.temp), "{ not json").unwrap();
    advance(7).await;

    assert_eq!(h.container.mailboxes.entity_ids(), vec![4]);
    assert_eq!(h.container.registry.snapshot().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn own_writes_are_not_treated_as_external() {
    let h = Harness::new(&[]).await;
    let _plane = h.start();
    advance(1).await;

    let response = h
        .container
        .commands()
        .add_subscription(
            2,
            SubscriptionFlags {
                notify_offline: true,
                ..Default::default()
            },
            None,
            Some("bob".into()),
        )
        .await;
    assert!(response.success);
    assert!(!h.store.poll_for_external_change().await.unwrap());

    advance(1).await;
    assert_eq!(h.container.mailboxes.entity_ids(), vec![2]);
}

#[tokio::test]
async fn snapshot_round_trip_is_order_independent() {
    let h = Harness::new(&[
        Entity::new(9, SubscriptionFlags::ALL).with_name("z"),
        Entity::new(
            3,
            SubscriptionFlags {
                record: true,
                ..Default::default()
            },
        ),
    ])
    .await;

    let loaded = h.store.load_snapshot().await.unwrap();
    h.store.save_snapshot(&loaded).await.unwrap();
    let mut again = h.store.load_snapshot().await.unwrap();
    let mut expected = loaded.clone();
    again.sort_by_key(|e| e.id);
    expected.sort_by_key(|e| e.id);
    assert_eq!(again, expected);
}
