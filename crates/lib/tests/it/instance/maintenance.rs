use positioning::Record;

use crate::helpers::*;

async fn card_positions(instance: &positioning::Instance, board: i64) -> Vec<Option<i64>> {
    let probe = Record::new("Card").with("board_id", board);
    instance
        .siblings(&probe, "position")
        .await
        .unwrap()
        .iter()
        .map(|card| card.position("position"))
        .collect()
}

#[tokio::test]
async fn test_verify_reports_broken_scopes() {
    let instance = test_instance().await;
    for position in [Some(1), Some(3), Some(3), None] {
        insert_raw_card(&instance, 1, position).await;
    }
    for position in [Some(1), Some(2)] {
        insert_raw_card(&instance, 2, position).await;
    }

    let reports = instance.verify("Card", "position").await.unwrap();
    assert_eq!(reports.len(), 2);

    let broken = reports
        .iter()
        .find(|report| !report.is_dense())
        .expect("no broken scope reported");
    assert_eq!(broken.count, 4);
    assert_eq!(broken.gaps, [2, 4]);
    assert_eq!(broken.duplicates, [3]);
    assert_eq!(broken.unpositioned, 1);

    assert_eq!(reports.iter().filter(|report| report.is_dense()).count(), 1);
}

#[tokio::test]
async fn test_heal_renumbers_in_current_order() {
    let instance = test_instance().await;
    let a = insert_raw_card(&instance, 1, Some(5)).await;
    let b = insert_raw_card(&instance, 1, None).await;
    let c = insert_raw_card(&instance, 1, Some(2)).await;
    let d = insert_raw_card(&instance, 1, Some(2)).await;
    insert_raw_card(&instance, 2, Some(1)).await;

    let report = instance.heal("Card", "position").await.unwrap();
    assert_eq!(report.scopes, 2);
    assert_eq!(report.rows, 5);
    // d already sits in its final slot.
    assert_eq!(report.renumbered, 3);

    let order: Vec<_> = instance
        .siblings(&Record::new("Card").with("board_id", 1), "position")
        .await
        .unwrap()
        .iter()
        .map(|card| card.id().unwrap())
        .collect();
    assert_eq!(order, [c, d, a, b]);
    assert_eq!(card_positions(&instance, 1).await, [Some(1), Some(2), Some(3), Some(4)]);

    let reports = instance.verify("Card", "position").await.unwrap();
    assert!(reports.iter().all(|report| report.is_dense()));
}

#[tokio::test]
async fn test_heal_of_dense_column_writes_nothing() {
    let instance = test_instance().await;
    create_items(&instance, 1, 3).await;
    create_items(&instance, 2, 2).await;

    let report = instance.heal("Item", "position").await.unwrap();
    assert_eq!(report.scopes, 2);
    assert_eq!(report.rows, 5);
    assert_eq!(report.renumbered, 0);
}

#[tokio::test]
async fn test_positioning_works_after_heal() {
    let instance = test_instance().await;
    insert_raw_card(&instance, 1, Some(4)).await;
    insert_raw_card(&instance, 1, Some(9)).await;
    instance.heal("Card", "position").await.unwrap();

    let mut card = Record::new("Card").with("board_id", 1).with("position", 2);
    instance.create(&mut card).await.unwrap();
    assert_eq!(card_positions(&instance, 1).await, [Some(1), Some(2), Some(3)]);
}

#[tokio::test]
async fn test_verify_unknown_column() {
    let instance = test_instance().await;
    let err = instance.verify("Card", "rank").await.unwrap_err();
    assert!(err.is_not_found());
}
