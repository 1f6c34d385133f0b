use positioning::{PositionRequest, Record};

use crate::helpers::*;

#[tokio::test]
async fn test_move_down_within_scope() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 5).await;
    let ids: Vec<_> = items.iter().map(|r| r.id().unwrap()).collect();

    items[1].set("position", 4);
    instance.update(&mut items[1]).await.unwrap();

    assert_eq!(
        order_of(&instance, 1).await,
        [ids[0], ids[2], ids[3], ids[1], ids[4]]
    );
    assert_dense(&instance, 1).await;
}

#[tokio::test]
async fn test_move_up_within_scope() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 5).await;
    let ids: Vec<_> = items.iter().map(|r| r.id().unwrap()).collect();

    items[4].set("position", 2);
    instance.update(&mut items[4]).await.unwrap();

    assert_eq!(
        order_of(&instance, 1).await,
        [ids[0], ids[4], ids[1], ids[2], ids[3]]
    );
    assert_dense(&instance, 1).await;
}

#[tokio::test]
async fn test_move_is_clamped_to_scope_size() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 3).await;

    items[0].set("position", 10);
    instance.update(&mut items[0]).await.unwrap();
    assert_eq!(items[0].position("position"), Some(3));

    items[0].set("position", -10);
    instance.update(&mut items[0]).await.unwrap();
    assert_eq!(items[0].position("position"), Some(1));
    assert_dense(&instance, 1).await;
}

#[tokio::test]
async fn test_reassigning_same_position_keeps_arrangement() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 3).await;
    let before = order_of(&instance, 1).await;

    items[1].set_position("position", 2);
    instance.update(&mut items[1]).await.unwrap();

    assert_eq!(order_of(&instance, 1).await, before);
    assert_eq!(items[1].position("position"), Some(2));
}

#[tokio::test]
async fn test_scope_change_closes_and_opens_gaps() {
    let instance = test_instance().await;
    let mut first = create_items(&instance, 1, 3).await;
    let second = create_items(&instance, 2, 2).await;

    first[0].set("list_id", 2);
    first[0].set("position", 2);
    instance.update(&mut first[0]).await.unwrap();

    assert_eq!(
        order_of(&instance, 1).await,
        [first[1].id().unwrap(), first[2].id().unwrap()]
    );
    assert_eq!(
        order_of(&instance, 2).await,
        [
            second[0].id().unwrap(),
            first[0].id().unwrap(),
            second[1].id().unwrap(),
        ]
    );
    assert_dense(&instance, 1).await;
    assert_dense(&instance, 2).await;
}

#[tokio::test]
async fn test_scope_change_without_position_goes_last() {
    let instance = test_instance().await;
    let mut first = create_items(&instance, 1, 2).await;
    create_items(&instance, 2, 2).await;

    first[1].set("list_id", 2);
    instance.update(&mut first[1]).await.unwrap();

    assert_eq!(first[1].position("position"), Some(3));
    assert_eq!(position_of(&instance, &first[0]).await, Some(1));
    assert_dense(&instance, 2).await;
}

#[tokio::test]
async fn test_scope_change_with_first() {
    let instance = test_instance().await;
    let mut first = create_items(&instance, 1, 2).await;
    let second = create_items(&instance, 2, 2).await;

    first[1].set("list_id", 2);
    first[1].set_position("position", PositionRequest::First);
    instance.update(&mut first[1]).await.unwrap();

    assert_eq!(
        order_of(&instance, 2).await,
        [
            first[1].id().unwrap(),
            second[0].id().unwrap(),
            second[1].id().unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_update_of_other_attributes_leaves_positions() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 3).await;
    let before = arrangement(&instance, 1).await;

    items[2].set("name", "renamed");
    instance.update(&mut items[2]).await.unwrap();

    assert_eq!(arrangement(&instance, 1).await, before);
    let stored = reload(&instance, &items[2]).await;
    assert_eq!(stored.get("name").as_text(), Some("renamed"));
}

#[tokio::test]
async fn test_subtype_shares_base_scope() {
    let instance = test_instance().await;
    let items = create_items(&instance, 1, 2).await;

    let mut special = Record::new("SpecialItem")
        .with("list_id", 1)
        .with("position", 1);
    instance.create(&mut special).await.unwrap();

    assert_eq!(special.get("type").as_text(), Some("SpecialItem"));
    assert_eq!(
        order_of(&instance, 1).await,
        [
            special.id().unwrap(),
            items[0].id().unwrap(),
            items[1].id().unwrap(),
        ]
    );

    let found = instance
        .find("Item", special.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.entity(), "SpecialItem");
}

#[tokio::test]
async fn test_letters_scenario() {
    // A1 B2 C3, move C to 1: C1 A2 B3, then A to 3: C1 B2 A3.
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 3).await;
    let (a, b, c) = (
        items[0].id().unwrap(),
        items[1].id().unwrap(),
        items[2].id().unwrap(),
    );

    items[2].set("position", 1);
    instance.update(&mut items[2]).await.unwrap();
    assert_eq!(order_of(&instance, 1).await, [c, a, b]);

    let mut a_record = reload(&instance, &items[0]).await;
    a_record.set("position", 3);
    instance.update(&mut a_record).await.unwrap();
    assert_eq!(order_of(&instance, 1).await, [c, b, a]);
}

#[tokio::test]
async fn test_unpositioned_rows_hold_no_slot() {
    let instance = test_instance().await;
    for position in [Some(1), Some(2), None, None] {
        insert_raw_card(&instance, 7, position).await;
    }

    let mut card = Record::new("Card").with("board_id", 7);
    instance.create(&mut card).await.unwrap();
    assert_eq!(card.position("position"), Some(3));

    let siblings = instance.siblings(&card, "position").await.unwrap();
    let mut unpositioned: Vec<Record> = siblings
        .into_iter()
        .filter(|sibling| sibling.position("position").is_none())
        .collect();
    assert_eq!(unpositioned.len(), 2);

    unpositioned[0].set_position("position", PositionRequest::Last);
    instance.update(&mut unpositioned[0]).await.unwrap();
    assert_eq!(unpositioned[0].position("position"), Some(4));

    unpositioned[1].set_position("position", PositionRequest::At(1));
    instance.update(&mut unpositioned[1]).await.unwrap();
    assert_eq!(unpositioned[1].position("position"), Some(1));

    assert_eq!(reload(&instance, &card).await.position("position"), Some(4));
    let report = instance
        .verify("Card", "position")
        .await
        .unwrap()
        .into_iter()
        .find(|report| report.count == 5)
        .expect("board 7 missing from the report");
    assert!(report.is_dense(), "{report:?}");
}
