use positioning::{PositionRequest, Record};

use crate::helpers::*;

#[tokio::test]
async fn test_prior_and_subsequent_walk_the_scope() {
    let instance = test_instance().await;
    let items = create_items(&instance, 1, 4).await;
    create_items(&instance, 2, 2).await;

    let mut walked = vec![items[0].id().unwrap()];
    let mut current = reload(&instance, &items[0]).await;
    while let Some(next) = instance.subsequent(&current, "position").await.unwrap() {
        walked.push(next.id().unwrap());
        current = next;
    }
    assert_eq!(walked, order_of(&instance, 1).await);

    let mut back = Vec::new();
    while let Some(prior) = instance.prior(&current, "position").await.unwrap() {
        back.push(prior.id().unwrap());
        current = prior;
    }
    assert_eq!(back.len(), 3);
    assert_eq!(current.id(), items[0].id());
}

#[tokio::test]
async fn test_unsaved_record_has_no_neighbours() {
    let instance = test_instance().await;
    create_items(&instance, 1, 2).await;

    let unsaved = Record::new("Item").with("list_id", 1);
    assert!(instance.prior(&unsaved, "position").await.unwrap().is_none());
    assert!(instance.subsequent(&unsaved, "position").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_create_restores_record() {
    let instance = test_instance().await;
    let other = create_items(&instance, 2, 1).await;

    let mut record = Record::new("Item")
        .with("list_id", 1)
        .with_position("position", PositionRequest::After(other[0].id()));
    let before = record.clone();
    let err = instance.create(&mut record).await.unwrap_err();

    assert!(err.is_position_error());
    assert!(err.is_validation_error());
    assert_eq!(record, before);
    assert!(order_of(&instance, 1).await.is_empty());
}

#[tokio::test]
async fn test_destroyed_record_cannot_be_saved() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 1).await;
    instance.destroy(&mut items[0]).await.unwrap();

    items[0].set("position", 1);
    let err = instance.update(&mut items[0]).await.unwrap_err();
    assert!(err.is_state_error());
}
