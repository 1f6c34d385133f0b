use crate::helpers::*;

#[tokio::test]
async fn test_destroy_closes_gap() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 4).await;
    let ids: Vec<_> = items.iter().map(|r| r.id().unwrap()).collect();

    instance.destroy(&mut items[1]).await.unwrap();

    assert!(items[1].is_destroyed());
    assert_eq!(order_of(&instance, 1).await, [ids[0], ids[2], ids[3]]);
    assert_dense(&instance, 1).await;
    assert!(instance.find("Item", ids[1]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_destroy_last_and_only() {
    let instance = test_instance().await;
    let mut items = create_items(&instance, 1, 2).await;

    instance.destroy(&mut items[1]).await.unwrap();
    assert_eq!(order_of(&instance, 1).await, [items[0].id().unwrap()]);

    instance.destroy(&mut items[0]).await.unwrap();
    assert!(order_of(&instance, 1).await.is_empty());
}

#[tokio::test]
async fn test_destroy_uses_stored_scope() {
    let instance = test_instance().await;
    let mut first = create_items(&instance, 1, 3).await;
    let second = create_items(&instance, 2, 1).await;

    // An unsaved scope change must not redirect the gap closing.
    first[0].set("list_id", 2);
    instance.destroy(&mut first[0]).await.unwrap();

    assert_eq!(
        order_of(&instance, 1).await,
        [first[1].id().unwrap(), first[2].id().unwrap()]
    );
    assert_dense(&instance, 1).await;
    assert_eq!(order_of(&instance, 2).await, [second[0].id().unwrap()]);
}

#[tokio::test]
async fn test_destroy_leaves_other_scopes() {
    let instance = test_instance().await;
    let mut first = create_items(&instance, 1, 2).await;
    create_items(&instance, 2, 3).await;
    let before = arrangement(&instance, 2).await;

    instance.destroy(&mut first[0]).await.unwrap();
    assert_eq!(arrangement(&instance, 2).await, before);
}
