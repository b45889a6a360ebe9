//! Gallery CRUD: listing, pagination, updates, deletion.

mod common;

use bytes::Bytes;
use common::setup;
use keepsake::services::media_host::HostError;
use keepsake::services::media_service::{
    DirectFile, GalleryError, ListMediaParams, MediaUpdate,
};
use uuid::Uuid;

async fn seed_item(env: &common::TestEnv, name: &str) -> keepsake::models::media::MediaItem {
    let items = env
        .service
        .direct_upload(
            vec![DirectFile {
                file_name: name.to_string(),
                file_type: "image/jpeg".into(),
                data: Bytes::from_static(b"payload"),
            }],
            Some("guest".into()),
            None,
        )
        .await
        .unwrap();
    items.into_iter().next().unwrap()
}

#[tokio::test]
async fn listing_is_newest_first_and_paginated() {
    let env = setup().await;
    let first = seed_item(&env, "a.jpg").await;
    let second = seed_item(&env, "b.jpg").await;
    let third = seed_item(&env, "c.jpg").await;

    let page = env
        .service
        .list_media(ListMediaParams {
            limit: 2,
            before: None,
        })
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, third.id);
    assert_eq!(page.items[1].id, second.id);
    let cursor = page.next_before.expect("more pages");

    let rest = env
        .service
        .list_media(ListMediaParams {
            limit: 2,
            before: Some(cursor),
        })
        .await
        .unwrap();
    assert_eq!(rest.items.len(), 1);
    assert_eq!(rest.items[0].id, first.id);
    assert!(rest.next_before.is_none());
}

#[tokio::test]
async fn hidden_items_leave_the_public_listing() {
    let env = setup().await;
    let item = seed_item(&env, "private.jpg").await;

    let updated = env
        .service
        .update_media(
            item.id,
            MediaUpdate {
                caption: Some("for us only".into()),
                tags: Some(vec!["ceremony".into()]),
                is_public: Some(false),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.caption, "for us only");
    assert_eq!(updated.tags.0, vec!["ceremony".to_string()]);
    assert!(!updated.is_public);
    assert!(updated.updated_at >= item.updated_at);

    let page = env
        .service
        .list_media(ListMediaParams {
            limit: 10,
            before: None,
        })
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn delete_removes_row_and_hosted_payload() {
    let env = setup().await;
    let item = seed_item(&env, "gone.jpg").await;

    env.service.delete_media(item.id).await.unwrap();

    let err = env.service.get_media(item.id).await.unwrap_err();
    assert!(matches!(err, GalleryError::MediaNotFound(_)));
    assert!(matches!(
        env.service.host.open(&item.public_id).await,
        Err(HostError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_item_lookups_fail_with_not_found() {
    let env = setup().await;
    let err = env.service.get_media(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, GalleryError::MediaNotFound(_)));
}
