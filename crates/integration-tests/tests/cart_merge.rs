//! Integration tests for folding a guest cart into a user cart at sign-in.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use bazaar_core::{Cart, CartIdentity};
use bazaar_integration_tests::{FailingCache, Harness, item, session, session_id, user};
use bazaar_storefront::cart::{CacheKey, CartCache, CartError, CartStore, MergeOutcome};

fn merged(outcome: MergeOutcome) -> (Cart, usize) {
    match outcome {
        MergeOutcome::Merged { cart, lines } => (cart, lines),
        MergeOutcome::NothingToMerge => panic!("expected a merge"),
    }
}

#[tokio::test]
async fn test_merge_accumulates_and_deletes_session_cart() {
    let h = Harness::new();
    let guest = session("guest-1");
    let (user_id, account) = user();

    h.service
        .add_item(Some(&account), item(1, 2, "7", "red"))
        .await
        .unwrap();
    h.service
        .add_item(Some(&guest), item(1, 3, "7", "red"))
        .await
        .unwrap();
    h.service
        .add_item(Some(&guest), item(2, 1, "8", "blue"))
        .await
        .unwrap();

    let outcome = h
        .service
        .merge_carts(Some(&account), Some(&session_id("guest-1")))
        .await
        .unwrap();
    let (cart, lines) = merged(outcome);

    assert_eq!(lines, 2);
    assert_eq!(cart.identity, CartIdentity::User(user_id));
    assert_eq!(
        cart.items,
        vec![item(1, 5, "7", "red"), item(2, 1, "8", "blue")]
    );

    assert!(
        h.store
            .find_by_session(&session_id("guest-1"))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(h.store.inner.len().await, 1);
}

#[tokio::test]
async fn test_merge_creates_user_cart_when_missing() {
    let h = Harness::new();
    let (user_id, account) = user();
    h.service
        .add_item(Some(&session("guest-2")), item(1, 1, "", ""))
        .await
        .unwrap();

    let (cart, _) = merged(
        h.service
            .merge_carts(Some(&account), Some(&session_id("guest-2")))
            .await
            .unwrap(),
    );

    assert!(cart.is_persisted());
    let stored = h.store.find_by_user(user_id).await.unwrap().unwrap();
    assert_eq!(stored, cart);
    assert_eq!(stored.items, vec![item(1, 1, "", "")]);
}

#[tokio::test]
async fn test_merge_invalidates_both_cache_entries() {
    let h = Harness::new();
    let guest = session("guest-3");
    let (_, account) = user();
    h.service
        .add_item(Some(&account), item(1, 1, "", ""))
        .await
        .unwrap();
    h.service
        .add_item(Some(&guest), item(2, 1, "", ""))
        .await
        .unwrap();

    h.service
        .merge_carts(Some(&account), guest.session_id())
        .await
        .unwrap();

    assert_eq!(h.cache.get(&CacheKey::from(&account)).await.unwrap(), None);
    assert_eq!(h.cache.get(&CacheKey::from(&guest)).await.unwrap(), None);

    let cart = h.service.get_cart(Some(&account)).await.unwrap();
    assert_eq!(cart.items.len(), 2);
    let guest_cart = h.service.get_cart(Some(&guest)).await.unwrap();
    assert!(!guest_cart.is_persisted());
}

#[tokio::test]
async fn test_merge_without_session_cart_is_noop() {
    let h = Harness::new();
    let (user_id, account) = user();
    let before = h
        .service
        .add_item(Some(&account), item(1, 1, "", ""))
        .await
        .unwrap();
    let saves = h.store.saves();

    let outcome = h
        .service
        .merge_carts(Some(&account), Some(&session_id("nobody")))
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::NothingToMerge);

    let outcome = h.service.merge_carts(Some(&account), None).await.unwrap();
    assert_eq!(outcome, MergeOutcome::NothingToMerge);

    assert_eq!(h.store.saves(), saves);
    assert_eq!(h.store.find_by_user(user_id).await.unwrap(), Some(before));
}

#[tokio::test]
async fn test_merge_with_empty_session_cart_is_noop() {
    let h = Harness::new();
    let guest = session("guest-4");
    let (_, account) = user();
    h.service
        .add_item(Some(&guest), item(1, 1, "", ""))
        .await
        .unwrap();
    h.service.clear_cart(Some(&guest)).await.unwrap();
    let saves = h.store.saves();

    let outcome = h
        .service
        .merge_carts(Some(&account), guest.session_id())
        .await
        .unwrap();

    assert_eq!(outcome, MergeOutcome::NothingToMerge);
    assert_eq!(h.store.saves(), saves);
}

#[tokio::test]
async fn test_merge_twice_does_not_double_count() {
    let h = Harness::new();
    let guest = session("guest-5");
    let (user_id, account) = user();
    h.service
        .add_item(Some(&guest), item(1, 3, "7", "red"))
        .await
        .unwrap();

    h.service
        .merge_carts(Some(&account), guest.session_id())
        .await
        .unwrap();
    let second = h
        .service
        .merge_carts(Some(&account), guest.session_id())
        .await
        .unwrap();

    assert_eq!(second, MergeOutcome::NothingToMerge);
    let stored = h.store.find_by_user(user_id).await.unwrap().unwrap();
    assert_eq!(stored.items, vec![item(1, 3, "7", "red")]);
}

#[tokio::test]
async fn test_merge_requires_signed_in_user() {
    let h = Harness::new();
    let guest = session("guest-6");
    h.service
        .add_item(Some(&guest), item(1, 1, "", ""))
        .await
        .unwrap();

    let err = h
        .service
        .merge_carts(Some(&guest), guest.session_id())
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::Unauthorized));

    let err = h
        .service
        .merge_carts(None, guest.session_id())
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::Unauthorized));

    assert!(
        h.store
            .find_by_session(&session_id("guest-6"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_merge_succeeds_with_failing_cache() {
    let h = Harness::with_cache(Arc::new(FailingCache));
    let guest = session("guest-7");
    let (user_id, account) = user();
    h.service
        .add_item(Some(&guest), item(1, 2, "", ""))
        .await
        .unwrap();

    let (cart, lines) = merged(
        h.service
            .merge_carts(Some(&account), guest.session_id())
            .await
            .unwrap(),
    );

    assert_eq!(lines, 1);
    assert_eq!(cart.identity.user_id(), Some(user_id));
    assert!(
        h.store
            .find_by_session(&session_id("guest-7"))
            .await
            .unwrap()
            .is_none()
    );
}
