use super::*;

fn phone(value: &str) -> PhoneNumber {
    PhoneNumber::new(value).unwrap()
}

#[tokio::test]
async fn test_finds_active_provisioned_merchant() {
    let store = InMemoryMerchantStore::new();
    store.insert(MerchantRecord::active("m-1", "+2348000000000"));

    let found = store
        .find_active_merchant(&phone("+2348000000000"))
        .await
        .unwrap();

    assert_eq!(found, Some(MerchantId::new("m-1").unwrap()));
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn test_inactive_or_unprovisioned_merchants_do_not_match() {
    let store = InMemoryMerchantStore::new();
    store.insert(MerchantRecord {
        status: "suspended".to_string(),
        ..MerchantRecord::active("m-1", "+111")
    });
    store.insert(MerchantRecord {
        phone_number_id: None,
        ..MerchantRecord::active("m-2", "+222")
    });

    assert_eq!(store.find_active_merchant(&phone("+111")).await.unwrap(), None);
    assert_eq!(store.find_active_merchant(&phone("+222")).await.unwrap(), None);
}

#[tokio::test]
async fn test_phone_match_is_exact() {
    let store = InMemoryMerchantStore::new();
    store.insert(MerchantRecord::active("m-1", "+2348000000000"));

    let found = store
        .find_active_merchant(&phone("2348000000000"))
        .await
        .unwrap();

    assert_eq!(found, None);
}

#[tokio::test]
async fn test_unavailable_store_fails() {
    let store = InMemoryMerchantStore::new();
    store.set_unavailable(true);

    assert!(store.ping().await.is_err());
    let err = store
        .find_active_merchant(&phone("+1"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
