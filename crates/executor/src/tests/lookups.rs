//! find_by_id and find_by_ids scenarios.

use serde_json::json;

use super::*;

#[tokio::test]
async fn test_find_by_ids_partial_hits() {
    let (_, d) = setup().await;
    assert_ok(&call(&d, json!({"action": "save", "document": {"id": "A", "n": 1}})).await);

    let reply = call(&d, json!({"action": "find_by_ids", "ids": ["A", "B"]})).await;
    assert_ok(&reply);
    let result = reply["result"].as_object().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result["A"]["n"], 1);

    let none = call(&d, json!({"action": "find_by_ids", "ids": ["B", "C"]})).await;
    assert_error(&none, "not found");
}

#[tokio::test]
async fn test_find_missing_id() {
    let (_, d) = setup().await;
    assert_error(&call(&d, json!({"action": "find_by_id", "id": "x"})).await, "not found");
    assert_error(
        &call(&d, json!({"action": "find_by_id"})).await,
        "id must be specified",
    );
}

#[tokio::test]
async fn test_lock_mode_blocks_plain_writes() {
    let (_, d) = setup().await;
    assert_ok(&call(&d, json!({"action": "save", "document": {"id": "a", "v": 1}})).await);

    let locked = call(
        &d,
        json!({"action": "find_by_id", "id": "a", "mode": "lock", "expiration": 10}),
    )
    .await;
    assert_ok(&locked);
    let token = locked["cas"].as_u64().unwrap();

    let blocked = call(&d, json!({"action": "save", "document": {"id": "a", "v": 2}})).await;
    assert_error(&blocked, "document locked: a");

    // plain reads still see the document, but not the token
    let plain = call(&d, json!({"action": "find_by_id", "id": "a"})).await;
    assert_ok(&plain);
    assert_ne!(plain["cas"].as_u64().unwrap(), token);

    let with_token = call(
        &d,
        json!({"action": "save", "document": {"id": "a", "v": 3}, "cas": token}),
    )
    .await;
    assert_ok(&with_token);

    // write with the token released the lock
    assert_ok(&call(&d, json!({"action": "save", "document": {"id": "a", "v": 4}})).await);
}

#[tokio::test]
async fn test_touch_mode_returns_document() {
    let (_, d) = setup().await;
    assert_ok(&call(&d, json!({"action": "save", "document": {"id": "a"}})).await);
    let reply = call(
        &d,
        json!({"action": "find_by_id", "id": "a", "mode": "touch", "expiration": 100}),
    )
    .await;
    assert_ok(&reply);
    assert_eq!(reply["document"]["id"], "a");

    let missing = call(
        &d,
        json!({"action": "find_by_id", "id": "zz", "mode": "touch", "expiration": 100}),
    )
    .await;
    assert_error(&missing, "not found");
}

#[tokio::test]
async fn test_expired_document_is_absent() {
    let (_, d) = setup().await;
    // absolute timestamp in the past
    assert_ok(
        &call(
            &d,
            json!({"action": "save", "document": {"id": "old"}, "expiration": 2_600_000 + 1}),
        )
        .await,
    );
    assert_error(
        &call(&d, json!({"action": "find_by_id", "id": "old"})).await,
        "not found",
    );
}

#[tokio::test]
async fn test_non_json_value_returned_as_string() {
    let (_, d) = setup().await;
    let saved = call(&d, json!({"action": "save", "document": {"id": "raw"}})).await;
    let swapped = call(
        &d,
        json!({"action": "cas", "key": "raw", "cas": saved["cas"], "value": "plain text"}),
    )
    .await;
    assert_ok(&swapped);

    let found = call(&d, json!({"action": "find_by_id", "id": "raw"})).await;
    assert_ok(&found);
    assert_eq!(found["document"], "plain text");
}
