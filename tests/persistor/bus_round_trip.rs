//! Requests travelling over the bus to a provisioned persistor.

use serde_json::json;

use crate::common::*;

#[tokio::test]
async fn insert_then_find_by_id() {
    let run = Running::with_views().await;
    let inserted = run
        .send(json!({"action": "insert", "document": {"name": "ada", "age": 36}}))
        .await;
    assert_eq!(inserted["status"], "ok");
    let id = inserted["id"].as_str().unwrap();

    let found = run.send(json!({"action": "find_by_id", "id": id})).await;
    assert_eq!(found["status"], "ok");
    assert_eq!(found["document"]["name"], "ada");
    assert_eq!(found["cas"], inserted["cas"]);
}

#[tokio::test]
async fn find_by_view_over_published_views() {
    let run = Running::with_views().await;
    run.save("u1", json!({"name": "carol", "age": 41})).await;
    run.save("u2", json!({"name": "alice", "age": 30})).await;
    run.save("u3", json!({"name": "bob", "age": 30})).await;

    let by_name = run
        .send(json!({
            "action": "find_by_view",
            "designDoc": "dev_users",
            "viewName": "by_name",
            "query": {"startkey": "b"}
        }))
        .await;
    assert_eq!(by_name["status"], "ok");
    let names: Vec<&str> = by_name["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["bob", "carol"]);

    let by_age = run
        .send(json!({
            "action": "find_by_view",
            "designDoc": "dev_users",
            "viewName": "by_age",
            "query": {"key": 30}
        }))
        .await;
    assert_eq!(by_age["result"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn find_by_ids_returns_hits_only() {
    let run = Running::with_views().await;
    run.save("a", json!({"n": 1})).await;
    run.save("b", json!({"n": 2})).await;

    let reply = run
        .send(json!({"action": "find_by_ids", "ids": ["a", "missing", "b"]}))
        .await;
    assert_eq!(reply["status"], "ok");
    let result = reply["result"].as_object().unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result["b"]["n"], 2);
}

#[tokio::test]
async fn conditional_update_and_delete() {
    let run = Running::with_views().await;
    let saved = run.save("doc", json!({"v": 1})).await;

    let updated = run
        .send(json!({"action": "update", "cas": saved["cas"], "document": {"id": "doc", "v": 2}}))
        .await;
    assert_eq!(updated["status"], "ok");

    let misplaced = run
        .send(json!({"action": "delete", "id": "doc", "cas": updated["cas"]}))
        .await;
    assert_eq!(misplaced["message"], "document must be specified");

    let stale = run
        .send(json!({"action": "delete", "document": {"id": "doc"}, "cas": saved["cas"]}))
        .await;
    assert_eq!(stale["status"], "error");
    assert_eq!(stale["message"], "cas mismatch for key: doc");
    assert!(stale["exception"].is_string());

    let deleted = run
        .send(json!({"action": "delete", "document": {"id": "doc"}, "cas": updated["cas"]}))
        .await;
    assert_eq!(deleted, json!({"status": "ok", "id": "doc"}));

    let gone = run.send(json!({"action": "find_by_id", "id": "doc"})).await;
    assert_eq!(gone["status"], "error");
}

#[tokio::test]
async fn counter_and_touch() {
    let run = Running::with_views().await;
    let req = json!({"action": "counter", "key": "visits", "operation": "increment", "by": 2});
    assert_eq!(run.send(req.clone()).await["counter"], 0);
    assert_eq!(run.send(req).await["counter"], 2);

    let touched = run
        .send(json!({"action": "touch", "key": "visits", "expiration": 120}))
        .await;
    assert_eq!(touched, json!({"status": "ok", "key": "visits"}));
}

#[tokio::test]
async fn routing_errors_come_back_as_replies() {
    let run = Running::with_views().await;
    let reply = run.send(json!({"document": {}})).await;
    assert_eq!(
        reply,
        json!({"status": "error", "message": "action must be specified"})
    );
    let reply = run.send(json!({"action": "truncate"})).await;
    assert_eq!(reply["message"], "Invalid action: truncate");
}
