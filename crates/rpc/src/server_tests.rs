//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use cid::Cid;
use custody_core::CustodyTracker;
use custody_storage::MemoryCustodyStore;
use custody_types::{ContentId, Deal, DealState, Finalization, Pin, PinStatus, Timestamp};
use http_body_util::BodyExt;
use multihash_codetable::{Code, MultihashDigest};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::server::{build_router, AppState};

fn cid(seed: &str) -> ContentId {
    ContentId::new(Cid::new_v1(0x70, Code::Sha2_256.digest(seed.as_bytes())))
}

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn create_test_router() -> Router {
    let tracker = Arc::new(CustodyTracker::new(Arc::new(MemoryCustodyStore::new())));
    build_router(Arc::new(AppState::new(tracker, "test-node")))
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let router = create_test_router();
    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["node_id"], "test-node");
}

#[tokio::test]
async fn test_status_of_unknown_cid_is_404() {
    let router = create_test_router();
    let uri = format!("/api/{}", cid("missing"));
    let (status, body) = send(&router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert!(body["error"]["message"].as_str().unwrap().contains("No custody record"));
}

#[tokio::test]
async fn test_malformed_cid_is_400() {
    let router = create_test_router();
    let (status, body) = send(&router, Method::GET, "/api/not-a-cid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_ingest_then_read_status() {
    let router = create_test_router();
    let root = cid("root");
    let pin = Pin::new("req-1", root, PinStatus::Pinned, at(0));
    let (status, body) = send(
        &router,
        Method::POST,
        "/ingest/pins",
        Some(serde_json::to_value(&pin).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["outcome"], "created");

    let deal = Deal::queued(root, 1, at(0)).advance(
        3,
        at(3),
        DealState::Active(Finalization {
            miner: "f01".into(),
            chain_deal_id: 8,
            deal_activation_timestamp: at(10),
            deal_expiration_timestamp: at(100),
        }),
    );
    let (status, _) = send(
        &router,
        Method::POST,
        "/ingest/deals",
        Some(serde_json::to_value(&deal).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, Method::GET, &format!("/api/{root}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["value"]["cid"], root.to_string());
    assert_eq!(body["value"]["deals"]["status"], "finalized");
    assert_eq!(body["value"]["deals"]["deals"][0]["miner"], "f01");
    assert_eq!(body["value"]["pin"]["requestid"], "req-1");
    assert_eq!(body["value"]["pin"]["status"], "pinned");
}

#[tokio::test]
async fn test_pin_regression_is_409() {
    let router = create_test_router();
    let root = cid("root");
    let pinned = Pin::new("req", root, PinStatus::Pinned, at(0));
    send(
        &router,
        Method::POST,
        "/ingest/pins",
        Some(serde_json::to_value(&pinned).unwrap()),
    )
    .await;

    let regressed = pinned.transitioned(PinStatus::Queued, at(5));
    let (status, body) = send(
        &router,
        Method::POST,
        "/ingest/pins",
        Some(serde_json::to_value(&regressed).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_delete_hides_content() {
    let router = create_test_router();
    let root = cid("root");
    let pin = Pin::new("req", root, PinStatus::Queued, at(0));
    send(
        &router,
        Method::POST,
        "/ingest/pins",
        Some(serde_json::to_value(&pin).unwrap()),
    )
    .await;

    let uri = format!("/api/{root}");
    let (status, body) = send(&router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["deleted"], true);

    let (status, _) = send(&router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_claims_structure_and_backups() {
    let router = create_test_router();
    let root = cid("root");
    let claim = json!({
        "cid": root.to_string(),
        "partition": cid("car-0").to_string(),
        "blocks": [cid("b0").to_string()],
        "dagBlocks": [cid("b0").to_string()],
        "verification": "verified",
    });
    let (status, body) = send(&router, Method::POST, "/ingest/claims", Some(claim)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["structure"], "Complete");

    let (_, body) = send(&router, Method::GET, &format!("/api/{root}/structure"), None).await;
    assert_eq!(body["value"]["structure"], "Complete");
    assert_eq!(body["value"]["parts"][0], cid("car-0").to_string());

    let backup = json!({
        "structure": "Complete",
        "sourceCid": root.to_string(),
        "contentCid": cid("content").to_string(),
        "carCid": cid("car-0").to_string(),
    });
    let (status, _) = send(&router, Method::POST, "/ingest/backups", Some(backup.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let mut conflicting = backup;
    conflicting["contentCid"] = json!(cid("other").to_string());
    let (status, _) = send(&router, Method::POST, "/ingest/backups", Some(conflicting)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&router, Method::GET, &format!("/api/{root}/backups"), None).await;
    assert_eq!(body["value"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metrics_disabled_without_exporter() {
    let router = create_test_router();
    let (status, body) = send(&router, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
}
