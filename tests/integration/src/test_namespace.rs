//! Namespace lifecycle scenarios: create, conflict on re-create, listing,
//! delete, and non-reuse of deleted names.

use crate::{client, create_test_namespace, url};

#[tokio::test]
#[ignore]
async fn test_should_create_conflict_delete_and_reserve_namespace() {
    let client = client();
    let ns = create_test_namespace(&client, "ns-lifecycle").await;

    // Re-creating the same namespace conflicts.
    let response = client
        .put(url(&ns))
        .header("content-type", "application/x-hatrac-namespace")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 409);

    // Empty delete succeeds.
    let response = client
        .delete(url(&ns))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 204);

    // Deleted names are permanently reserved: restoration is refused.
    let response = client
        .put(url(&ns))
        .header("content-type", "application/x-hatrac-namespace")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 409);

    // And so is rebinding to the other kind.
    let response = client
        .put(url(&ns))
        .header("content-type", "text/plain")
        .header("content-length", "3")
        .body("abc")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_should_list_direct_children_as_json_and_uri_list() {
    let client = client();
    let ns = create_test_namespace(&client, "ns-listing").await;

    // One child namespace, one child object.
    let child_ns = format!("{ns}/sub");
    let response = client
        .put(url(&child_ns))
        .header("content-type", "application/x-hatrac-namespace")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 201);

    let child_obj = format!("{ns}/obj");
    let response = client
        .put(url(&child_obj))
        .header("content-type", "application/octet-stream")
        .header("content-length", "5")
        .body("bytes")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 201);

    // JSON listing (default) carries both children.
    let response = client
        .get(url(&ns))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("etag"));
    let listing: Vec<String> = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad listing: {e}"));
    assert!(listing.contains(&child_ns));
    assert!(listing.contains(&child_obj));

    // uri-list listing on Accept.
    let response = client
        .get(url(&ns))
        .header("accept", "text/uri-list")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/uri-list")
    );
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert!(body.lines().any(|line| line.ends_with(&child_obj)));

    // Deleting a non-empty namespace conflicts.
    let response = client
        .delete(url(&ns))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_should_auto_create_parents_on_request() {
    let client = client();
    let ns = create_test_namespace(&client, "ns-parents").await;

    // Without parents=true, a missing intermediate conflicts.
    let deep = format!("{ns}/a/b/obj");
    let response = client
        .put(url(&deep))
        .header("content-length", "3")
        .body("abc")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 409);

    // With parents=true, the ancestors come into being.
    let response = client
        .put(format!("{}?parents=true", url(&deep)))
        .header("content-length", "3")
        .body("abc")
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 201);

    let response = client
        .get(url(&format!("{ns}/a")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_should_reject_malformed_paths() {
    let client = client();

    // ':' is meta-syntax and only valid as a version qualifier on the
    // final segment.
    let response = client
        .get(url("/a:b/c"))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 400);

    // A double version qualifier is malformed.
    let response = client
        .get(url("/ns/obj:v1:v2"))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 400);

    // An unknown subresource token is malformed.
    let response = client
        .get(url("/ns/obj;snapshots"))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_should_head_mirror_listing_without_body() {
    let client = client();
    let ns = create_test_namespace(&client, "ns-head").await;

    let response = client
        .head(url(&ns))
        .send()
        .await
        .unwrap_or_else(|e| panic!("request failed: {e}"));
    assert_eq!(response.status(), 200);
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert!(body.is_empty());
}
