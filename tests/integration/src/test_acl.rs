//! ACL subresource scenarios: list management, entry management, the
//! owner-stripping guard, and read enforcement.

use crate::{TEST_CLIENT, client, create_test_namespace, url};

async fn seed_object(client: &reqwest::Client, prefix: &str) -> String {
    let ns = create_test_namespace(client, prefix).await;
    let obj = format!("{ns}/obj1");
    let response = client
        .put(url(&obj))
        .header("content-length", "5")
        .body("bytes")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201);
    obj
}

#[tokio::test]
#[ignore]
async fn test_should_manage_acl_lists_and_entries() {
    let client = client();
    let obj = seed_object(&client, "acl-manage").await;

    // Stripping every owner is refused.
    let response = client
        .put(url(&format!("{obj};acl/owner")))
        .json(&serde_json::json!([]))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 400);

    // Replace the owner list (keeping the test client in it) under the
    // current ACL ETag.
    let response = client
        .get(url(&format!("{obj};acl/owner")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    let etag = response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("no ETag"))
        .to_owned();

    let response = client
        .put(url(&format!("{obj};acl/owner")))
        .header("if-match", etag)
        .json(&serde_json::json!([TEST_CLIENT, "R1", "R2"]))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 204);

    // The list reads back.
    let response = client
        .get(url(&format!("{obj};acl/owner")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    let roles: Vec<String> = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad json: {e}"));
    assert!(roles.contains(&"R1".to_owned()));
    assert!(roles.contains(&"R2".to_owned()));

    // Entry-level removal and lookup.
    let response = client
        .delete(url(&format!("{obj};acl/owner/R2")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("delete failed: {e}"));
    assert_eq!(response.status(), 204);

    let response = client
        .get(url(&format!("{obj};acl/owner/R2")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 404);

    // Entry-level insertion with a bare PUT.
    let response = client
        .put(url(&format!("{obj};acl/update/R3")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 204);
    let response = client
        .get(url(&format!("{obj};acl/update/R3")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_should_reject_stale_acl_preconditions() {
    let client = client();
    let obj = seed_object(&client, "acl-precondition").await;

    let response = client
        .put(url(&format!("{obj};acl/owner")))
        .header("if-match", "\"not-the-current-hash\"")
        .json(&serde_json::json!([TEST_CLIENT]))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 412);
}

#[tokio::test]
#[ignore]
async fn test_should_reject_invalid_acl_documents() {
    let client = client();
    let obj = seed_object(&client, "acl-invalid").await;

    // Non-array body.
    let response = client
        .put(url(&format!("{obj};acl/update")))
        .json(&serde_json::json!({"roles": ["R1"]}))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 400);

    // An access class that does not exist on objects.
    let response = client
        .get(url(&format!("{obj};acl/create")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_should_deny_anonymous_access_to_owned_content() {
    let authed = client();
    let obj = seed_object(&authed, "acl-anon").await;

    // No identity headers at all.
    let anonymous = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| panic!("client: {e}"));

    let response = anonymous
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 401);

    // Granting wildcard read opens the object up.
    let response = authed
        .put(url(&format!("{obj};acl/subtree-read")))
        .json(&serde_json::json!(["*"]))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 204);

    let response = anonymous
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
}
