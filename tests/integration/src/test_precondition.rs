//! Conditional-request scenarios over object ETags.

use crate::{client, create_test_namespace, url};

async fn put_object(client: &reqwest::Client, obj: &str, body: &'static [u8]) -> reqwest::Response {
    client
        .put(url(obj))
        .header("content-length", body.len())
        .body(body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"))
}

fn etag_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("no ETag header"))
        .to_owned()
}

#[tokio::test]
#[ignore]
async fn test_should_gate_updates_on_if_match() {
    let client = client();
    let ns = create_test_namespace(&client, "pre-ifmatch").await;
    let obj = format!("{ns}/obj");

    let response = put_object(&client, &obj, b"first contents").await;
    assert_eq!(response.status(), 201);
    let etag = etag_of(&response);

    // A stale tag fails the precondition.
    let response = client
        .put(url(&obj))
        .header("content-length", "7")
        .header("if-match", "\"wrongetag\"")
        .body("updated")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 412);

    // The correct tag admits the update.
    let response = client
        .put(url(&obj))
        .header("content-length", "7")
        .header("if-match", etag.clone())
        .body("updated")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201);

    // The old version can be deleted under its own ETag.
    let old_version = etag.trim_matches('"');
    let response = client
        .delete(url(&format!("{obj}:{old_version}")))
        .header("if-match", etag.clone())
        .send()
        .await
        .unwrap_or_else(|e| panic!("delete failed: {e}"));
    assert_eq!(response.status(), 204);
}

#[tokio::test]
#[ignore]
async fn test_should_gate_creation_on_if_none_match_star() {
    let client = client();
    let ns = create_test_namespace(&client, "pre-inm").await;
    let obj = format!("{ns}/obj");

    // First write: no content exists yet, so the guard passes.
    let response = client
        .put(url(&obj))
        .header("content-length", "5")
        .header("if-none-match", "*")
        .body("first")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201);

    // Second write under the same guard fails.
    let response = client
        .put(url(&obj))
        .header("content-length", "5")
        .header("if-none-match", "*")
        .body("again")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 412);
}

#[tokio::test]
#[ignore]
async fn test_should_return_not_modified_on_matching_read() {
    let client = client();
    let ns = create_test_namespace(&client, "pre-304").await;
    let obj = format!("{ns}/obj");

    let response = put_object(&client, &obj, b"cached contents").await;
    let etag = etag_of(&response);

    let response = client
        .get(url(&obj))
        .header("if-none-match", etag.clone())
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 304);

    // A mismatching tag serves the full body.
    let response = client
        .get(url(&obj))
        .header("if-none-match", "\"something-else\"")
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
}
