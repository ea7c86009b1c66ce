//! Object round trips: content PUT/GET with end-to-end digests, version
//! addressing, metadata, and current-pointer fallback on delete.

use crate::{client, content_md5, content_sha256, create_test_namespace, url};

const BODY: &[u8] = b"hello, world!\n";

/// PUT a payload and return the versioned path from the Location header.
async fn put_object(client: &reqwest::Client, path: &str, body: &'static [u8]) -> String {
    let response = client
        .put(url(path))
        .header("content-type", "application/octet-stream")
        .header("content-length", body.len())
        .header("content-md5", content_md5(body))
        .header("content-sha256", content_sha256(body))
        .body(body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201, "putting {path}");
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("no Location header"))
        .to_owned();
    assert!(
        location.contains(&format!("{path}:")),
        "location {location} should qualify {path}"
    );
    location
}

#[tokio::test]
#[ignore]
async fn test_should_round_trip_object_content_and_digests() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-roundtrip").await;
    let obj = format!("{ns}/obj1");

    put_object(&client, &obj, BODY).await;

    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-md5")
            .and_then(|v| v.to_str().ok()),
        Some(content_md5(BODY).as_str())
    );
    assert_eq!(
        response
            .headers()
            .get("content-sha256")
            .and_then(|v| v.to_str().ok()),
        Some(content_sha256(BODY).as_str())
    );
    let bytes = response
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(bytes.as_ref(), BODY);
    assert_eq!(content_md5(&bytes), content_md5(BODY));
}

#[tokio::test]
#[ignore]
async fn test_should_reject_digest_mismatch_on_put() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-baddigest").await;

    let response = client
        .put(url(&format!("{ns}/obj")))
        .header("content-length", BODY.len())
        .header("content-md5", content_md5(b"other data"))
        .body(BODY)
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 400);

    // Malformed digest encoding is also a 400.
    let response = client
        .put(url(&format!("{ns}/obj")))
        .header("content-length", BODY.len())
        .header("content-md5", "not!base64")
        .body(BODY)
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_should_address_specific_versions() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-versions").await;
    let obj = format!("{ns}/obj");

    let v1_location = put_object(&client, &obj, b"first contents").await;
    put_object(&client, &obj, b"second contents!").await;

    // The bare name serves the current (second) version.
    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    let bytes = response
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(bytes.as_ref(), b"second contents!");

    // The versioned reference still serves the first.
    let v1_path = crate::location_path(&v1_location);
    let response = client
        .get(url(&v1_path))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    let bytes = response
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(bytes.as_ref(), b"first contents");

    // The versions listing names both.
    let response = client
        .get(url(&format!("{obj};versions")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    let listing: Vec<String> = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad listing: {e}"));
    assert_eq!(listing.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_should_advance_current_pointer_on_version_delete() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-current").await;
    let obj = format!("{ns}/obj");

    put_object(&client, &obj, b"first contents").await;
    let v2_location = put_object(&client, &obj, b"second contents!").await;
    let v2_path = crate::location_path(&v2_location);

    // Delete the current version; the previous one takes over.
    let response = client
        .delete(url(&v2_path))
        .send()
        .await
        .unwrap_or_else(|e| panic!("delete failed: {e}"));
    assert_eq!(response.status(), 204);

    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    let bytes = response
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(bytes.as_ref(), b"first contents");
}

#[tokio::test]
#[ignore]
async fn test_should_conflict_on_object_with_no_content() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-empty").await;
    let obj = format!("{ns}/obj");

    let location = put_object(&client, &obj, b"only version").await;
    let version_path = crate::location_path(&location);

    let response = client
        .delete(url(&version_path))
        .send()
        .await
        .unwrap_or_else(|e| panic!("delete failed: {e}"));
    assert_eq!(response.status(), 204);

    // The object still exists but has no current version.
    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 409);

    // A fresh PUT revives the current pointer.
    put_object(&client, &obj, b"revived").await;
    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_should_inherit_metadata_from_previous_version() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-inherit").await;
    let obj = format!("{ns}/obj");

    // First version declares a content type and disposition.
    let response = client
        .put(url(&obj))
        .header("content-type", "text/csv")
        .header("content-disposition", "filename*=UTF-8''report.csv")
        .header("content-length", "9")
        .body("a,b\n1,2\n\n")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201);

    // The second version omits both; they carry over from the first.
    let response = client
        .put(url(&obj))
        .header("content-length", "9")
        .body("c,d\n3,4\n\n")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 201);

    let response = client
        .get(url(&obj))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/csv")
    );
    assert_eq!(
        response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok()),
        Some("filename*=UTF-8''report.csv")
    );
    // The digests describe the new bytes, not the old ones.
    assert_eq!(
        response
            .headers()
            .get("content-md5")
            .and_then(|v| v.to_str().ok()),
        Some(content_md5(b"c,d\n3,4\n\n").as_str())
    );
}

#[tokio::test]
#[ignore]
async fn test_should_enforce_metadata_immutability_over_rest() {
    let client = client();
    let ns = create_test_namespace(&client, "obj-metadata").await;
    let obj = format!("{ns}/obj");
    put_object(&client, &obj, BODY).await;

    // The collection echoes the stored digests byte-for-byte.
    let response = client
        .get(url(&format!("{obj};metadata")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    assert_eq!(response.status(), 200);
    let collection: serde_json::Value = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad json: {e}"));
    assert_eq!(collection["content-md5"], content_md5(BODY).as_str());

    // A single field reads as text.
    let response = client
        .get(url(&format!("{obj};metadata/content-md5")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("get failed: {e}"));
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(body.trim(), content_md5(BODY));

    // Rewriting a digest with a different value conflicts.
    let response = client
        .put(url(&format!("{obj};metadata/content-md5")))
        .body(content_md5(b"different"))
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 409);

    // Mutable fields rewrite freely.
    let response = client
        .put(url(&format!("{obj};metadata/content-type")))
        .body("text/csv")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 204);

    // Malformed content-disposition is rejected up front.
    let response = client
        .put(url(&format!("{obj};metadata/content-disposition")))
        .body("attachment; filename=x.txt")
        .send()
        .await
        .unwrap_or_else(|e| panic!("put failed: {e}"));
    assert_eq!(response.status(), 400);
}
