//! Chunked upload scenarios: job lifecycle, chunk bounds, finalize, and
//! cancellation.

use crate::{client, content_md5, create_test_namespace, url};

/// Declared chunk size for the small test jobs.
const CHUNK: usize = 8;

/// Create an upload job and return its path.
async fn create_job(
    client: &reqwest::Client,
    obj: &str,
    chunk_length: usize,
    content_length: usize,
    md5: Option<String>,
) -> String {
    let mut request = serde_json::json!({
        "chunk-length": chunk_length,
        "content-length": content_length,
        "content-type": "application/octet-stream",
    });
    if let Some(md5) = md5 {
        request["content-md5"] = serde_json::json!(md5);
    }
    let response = client
        .post(url(&format!("{obj};upload")))
        .json(&request)
        .send()
        .await
        .unwrap_or_else(|e| panic!("job create failed: {e}"));
    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("no Location header"))
        .to_owned();
    crate::location_path(&location)
}

async fn put_chunk(client: &reqwest::Client, job: &str, position: usize, data: &[u8]) -> u16 {
    client
        .put(url(&format!("{job}/{position}")))
        .header("content-length", data.len())
        .body(data.to_vec())
        .send()
        .await
        .unwrap_or_else(|e| panic!("chunk put failed: {e}"))
        .status()
        .as_u16()
}

#[tokio::test]
#[ignore]
async fn test_should_assemble_chunked_upload_end_to_end() {
    let client = client();
    let ns = create_test_namespace(&client, "upload-roundtrip").await;
    let obj = format!("{ns}/big");

    let payload: Vec<u8> = (0..19u8).map(|i| i.wrapping_mul(7)).collect();
    let job = create_job(&client, &obj, CHUNK, payload.len(), Some(content_md5(&payload))).await;

    assert_eq!(put_chunk(&client, &job, 0, &payload[..CHUNK]).await, 204);
    assert_eq!(
        put_chunk(&client, &job, 1, &payload[CHUNK..2 * CHUNK]).await,
        204
    );
    assert_eq!(put_chunk(&client, &job, 2, &payload[2 * CHUNK..]).await, 204);

    // Finalize yields the new versioned reference.
    let response = client
        .post(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("finalize failed: {e}"));
    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| panic!("no Location header"))
        .to_owned();
    assert!(location.contains(&format!("{obj}:")));

    // Content matches the assembled payload.
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
        Some(content_md5(&payload).as_str())
    );
    let bytes = response
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("bad body: {e}"));
    assert_eq!(bytes.as_ref(), payload.as_slice());

    // The job is gone: a second finalize is a 404.
    let response = client
        .post(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("finalize failed: {e}"));
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_should_enforce_chunk_bounds_and_sizes() {
    let client = client();
    let ns = create_test_namespace(&client, "upload-bounds").await;
    let obj = format!("{ns}/obj");

    // 2 chunks: 8 + 4 bytes.
    let job = create_job(&client, &obj, CHUNK, 12, None).await;

    // Chunk number past the total is a conflict.
    assert_eq!(put_chunk(&client, &job, 2, &[0u8; 4]).await, 409);

    // Negative chunk number is malformed.
    assert_eq!(put_chunk(&client, &job, usize::MAX, &[0u8; 4]).await, 400);
    let response = client
        .put(url(&format!("{job}/-1")))
        .header("content-length", "4")
        .body(vec![0u8; 4])
        .send()
        .await
        .unwrap_or_else(|e| panic!("chunk put failed: {e}"));
    assert_eq!(response.status(), 400);

    // A non-final chunk must be exactly chunk-length bytes.
    assert_eq!(put_chunk(&client, &job, 0, &[0u8; 3]).await, 400);

    // Finalizing before all chunks arrive conflicts.
    assert_eq!(put_chunk(&client, &job, 0, &[1u8; CHUNK]).await, 204);
    let response = client
        .post(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("finalize failed: {e}"));
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_should_conflict_on_declared_digest_mismatch() {
    let client = client();
    let ns = create_test_namespace(&client, "upload-digest").await;
    let obj = format!("{ns}/obj");

    let job = create_job(&client, &obj, CHUNK, 4, Some(content_md5(b"not this"))).await;
    assert_eq!(put_chunk(&client, &job, 0, b"data").await, 204);

    let response = client
        .post(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("finalize failed: {e}"));
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_should_cancel_job_and_list_open_jobs() {
    let client = client();
    let ns = create_test_namespace(&client, "upload-cancel").await;
    let obj = format!("{ns}/obj");

    let job = create_job(&client, &obj, CHUNK, 16, None).await;

    // The job shows up in the listing.
    let response = client
        .get(url(&format!("{obj};upload")))
        .send()
        .await
        .unwrap_or_else(|e| panic!("list failed: {e}"));
    assert_eq!(response.status(), 200);
    let listing: Vec<String> = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad listing: {e}"));
    assert_eq!(listing.len(), 1);

    // Status reports the declared geometry.
    let response = client
        .get(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("status failed: {e}"));
    assert_eq!(response.status(), 200);
    let status: serde_json::Value = response
        .json()
        .await
        .unwrap_or_else(|e| panic!("bad status: {e}"));
    assert_eq!(status["chunk-length"], 8);
    assert_eq!(status["content-length"], 16);

    // Cancel, then the job is gone.
    let response = client
        .delete(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("cancel failed: {e}"));
    assert_eq!(response.status(), 204);

    let response = client
        .get(url(&job))
        .send()
        .await
        .unwrap_or_else(|e| panic!("status failed: {e}"));
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_should_accept_legacy_job_field_aliases() {
    let client = client();
    let ns = create_test_namespace(&client, "upload-legacy").await;
    let obj = format!("{ns}/obj");

    let response = client
        .post(url(&format!("{obj};upload")))
        .json(&serde_json::json!({
            "chunk_bytes": 8,
            "total_bytes": 4,
            "content_md5": content_md5(b"data"),
        }))
        .send()
        .await
        .unwrap_or_else(|e| panic!("job create failed: {e}"));
    assert_eq!(response.status(), 201);
}
