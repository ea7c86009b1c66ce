//! Aux-link migration between Hatrac deployments.
//!
//! `link` rewrites local versions into remote references: the remote copy
//! is fetched and verified against the version's declared digests, then
//! `aux.url` is set and the local bytes are released. `transfer` is the
//! inverse: linked content is pulled back into local storage, verified,
//! and the link removed on success.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{StreamExt, TryStreamExt};
use tracing::{info, warn};

use hatrac_core::HatracConfig;
use hatrac_core::digest::ContentHasher;
use hatrac_directory::store::Directory;
use hatrac_model::resource::VersionRecord;
use hatrac_storage::{ByteStream, StorageBackend, backend_from_config};

/// Rewrite every eligible local version into a remote link under
/// `remote_prefix`, releasing local storage.
pub async fn link(config: Arc<HatracConfig>, remote_prefix: &str) -> Result<()> {
    let (directory, storage) = open(&config).await?;
    let client = reqwest::Client::new();
    let remote_prefix = remote_prefix.trim_end_matches('/');

    let mut linked = 0usize;
    for version in directory.list_live_versions().await? {
        if version.aux.url.is_some() || version.aux.rename_to.is_some() {
            continue;
        }
        let Some(key) = version.version_key.clone() else {
            continue;
        };
        let url = format!("{remote_prefix}{}", version.versioned_ref());

        match verify_remote(&client, &url, &version).await {
            Ok(()) => {}
            Err(e) => {
                warn!(version = %version.versioned_ref(), url, error = %e, "remote verification failed; skipping");
                continue;
            }
        }

        let mut aux = version.aux.clone();
        aux.url = Some(url.clone());
        directory.update_version_aux(version.id, &aux).await?;

        // The remote copy is authoritative now; release the local bytes,
        // honoring any addressing overrides they were stored under.
        let backend_name = match version.aux.hname.as_deref() {
            Some(hname) => hatrac_model::name::NamePath::parse(hname)?,
            None => version.path.clone(),
        };
        let backend_version = version.aux.hversion.as_deref().unwrap_or(&key);
        if let Err(e) = storage
            .delete(&backend_name, backend_version, &version.aux)
            .await
        {
            warn!(version = %version.versioned_ref(), error = %e, "local release failed");
        }
        linked += 1;
        info!(version = %version.versioned_ref(), url, "linked to remote");
    }

    info!(linked, "migration link pass complete");
    Ok(())
}

/// Pull every linked version's content back into local storage, removing
/// the link on success.
pub async fn transfer(config: Arc<HatracConfig>) -> Result<()> {
    let (directory, storage) = open(&config).await?;
    let client = reqwest::Client::new();

    let mut transferred = 0usize;
    for version in directory.list_live_versions().await? {
        let Some(url) = version.aux.url.clone() else {
            continue;
        };
        let Some(nbytes) = version.nbytes.and_then(|n| u64::try_from(n).ok()) else {
            warn!(version = %version.versioned_ref(), "linked version has no recorded size; skipping");
            continue;
        };

        let response = client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("fetching {url}"))?;
        let body = response_stream(response);

        let stored = match storage
            .create_from_stream(&version.path, body, nbytes, &version.metadata)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(version = %version.versioned_ref(), url, error = %e, "transfer failed; keeping link");
                continue;
            }
        };

        // Serve the transferred bytes under the existing client-visible
        // version by overriding the backend-level version id.
        let mut aux = stored.aux.clone();
        aux.hversion = Some(stored.version.clone());
        aux.url = None;
        directory.update_version_aux(version.id, &aux).await?;
        transferred += 1;
        info!(version = %version.versioned_ref(), "transferred content back to local storage");
    }

    info!(transferred, "migration transfer pass complete");
    Ok(())
}

async fn open(config: &Arc<HatracConfig>) -> Result<(Directory, Arc<dyn StorageBackend>)> {
    let directory = Directory::connect(&config.database_dsn, config.database_max_retries)
        .await
        .context("opening metadata database")?;
    let storage = backend_from_config(&config.storage)
        .await
        .context("initializing storage backend")?;
    Ok((directory, storage))
}

/// Fetch a remote copy and verify it against the version's declared
/// digests. A version without declared digests cannot be verified and is
/// never rewritten.
async fn verify_remote(
    client: &reqwest::Client,
    url: &str,
    version: &VersionRecord,
) -> Result<()> {
    if version.metadata.content_md5.is_none() && version.metadata.content_sha256.is_none() {
        anyhow::bail!("no declared digests to verify against");
    }

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)?;

    let mut hasher = ContentHasher::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    let digests = hasher.finish();

    if let Some(expected) = version.nbytes.and_then(|n| u64::try_from(n).ok()) {
        if digests.nbytes != expected {
            anyhow::bail!("remote copy is {} bytes, expected {expected}", digests.nbytes);
        }
    }
    digests
        .verify_declared(
            version.metadata.content_md5.as_deref(),
            version.metadata.content_sha256.as_deref(),
            |message| hatrac_core::HatracError::Conflict(message),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

/// Adapt a reqwest body into the storage byte-stream type.
fn response_stream(response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map_err(std::io::Error::other)
        .boxed()
}
