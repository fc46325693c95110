//! Object store construction for local and S3 array stores.

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// Parse an S3 URI into bucket and key components.
///
/// Accepts `s3://bucket/key/path`; the key may be empty (`s3://bucket/`).
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let without_scheme = uri
        .strip_prefix("s3://")
        .with_context(|| format!("Invalid S3 URI: expected 's3://' prefix in '{}'", uri))?;

    without_scheme
        .split_once('/')
        .with_context(|| format!("Invalid S3 URI: expected 's3://bucket/key' format in '{}'", uri))
}

fn create_client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_pool_idle_timeout(Duration::from_secs(90))
        .with_pool_max_idle_per_host(64)
}

/// Reads fail fast; callers decide whether to re-issue a query.
fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..RetryConfig::default()
    }
}

/// Create an S3 client for reading a tile store.
///
/// Credentials come from the environment when present; without them requests
/// go out unsigned, which is what public buckets expect.
fn create_s3_store(bucket: &str, region: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!("Creating S3 client for bucket: {}", bucket);

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(create_client_options())
        .with_retry(create_retry_config());

    if let Some(region) = region {
        builder = builder.with_region(region);
    }
    if std::env::var_os("AWS_ACCESS_KEY_ID").is_none() {
        builder = builder.with_skip_signature(true);
    }

    Ok(Arc::new(builder.build()?))
}

/// Create a store rooted at a local directory.
fn create_local_store(path: &str) -> Result<Arc<dyn ObjectStore>> {
    let path = std::path::Path::new(path);
    tracing::info!("Creating LocalFileSystem store at: {}", path.display());
    let store = LocalFileSystem::new_with_prefix(path)
        .with_context(|| format!("Failed to open tile store directory {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Open the store holding `location` and return it with the prefix of the
/// tile group inside it.
///
/// Local paths become the store root, so their prefix is empty; S3 URIs keep
/// their key as the prefix.
pub fn create_store(location: &str, region: Option<&str>) -> Result<(Arc<dyn ObjectStore>, String)> {
    if location.starts_with("s3://") {
        let (bucket, key) = parse_s3_uri(location)?;
        Ok((create_s3_store(bucket, region)?, key.trim_matches('/').to_string()))
    } else {
        Ok((create_local_store(location)?, String::new()))
    }
}
