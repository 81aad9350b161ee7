//! Object storage for rehosted images.
//!
//! [`R2Store`] writes to an S3-compatible bucket (Cloudflare R2) using
//! path-style URLs, `{endpoint}/{bucket}/{key}`, and AWS Signature V4.
//! Signing uses `hmac` + `sha2` directly; there is no SDK dependency.
//!
//! # Environment Variables
//!
//! - `R2_ACCESS_KEY_ID`: required
//! - `R2_SECRET_ACCESS_KEY`: required

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// Where rehosted assets go.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Access key pair loaded from the environment.
struct R2Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl R2Credentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("R2_ACCESS_KEY_ID")
            .context("R2_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("R2_SECRET_ACCESS_KEY")
            .context("R2_SECRET_ACCESS_KEY environment variable not set")?;
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

pub struct R2Store {
    client: reqwest::Client,
    config: StorageConfig,
    creds: R2Credentials,
}

impl R2Store {
    pub fn from_env(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            config: config.clone(),
            creds: R2Credentials::from_env()?,
        })
    }

    fn host(&self) -> String {
        self.config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.canonical_uri(key)
        )
    }

    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let payload_hash = hex_sha256(payload);
        let signed = sign_request(
            &SigningInput {
                method: method.as_str(),
                host: &self.host(),
                canonical_uri: &self.canonical_uri(key),
                payload_hash: &payload_hash,
                region: &self.config.region,
            },
            &self.creds,
            Utc::now(),
        );

        self.client
            .request(method, self.object_url(key))
            .header("Authorization", signed.authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", signed.amz_date)
    }
}

#[async_trait]
impl ObjectStore for R2Store {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let resp = self
            .signed_request(reqwest::Method::PUT, key, &body)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to put {}/{}", self.config.bucket, key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                text.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self
            .signed_request(reqwest::Method::DELETE, key, b"")
            .send()
            .await
            .with_context(|| format!("Failed to delete {}/{}", self.config.bucket, key))?;

        if !resp.status().is_success() {
            bail!("DeleteObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(())
    }
}

// ============ AWS SigV4 ============

struct SigningInput<'a> {
    method: &'a str,
    host: &'a str,
    canonical_uri: &'a str,
    payload_hash: &'a str,
    region: &'a str,
}

struct SignedHeaders {
    authorization: String,
    amz_date: String,
}

/// Sign a request without a query string.
fn sign_request(input: &SigningInput<'_>, creds: &R2Credentials, now: DateTime<Utc>) -> SignedHeaders {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    // Already sorted by name.
    let headers = [
        ("host", input.host),
        ("x-amz-content-sha256", input.payload_hash),
        ("x-amz-date", amz_date.as_str()),
    ];
    let signed_headers = headers.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        input.method, input.canonical_uri, canonical_headers, signed_headers, input.payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, input.region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // new_from_slice only fails for fixed-size MACs.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
