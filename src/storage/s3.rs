//! S3 storage client signed with federated credentials.

use std::collections::BTreeMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use url::Url;
use crate::Result;
use crate::auth::FederatedCredentials;
use crate::config::Config;
use crate::error::Error;
use super::sigv4::{self, SigningCredentials};
use super::{ObjectStore, ObjectSummary, StorageConnector};

const SERVICE: &str = "s3";

/// Root element of a ListObjectsV2 response.
#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "Contents", default)]
    contents: Vec<Contents>,
    #[serde(rename = "NextContinuationToken", default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contents {
    #[serde(rename = "Key", default)]
    key: Option<String>,
    #[serde(rename = "ETag", default)]
    etag: Option<String>,
    #[serde(rename = "LastModified", default)]
    last_modified: Option<String>,
}

impl From<Contents> for ObjectSummary {
    fn from(contents: Contents) -> Self {
        ObjectSummary {
            key: contents.key,
            etag: contents.etag,
            last_modified: contents
                .last_modified
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// `<Error>` body returned by S3 for failed requests.
#[derive(Debug, Deserialize)]
struct S3ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

/// One page of a listing.
struct ListPage {
    objects: Vec<ObjectSummary>,
    next_continuation_token: Option<String>,
}

fn parse_list_response(xml: &str) -> Result<ListPage> {
    if !xml.contains("<ListBucketResult") {
        return Err(Error::storage("unexpected listing: missing ListBucketResult element"));
    }

    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|e| Error::storage(format!("failed to parse listing: {}", e)))?;

    let next_continuation_token = result
        .next_continuation_token
        .filter(|_| result.is_truncated);

    Ok(ListPage {
        objects: result.contents.into_iter().map(ObjectSummary::from).collect(),
        next_continuation_token,
    })
}

/// Build the storage error for a failed response, preferring the S3 code.
fn parse_error_response(status: u16, body: &str) -> Error {
    match quick_xml::de::from_str::<S3ErrorBody>(body) {
        Ok(error) => Error::Storage {
            message: error.message.unwrap_or_else(|| error.code.clone()),
            code: Some(error.code),
        },
        Err(_) => Error::storage(format!("request failed with status {}", status)),
    }
}

/// An S3 client bound to one bucket and one set of credentials.
pub struct S3Store {
    http: Client,
    region: String,
    bucket: String,
    /// Path-style base URL; `None` means virtual-hosted AWS addressing
    endpoint: Option<Url>,
    credentials: SigningCredentials,
}

impl S3Store {
    pub fn new(
        http: Client,
        region: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: Option<Url>,
        credentials: SigningCredentials,
    ) -> Self {
        Self {
            http,
            region: region.into(),
            bucket: bucket.into(),
            endpoint,
            credentials,
        }
    }

    /// URL of `key`, or of the bucket itself when `key` is empty.
    fn object_url(&self, key: &str) -> Result<Url> {
        let encoded = sigv4::uri_encode(key, false);
        let raw = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.as_str().trim_end_matches('/'),
                self.bucket,
                encoded
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        };
        Url::parse(&raw).map_err(|e| Error::storage(format!("invalid object URL {}: {}", raw, e)))
    }

    async fn send(&self, method: Method, url: Url, body: Vec<u8>) -> Result<Response> {
        let mut headers = BTreeMap::new();
        sigv4::sign(
            &self.credentials,
            &self.region,
            SERVICE,
            method.as_str(),
            &url,
            &mut headers,
            &body,
            Utc::now(),
        );

        tracing::debug!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        for (name, value) in &headers {
            // reqwest derives the host header from the URL
            if name != sigv4::HOST_HEADER {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(parse_error_response(status.as_u16(), &text))
    }

    async fn list_page(&self, prefix: &str, continuation_token: Option<&str>) -> Result<ListPage> {
        let mut url = self.object_url("")?;
        url.query_pairs_mut()
            .append_pair("list-type", "2")
            .append_pair("delimiter", "/")
            .append_pair("prefix", prefix);
        if let Some(token) = continuation_token {
            url.query_pairs_mut().append_pair("continuation-token", token);
        }

        let response = self.send(Method::GET, url, Vec::new()).await?;
        let body = response.text().await?;
        parse_list_response(&body)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, continuation_token.as_deref()).await?;
            objects.extend(page.objects);
            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(key)?;
        let response = self.send(Method::GET, url, Vec::new()).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let url = self.object_url(key)?;
        self.send(Method::PUT, url, body).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.object_url(key)?;
        self.send(Method::DELETE, url, Vec::new()).await?;
        Ok(())
    }
}

/// Builds [`S3Store`]s for the configured bucket.
#[derive(Clone)]
pub struct S3Connector {
    http: Client,
    region: String,
    bucket: String,
    endpoint: Option<Url>,
}

impl S3Connector {
    pub fn from_config(config: &Config, http: Client) -> Result<Self> {
        let endpoint = config
            .endpoints
            .storage
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid storage endpoint: {}", e)))?;

        Ok(Self {
            http,
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            endpoint,
        })
    }
}

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(&self, credentials: &FederatedCredentials) -> Result<Arc<dyn ObjectStore>> {
        if credentials.has_expired() {
            return Err(Error::IdentityExchange(format!(
                "credentials for {} expired at {}",
                credentials.identity_id, credentials.expiration
            )));
        }

        let signing = SigningCredentials {
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_key.clone(),
            session_token: Some(credentials.session_token.clone()),
        };
        tracing::debug!(identity_id = %credentials.identity_id, bucket = %self.bucket, "Built storage client");
        Ok(Arc::new(S3Store::new(
            self.http.clone(),
            self.region.clone(),
            self.bucket.clone(),
            self.endpoint.clone(),
            signing,
        )))
    }
}
