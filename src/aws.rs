//! AWS JSON 1.1 RPC transport
//!
//! The user-pool and identity-pool operations used here are unauthenticated
//! JSON calls: a POST to the regional endpoint with the operation named in
//! the `X-Amz-Target` header.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Service error reported in the body of a non-2xx answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: u16,
    /// Exception name, e.g. "NotAuthorizedException"
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} (status {})", self.code, self.status)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Outcome of one call: transport failures are the outer `Err`, service
/// answers are split into the decoded body or the service error.
pub type CallResult<T> = crate::Result<std::result::Result<T, ServiceError>>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Client for one AWS JSON service.
#[derive(Clone)]
pub struct AwsJsonClient {
    http: Client,
    endpoint: String,
    service: &'static str,
}

impl AwsJsonClient {
    /// `service` is the target prefix, e.g. "AWSCognitoIdentityService".
    pub fn new(http: Client, endpoint: impl Into<String>, service: &'static str) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            service,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `operation` with `input` as the JSON body.
    pub async fn call<I, O>(&self, operation: &str, input: &I) -> CallResult<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let target = format!("{}.{}", self.service, operation);
        tracing::debug!("POST {} ({})", self.endpoint, target);

        let body = serde_json::to_vec(input)?;
        let response = self.http
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", &target)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Ok(Err(parse_service_error(status.as_u16(), &bytes)));
        }

        match serde_json::from_slice::<O>(&bytes) {
            Ok(output) => Ok(Ok(output)),
            Err(e) => Ok(Err(ServiceError {
                status: status.as_u16(),
                code: "InvalidResponse".to_string(),
                message: format!("{} returned an unreadable body: {}", target, e),
            })),
        }
    }
}

/// Turn an error body into a [`ServiceError`].
///
/// `__type` may carry a namespace prefix ("com.amazon...#NotAuthorizedException").
fn parse_service_error(status: u16, body: &[u8]) -> ServiceError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let (kind, message) = match parsed {
        Some(ErrorBody { kind, message }) => (kind, message),
        None => (None, None),
    };

    let code = kind
        .map(|k| k.rsplit('#').next().unwrap_or_default().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| "UnknownError".to_string());

    ServiceError {
        status,
        code,
        message: message.unwrap_or_default(),
    }
}
