//! AWS Signature Version 4 request signing (header form)

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

pub const ALGORITHM_IDENTIFIER: &str = "AWS4-HMAC-SHA256";
pub const KEY_TYPE_IDENTIFIER: &str = "aws4_request";
pub const AMZ_DATE_HEADER: &str = "x-amz-date";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub const HOST_HEADER: &str = "host";
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Key material used to sign requests.
#[derive(Clone)]
pub struct SigningCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Sign a request in place.
///
/// Adds `host`, `x-amz-date`, `x-amz-content-sha256`, the session token when
/// present, and finally `authorization` to `headers`. Header names must be
/// lowercase; every header in the map is signed.
#[allow(clippy::too_many_arguments)]
pub fn sign(
    credentials: &SigningCredentials,
    region: &str,
    service: &str,
    method: &str,
    url: &Url,
    headers: &mut BTreeMap<String, String>,
    payload: &[u8],
    time: DateTime<Utc>,
) {
    let date_time = time.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex::encode(Sha256::digest(payload));

    headers.insert(HOST_HEADER.to_string(), host_header(url));
    headers.insert(AMZ_DATE_HEADER.to_string(), date_time.clone());
    headers.insert(CONTENT_SHA256_HEADER.to_string(), payload_hash.clone());
    if let Some(token) = &credentials.session_token {
        headers.insert(SECURITY_TOKEN_HEADER.to_string(), token.clone());
    }

    let scope = derive_scope(&date_time, region, service);
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_request = derive_canonical_request(method, url, headers, &signed_headers, &payload_hash);
    let string_to_sign = derive_string_to_sign(&canonical_request, &date_time, &scope);

    let signing_key = derive_signing_key(&credentials.secret_access_key, &date_time[0..8], region, service);
    let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

    headers.insert(
        AUTHORIZATION_HEADER.to_string(),
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM_IDENTIFIER, credentials.access_key_id, scope, signed_headers, signature
        ),
    );
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn derive_scope(date_time: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/{}", &date_time[0..8], region, service, KEY_TYPE_IDENTIFIER)
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let key = format!("AWS4{}", secret);
    let k_date = hmac_sign(key.as_bytes(), date.as_bytes());
    let k_region = hmac_sign(&k_date, region.as_bytes());
    let k_service = hmac_sign(&k_region, service.as_bytes());
    hmac_sign(&k_service, KEY_TYPE_IDENTIFIER.as_bytes())
}

fn derive_canonical_request(
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        url.path(),
        derive_canonical_query_string(url),
        canonical_headers,
        signed_headers,
        payload_hash
    )
}

fn derive_canonical_query_string(url: &Url) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    params.sort();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn derive_string_to_sign(canonical_request: &str, date_time: &str, scope: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM_IDENTIFIER,
        date_time,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

fn hmac_sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match Hmac::<Sha256>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode per the SigV4 rules: unreserved characters pass through,
/// `/` passes through only when `encode_slash` is false.
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
