//! Identity token model
//!
//! Decodes the claims carried in the payload segment of a compact ID token
//! and bundles them with the raw token strings the provider issued.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use crate::Result;
use crate::error::Error;

/// Claims extracted from an ID token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Wire shape of the payload. Every field is required and typed.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    email: String,
    /// NumericDate: seconds since the epoch, possibly fractional
    exp: f64,
}

/// Decode a compact `header.payload.signature` token into its claims.
///
/// The signature is not verified here; the token comes straight from the
/// provider over TLS and is only re-presented to that same provider.
pub fn decode(compact: &str) -> Result<Claims> {
    let segments: Vec<&str> = compact.split('.').collect();
    if segments.len() != 3 {
        return Err(Error::TokenDecode(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = decode_base64url(segments[1])?;
    let json: Value = serde_json::from_slice(&payload)
        .map_err(|e| Error::TokenDecode(format!("payload is not JSON: {}", e)))?;
    if !json.is_object() {
        return Err(Error::TokenDecode("payload is not a JSON object".to_string()));
    }

    let raw: RawClaims = serde_json::from_value(json)
        .map_err(|e| Error::TokenDecode(format!("invalid claims: {}", e)))?;

    let expires_at = Some(raw.exp)
        .filter(|exp| exp.is_finite())
        .and_then(|exp| Utc.timestamp_millis_opt((exp * 1000.0) as i64).single())
        .ok_or_else(|| Error::TokenDecode(format!("exp out of range: {}", raw.exp)))?;

    Ok(Claims {
        subject: raw.sub,
        email: raw.email,
        expires_at,
    })
}

/// Decode one base64url segment, restoring the `=` padding it was stripped of.
pub fn decode_base64url(segment: &str) -> Result<Vec<u8>> {
    let mut base64 = segment.replace('-', "+").replace('_', "/");
    let remainder = base64.len() % 4;
    if remainder != 0 {
        base64.push_str(&"=".repeat(4 - remainder));
    }

    STANDARD
        .decode(base64.as_bytes())
        .map_err(|e| Error::TokenDecode(format!("payload is not base64url: {}", e)))
}

/// Token material for one signed-in user.
///
/// Immutable: a refresh produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken {
    identity_id: String,
    access_token: String,
    id_token: String,
    refresh_token: String,
    claims: Claims,
}

impl IdentityToken {
    /// Build a token, deriving the claims from `id_token`.
    ///
    /// Fails if any string is empty or the ID token does not decode.
    pub fn new(
        identity_id: impl Into<String>,
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        let identity_id = identity_id.into();
        let access_token = access_token.into();
        let id_token = id_token.into();
        let refresh_token = refresh_token.into();

        for (name, value) in [
            ("identity id", &identity_id),
            ("access token", &access_token),
            ("ID token", &id_token),
            ("refresh token", &refresh_token),
        ] {
            if value.is_empty() {
                return Err(Error::Auth(format!("{} is empty", name)));
            }
        }

        let claims = decode(&id_token)?;

        Ok(Self {
            identity_id,
            access_token,
            id_token,
            refresh_token,
            claims,
        })
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    pub fn email(&self) -> &str {
        &self.claims.email
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at
    }

    /// True once the current time has reached the expiry instant.
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Utc::now())
    }

    /// Expiry check against an explicit instant; equality counts as expired.
    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.claims.expires_at
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("identity_id", &self.identity_id)
            .field("subject", &self.claims.subject)
            .field("email", &self.claims.email)
            .field("expires_at", &self.claims.expires_at)
            .finish_non_exhaustive()
    }
}

/// Helpers for building unsigned compact tokens in tests.
#[cfg(test)]
pub(crate) mod testing {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::Value;

    pub fn compact(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    pub fn id_token(email: &str, exp: i64) -> String {
        compact(&serde_json::json!({ "sub": "u1", "email": email, "exp": exp }))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{compact, id_token};
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    #[test]
    fn test_decode_valid_token() {
        let token = compact(&json!({"sub": "u1", "email": "a@b.com", "exp": 1999999999}));
        let claims = decode(&token).unwrap();

        assert_eq!(claims.subject, "u1");
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.expires_at.timestamp(), 1999999999);
    }

    #[test]
    fn test_decode_accepts_non_integer_exp() {
        let whole = compact(&json!({"sub": "u1", "email": "a@b.com", "exp": 1999999999.0}));
        assert_eq!(decode(&whole).unwrap().expires_at.timestamp(), 1999999999);

        let fractional = compact(&json!({"sub": "u1", "email": "a@b.com", "exp": 1999999999.5}));
        assert_eq!(decode(&fractional).unwrap().expires_at.timestamp_millis(), 1999999999500);
    }

    #[test]
    fn test_decode_rejects_out_of_range_exp() {
        let token = compact(&json!({"sub": "u1", "email": "a@b.com", "exp": 1e300}));
        assert!(matches!(decode(&token).unwrap_err(), Error::TokenDecode(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let valid = id_token("a@b.com", 1999999999);
        let parts: Vec<&str> = valid.split('.').collect();

        for token in [
            String::new(),
            parts[1].to_string(),
            format!("{}.{}", parts[0], parts[1]),
            format!("{}.x", valid),
            format!("{}.x.y", valid),
        ] {
            let err = decode(&token).unwrap_err();
            assert!(matches!(err, Error::TokenDecode(_)), "accepted {:?}", token);
        }
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = decode("header.!!not-base64!!.sig").unwrap_err();
        assert!(matches!(err, Error::TokenDecode(_)));
    }

    #[test]
    fn test_decode_rejects_missing_or_mistyped_claims() {
        let payloads = [
            json!({"sub": "u1", "exp": 1999999999}),
            json!({"email": "a@b.com", "exp": 1999999999}),
            json!({"sub": "u1", "email": "a@b.com"}),
            json!({"sub": 1, "email": "a@b.com", "exp": 1999999999}),
            json!({"sub": "u1", "email": "a@b.com", "exp": "1999999999"}),
            json!(["u1", "a@b.com", 1999999999]),
        ];
        for payload in payloads {
            let err = decode(&compact(&payload)).unwrap_err();
            assert!(matches!(err, Error::TokenDecode(_)), "accepted {}", payload);
        }
    }

    #[test]
    fn test_padding_restored_for_each_remainder() {
        let mut remainders = Vec::new();
        for pad in 0..3 {
            let email = format!("{}@b.com", "a".repeat(pad + 1));
            let payload = json!({"sub": "u1", "email": email, "exp": 1999999999});
            let segment = URL_SAFE_NO_PAD.encode(payload.to_string());
            remainders.push(segment.len() % 4);

            let decoded = decode_base64url(&segment).unwrap();
            assert_eq!(decoded, payload.to_string().into_bytes());
            assert_eq!(decode(&compact(&payload)).unwrap().email, email);
        }
        assert!(remainders.contains(&2));
        assert!(remainders.contains(&3));
    }

    #[test]
    fn test_decode_base64url_translates_url_safe_alphabet() {
        // 0xfb 0xff encodes to "-_8" in the URL-safe alphabet
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_identity_token_requires_all_fields() {
        let id = id_token("a@b.com", 1999999999);
        assert!(IdentityToken::new("id", "access", id.clone(), "refresh").is_ok());
        assert!(IdentityToken::new("", "access", id.clone(), "refresh").is_err());
        assert!(IdentityToken::new("id", "", id.clone(), "refresh").is_err());
        assert!(IdentityToken::new("id", "access", id, "").is_err());
        assert!(matches!(
            IdentityToken::new("id", "access", "garbage", "refresh"),
            Err(Error::TokenDecode(_))
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let token = IdentityToken::new("id", "access", id_token("a@b.com", 1999999999), "refresh")
            .unwrap();
        let expiry = token.expires_at();

        assert!(!token.has_expired_at(expiry - chrono::Duration::seconds(1)));
        assert!(token.has_expired_at(expiry));
        assert!(token.has_expired_at(expiry + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_token_material() {
        let token = IdentityToken::new("id", "secret-access", id_token("a@b.com", 1999999999), "secret-refresh")
            .unwrap();
        let rendered = format!("{:?}", token);
        assert!(rendered.contains("a@b.com"));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
