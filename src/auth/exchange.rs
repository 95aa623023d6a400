//! Identity-pool federation
//!
//! Trades a validated ID token for a federated identity id (`GetId`) and then
//! for temporary storage credentials (`GetCredentialsForIdentity`).

use std::collections::HashMap;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::aws::AwsJsonClient;
use crate::config::Config;
use crate::error::Error;

const IDENTITY_SERVICE: &str = "AWSCognitoIdentityService";

/// Temporary credentials scoped to one federated identity.
#[derive(Clone, PartialEq)]
pub struct FederatedCredentials {
    pub identity_id: String,
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl FederatedCredentials {
    pub fn has_expired(&self) -> bool {
        Utc::now() >= self.expiration
    }
}

impl std::fmt::Debug for FederatedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCredentials")
            .field("identity_id", &self.identity_id)
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetIdInput<'a> {
    identity_pool_id: &'a str,
    logins: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetIdOutput {
    #[serde(default)]
    identity_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetCredentialsInput<'a> {
    identity_id: &'a str,
    logins: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCredentialsOutput {
    #[serde(default)]
    credentials: Option<RawCredentials>,
}

/// Every field optional on the wire; completeness is checked afterwards.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCredentials {
    #[serde(default)]
    access_key_id: Option<String>,
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
    /// Epoch seconds, fractional
    #[serde(default)]
    expiration: Option<f64>,
}

impl RawCredentials {
    fn complete(self, identity_id: String) -> Result<FederatedCredentials> {
        let missing = |field: &str| Error::IdentityExchange(format!("credentials missing {}", field));

        let access_key_id = self.access_key_id.filter(|s| !s.is_empty()).ok_or_else(|| missing("AccessKeyId"))?;
        let secret_key = self.secret_key.filter(|s| !s.is_empty()).ok_or_else(|| missing("SecretKey"))?;
        let session_token = self.session_token.filter(|s| !s.is_empty()).ok_or_else(|| missing("SessionToken"))?;
        let expiration = self.expiration.ok_or_else(|| missing("Expiration"))?;
        let expiration = Utc
            .timestamp_millis_opt((expiration * 1000.0) as i64)
            .single()
            .ok_or_else(|| Error::IdentityExchange(format!("Expiration out of range: {}", expiration)))?;

        Ok(FederatedCredentials {
            identity_id,
            access_key_id,
            secret_key,
            session_token,
            expiration,
        })
    }
}

/// Identity-pool client bound to one user pool / identity pool pair.
#[derive(Clone)]
pub struct IdentityExchange {
    client: AwsJsonClient,
    identity_pool_id: String,
    logins_key: String,
}

impl IdentityExchange {
    pub fn new(config: &Config, http: Client) -> Self {
        Self {
            client: AwsJsonClient::new(http, config.identity_endpoint(), IDENTITY_SERVICE),
            identity_pool_id: config.identity_pool_id.clone(),
            logins_key: config.logins_key(),
        }
    }

    fn logins(&self, id_token: &str) -> HashMap<String, String> {
        HashMap::from([(self.logins_key.clone(), id_token.to_string())])
    }

    /// First hop: the federated identity id for this ID token.
    pub async fn resolve_identity_id(&self, id_token: &str) -> Result<String> {
        let logins = self.logins(id_token);
        self.get_id(&logins).await
    }

    async fn get_id(&self, logins: &HashMap<String, String>) -> Result<String> {
        let input = GetIdInput {
            identity_pool_id: &self.identity_pool_id,
            logins,
        };
        let output: GetIdOutput = self.client
            .call("GetId", &input)
            .await?
            .map_err(|e| Error::IdentityExchange(format!("GetId failed: {}", e)))?;

        output
            .identity_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::IdentityExchange("provider returned no identity id".to_string()))
    }

    /// Both hops: resolve the identity id, then fetch its temporary credentials.
    ///
    /// The identity id is never cached between calls so a role change in the
    /// identity pool is picked up by the next exchange.
    pub async fn resolve_credentials(&self, id_token: &str) -> Result<FederatedCredentials> {
        let logins = self.logins(id_token);
        let identity_id = self.get_id(&logins).await?;

        let input = GetCredentialsInput {
            identity_id: &identity_id,
            logins: &logins,
        };
        let output: GetCredentialsOutput = self.client
            .call("GetCredentialsForIdentity", &input)
            .await?
            .map_err(|e| Error::IdentityExchange(format!("GetCredentialsForIdentity failed: {}", e)))?;

        let credentials = output
            .credentials
            .unwrap_or_default()
            .complete(identity_id)?;

        tracing::debug!(
            identity_id = %credentials.identity_id,
            expiration = %credentials.expiration,
            "Resolved federated credentials"
        );
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawCredentials {
        RawCredentials {
            access_key_id: Some("AKIA".into()),
            secret_key: Some("secret".into()),
            session_token: Some("session".into()),
            expiration: Some(1_720_000_000.5),
        }
    }

    #[test]
    fn test_complete_credentials() {
        let creds = raw().complete("ap-northeast-1:abc".into()).unwrap();
        assert_eq!(creds.access_key_id, "AKIA");
        assert_eq!(creds.expiration.timestamp_millis(), 1_720_000_000_500);
        assert!(creds.has_expired());
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let cases = [
            RawCredentials { access_key_id: None, ..raw() },
            RawCredentials { secret_key: None, ..raw() },
            RawCredentials { session_token: Some(String::new()), ..raw() },
            RawCredentials { expiration: None, ..raw() },
            RawCredentials::default(),
        ];
        for case in cases {
            let err = case.complete("id".into()).unwrap_err();
            assert!(matches!(err, Error::IdentityExchange(_)));
        }
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"IdentityId":"id","Credentials":{"AccessKeyId":"A","SecretKey":"S","SessionToken":"T","Expiration":1.72E9}}"#;
        let output: GetCredentialsOutput = serde_json::from_str(json).unwrap();
        let creds = output.credentials.unwrap().complete("id".into()).unwrap();
        assert_eq!(creds.expiration.timestamp(), 1_720_000_000);

        let logins = HashMap::from([("k".to_string(), "v".to_string())]);
        let input = serde_json::to_value(GetIdInput { identity_pool_id: "pool", logins: &logins }).unwrap();
        assert_eq!(input["IdentityPoolId"], "pool");
        assert_eq!(input["Logins"]["k"], "v");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = raw().complete("id".into()).unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("session"));
    }
}
