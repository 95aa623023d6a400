//! AuthenticationGateway - user-pool sign-in grants
//!
//! Supports exactly three grants:
//! - Direct username/password (`USER_PASSWORD_AUTH`)
//! - Refresh token (`REFRESH_TOKEN`)
//! - Authorization code from the hosted UI redirect

use std::collections::HashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::Result;
use crate::aws::AwsJsonClient;
use crate::config::Config;
use crate::error::Error;
use super::exchange::IdentityExchange;
use super::token::IdentityToken;

const IDENTITY_PROVIDER_SERVICE: &str = "AWSCognitoIdentityProviderService";

/// Scopes requested from the hosted UI
const SIGNIN_SCOPES: &[&str] = &["openid", "email"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GlobalSignOutRequest<'a> {
    access_token: &'a str,
}

/// Token endpoint request for the authorization-code grant
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// Token endpoint response; all three tokens are required
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Auth(format!("token response is missing {}", field)))
}

/// Performs the sign-in grants against the user pool and its token endpoint.
#[derive(Clone)]
pub struct AuthenticationGateway {
    provider: AwsJsonClient,
    http_client: Client,
    exchange: IdentityExchange,
    app_client_id: String,
    token_url: String,
    redirect_uri: String,
}

impl AuthenticationGateway {
    pub fn new(config: &Config, http_client: Client, exchange: IdentityExchange) -> Self {
        Self {
            provider: AwsJsonClient::new(
                http_client.clone(),
                config.identity_provider_endpoint(),
                IDENTITY_PROVIDER_SERVICE,
            ),
            http_client,
            exchange,
            app_client_id: config.app_client_id.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.signin_redirect_url.clone(),
        }
    }

    async fn initiate_auth(&self, flow: &str, parameters: HashMap<&str, &str>) -> Result<AuthenticationResult> {
        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: &self.app_client_id,
            auth_parameters: parameters,
        };

        let response: InitiateAuthResponse = self.provider
            .call("InitiateAuth", &request)
            .await?
            .map_err(|e| Error::Auth(format!("{} rejected: {}", flow, e)))?;

        match (response.authentication_result, response.challenge_name) {
            (Some(result), _) => Ok(result),
            (None, Some(challenge)) => Err(Error::Auth(format!(
                "sign-in requires the unsupported challenge {}",
                challenge
            ))),
            (None, None) => Err(Error::Auth("provider returned no authentication result".to_string())),
        }
    }

    /// Sign in with username and password.
    ///
    /// Resolves the federated identity id before the token is constructed.
    pub async fn password_sign_in(&self, username: &str, password: &str) -> Result<IdentityToken> {
        let parameters = HashMap::from([("USERNAME", username), ("PASSWORD", password)]);
        let result = self.initiate_auth("USER_PASSWORD_AUTH", parameters).await?;

        let id_token = required(result.id_token, "IdToken")?;
        let access_token = required(result.access_token, "AccessToken")?;
        let refresh_token = required(result.refresh_token, "RefreshToken")?;
        let identity_id = self.exchange.resolve_identity_id(&id_token).await?;

        let token = IdentityToken::new(identity_id, access_token, id_token, refresh_token)?;
        tracing::info!(email = %token.email(), "Signed in with password");
        Ok(token)
    }

    /// Trade the refresh token of `existing` for a new token.
    ///
    /// The identity id carries over unchanged. The provider does not rotate
    /// refresh tokens by default, so the old one is kept when none comes back.
    pub async fn refresh(&self, existing: &IdentityToken) -> Result<IdentityToken> {
        let parameters = HashMap::from([("REFRESH_TOKEN", existing.refresh_token())]);
        let result = self.initiate_auth("REFRESH_TOKEN", parameters).await?;

        let refresh_token = match result.refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                tracing::debug!("Provider kept the refresh token; reusing the current one");
                existing.refresh_token().to_string()
            }
        };

        let token = IdentityToken::new(
            existing.identity_id(),
            required(result.access_token, "AccessToken")?,
            required(result.id_token, "IdToken")?,
            refresh_token,
        )?;
        tracing::info!(email = %token.email(), expires_at = %token.expires_at(), "Refreshed identity token");
        Ok(token)
    }

    /// Exchange a hosted-UI authorization code at the token endpoint.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<IdentityToken> {
        let request = TokenExchangeRequest {
            grant_type: "authorization_code",
            client_id: &self.app_client_id,
            code,
            redirect_uri: &self.redirect_uri,
        };

        let response = self.http_client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            tracing::warn!(status, "Token endpoint rejected the authorization code");
            return Err(Error::TokenEndpoint { status });
        }

        let body = response.bytes().await?;
        let token_response: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Auth(format!("token response is not a JSON object: {}", e)))?;

        let id_token = required(token_response.id_token, "id_token")?;
        let access_token = required(token_response.access_token, "access_token")?;
        let refresh_token = required(token_response.refresh_token, "refresh_token")?;
        let identity_id = self.exchange.resolve_identity_id(&id_token).await?;

        let token = IdentityToken::new(identity_id, access_token, id_token, refresh_token)?;
        tracing::info!(email = %token.email(), "Signed in with authorization code");
        Ok(token)
    }

    /// Invalidate every token issued to the user behind `access_token`.
    pub async fn global_sign_out(&self, access_token: &str) -> Result<()> {
        let request = GlobalSignOutRequest { access_token };
        self.provider
            .call::<_, serde_json::Value>("GlobalSignOut", &request)
            .await?
            .map_err(|e| Error::Auth(format!("GlobalSignOut rejected: {}", e)))?;
        Ok(())
    }

    /// Hosted-UI URL that starts the authorization-code flow in a browser.
    pub fn authorization_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.token_url)
            .map_err(|e| Error::Config(format!("Invalid token URL: {}", e)))?;
        url.set_path("/oauth2/authorize");
        url.set_query(None);

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.app_client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &SIGNIN_SCOPES.join(" "));

        Ok(url.to_string())
    }
}
