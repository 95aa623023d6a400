//! AuthService - the explicitly constructed service every session shares
//!
//! Owns the gateway, the identity exchange and the storage connector, and
//! turns successful sign-ins into [`Session`]s.

use std::sync::Arc;
use reqwest::Client;
use crate::Result;
use crate::config::Config;
use crate::storage::{ObjectStore, S3Connector, StorageConnector};
use super::exchange::IdentityExchange;
use super::gateway::AuthenticationGateway;
use super::redirect::RedirectHandler;
use super::session::Session;
use super::token::IdentityToken;

/// Shared sign-in service. Cheap to clone.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    gateway: AuthenticationGateway,
    exchange: IdentityExchange,
    connector: Arc<dyn StorageConnector>,
}

impl AuthService {
    /// Wire the service against S3 (or the configured S3-compatible endpoint).
    pub fn from_config(config: Config) -> Result<Self> {
        let http = Client::new();
        let connector = S3Connector::from_config(&config, http.clone())?;
        Self::with_connector(config, http, Arc::new(connector))
    }

    /// Wire the service with an explicit storage connector.
    pub fn with_connector(config: Config, http: Client, connector: Arc<dyn StorageConnector>) -> Result<Self> {
        config.validate()?;
        let exchange = IdentityExchange::new(&config, http.clone());
        let gateway = AuthenticationGateway::new(&config, http, exchange.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                exchange,
                connector,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn gateway(&self) -> &AuthenticationGateway {
        &self.inner.gateway
    }

    pub fn exchange(&self) -> &IdentityExchange {
        &self.inner.exchange
    }

    pub fn redirect_handler(&self) -> RedirectHandler {
        RedirectHandler::new(self.clone())
    }

    /// Resolve fresh federated credentials for `token` and build a storage client.
    pub async fn connect(&self, token: &IdentityToken) -> Result<Arc<dyn ObjectStore>> {
        let credentials = self.inner.exchange.resolve_credentials(token.id_token()).await?;
        self.inner.connector.connect(&credentials).await
    }

    /// Open a session for a freshly issued token, seeding its storage client.
    pub async fn open_session(&self, token: IdentityToken) -> Result<Session> {
        let client = self.connect(&token).await?;
        Ok(Session::with_client(token, self.clone(), client))
    }

    /// Username/password sign-in.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let token = self.inner.gateway.password_sign_in(username, password).await?;
        self.open_session(token).await
    }

    /// Sign the user out everywhere and drop the session's storage client.
    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let access_token = session.token().await.access_token().to_string();
        self.inner.gateway.global_sign_out(&access_token).await?;
        session.disconnect().await;
        tracing::info!(email = %session.email(), "Signed out");
        Ok(())
    }
}
