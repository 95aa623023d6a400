//! Sign-in redirect handling
//!
//! The hosted UI finishes by sending the browser to
//! `<custom-scheme>://<host>/callback/signin?code=...`. Any URL handed to the
//! application goes through [`RedirectHandler::handle`]; URLs that are not a
//! sign-in callback are ignored.

use url::Url;
use crate::Result;
use super::service::AuthService;
use super::session::Session;

pub struct RedirectHandler {
    service: AuthService,
    scheme: String,
    callback_path: String,
}

impl RedirectHandler {
    pub fn new(service: AuthService) -> Self {
        let config = service.config();
        let scheme = config.custom_scheme.clone();
        let callback_path = config.callback_path.clone();
        Self {
            service,
            scheme,
            callback_path,
        }
    }

    /// The authorization code carried by a sign-in callback URL.
    ///
    /// `None` when the URL does not parse, the scheme or path (both compared
    /// case-insensitively) do not match, or there is no `code` parameter.
    pub fn authorization_code(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        if !url.scheme().eq_ignore_ascii_case(&self.scheme) {
            return None;
        }
        if !url.path().eq_ignore_ascii_case(&self.callback_path) {
            return None;
        }

        url.query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
    }

    /// Complete a browser sign-in.
    ///
    /// `Ok(None)` for URLs that are not a sign-in callback (no network
    /// traffic). For a callback with a code, exchanges the code, resolves
    /// federated credentials and returns the new session; failures along
    /// that chain are errors.
    pub async fn handle(&self, url: &str) -> Result<Option<Session>> {
        let Some(code) = self.authorization_code(url) else {
            tracing::debug!("Ignoring URL that is not a sign-in callback");
            return Ok(None);
        };

        let token = self.service.gateway().exchange_authorization_code(&code).await?;
        let session = self.service.open_session(token).await?;
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::config::Config;
    use crate::storage::MemoryConnector;

    fn handler() -> RedirectHandler {
        let config = Config {
            region: "ap-northeast-1".into(),
            user_pool_id: "pool".into(),
            identity_pool_id: "identity".into(),
            bucket: "bucket".into(),
            app_client_id: "client".into(),
            token_url: "http://127.0.0.1:9/oauth2/token".into(),
            signin_redirect_url: "amber-app://auth/callback/signin".into(),
            custom_scheme: "amber-app".into(),
            ..Config::default()
        };
        let service = AuthService::with_connector(config, reqwest::Client::new(), Arc::new(MemoryConnector::default()))
            .unwrap();
        RedirectHandler::new(service)
    }

    #[test]
    fn test_extracts_code() {
        let handler = handler();
        assert_eq!(
            handler.authorization_code("amber-app://auth/callback/signin?code=abc123&state=x"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_scheme_and_path_are_case_insensitive() {
        let handler = handler();
        assert_eq!(
            handler.authorization_code("AMBER-APP://auth/Callback/SignIn?code=abc"),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_ignores_unrelated_urls() {
        let handler = handler();
        for url in [
            "https://auth/callback/signin?code=abc",
            "amber-app://auth/callback/signout?code=abc",
            "amber-app://auth/callback/signin",
            "amber-app://auth/callback/signin?state=only",
            "not a url",
        ] {
            assert_eq!(handler.authorization_code(url), None, "matched {}", url);
        }
    }

    #[tokio::test]
    async fn test_handle_returns_none_without_network() {
        // The token endpoint is unreachable, so any exchange attempt would error.
        let handler = handler();
        assert!(handler.handle("other-app://auth/callback/signin?code=abc").await.unwrap().is_none());
        assert!(handler.handle("amber-app://auth/callback/signin").await.unwrap().is_none());
    }
}
