//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;
use crate::Result;
use crate::error::Error;

/// Service configuration: where the user pool, identity pool and bucket live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider region, e.g. "ap-northeast-1"
    pub region: String,

    /// User pool id, e.g. "ap-northeast-1_7R43qBEk1"
    pub user_pool_id: String,

    /// Identity pool id
    pub identity_pool_id: String,

    /// Bucket holding the per-user `home/<identityId>/` prefixes
    pub bucket: String,

    /// App client id registered in the user pool
    pub app_client_id: String,

    /// Hosted UI token endpoint, e.g. "https://<domain>.auth.<region>.amazoncognito.com/oauth2/token"
    pub token_url: String,

    /// Redirect URL registered for the authorization-code grant
    pub signin_redirect_url: String,

    /// Custom scheme the redirect URL uses
    pub custom_scheme: String,

    /// Path of the sign-in callback under the custom scheme
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Extension that marks an object as text content
    #[serde(default = "default_content_extension")]
    pub content_extension: String,

    /// Endpoint overrides (S3-compatible stores, local testing)
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub identity_provider: Option<String>,

    #[serde(default)]
    pub identity: Option<String>,

    /// When set, objects are addressed path-style under this endpoint.
    #[serde(default)]
    pub storage: Option<String>,
}

fn default_callback_path() -> String {
    "/callback/signin".to_string()
}

fn default_content_extension() -> String {
    "txt".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            identity_pool_id: String::new(),
            bucket: String::new(),
            app_client_id: String::new(),
            token_url: String::new(),
            signin_redirect_url: String::new(),
            custom_scheme: String::new(),
            callback_path: default_callback_path(),
            content_extension: default_content_extension(),
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl Config {
    /// Check that every required field is present and the URLs parse.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("region", &self.region),
            ("user_pool_id", &self.user_pool_id),
            ("identity_pool_id", &self.identity_pool_id),
            ("bucket", &self.bucket),
            ("app_client_id", &self.app_client_id),
            ("token_url", &self.token_url),
            ("signin_redirect_url", &self.signin_redirect_url),
            ("custom_scheme", &self.custom_scheme),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        Url::parse(&self.token_url)
            .map_err(|e| Error::Config(format!("Invalid token_url: {}", e)))?;
        Url::parse(&self.signin_redirect_url)
            .map_err(|e| Error::Config(format!("Invalid signin_redirect_url: {}", e)))?;
        Ok(())
    }

    /// Key of the `Logins` map presented to the identity pool.
    pub fn logins_key(&self) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.region, self.user_pool_id)
    }

    pub fn identity_provider_endpoint(&self) -> String {
        self.endpoints
            .identity_provider
            .clone()
            .unwrap_or_else(|| format!("https://cognito-idp.{}.amazonaws.com/", self.region))
    }

    pub fn identity_endpoint(&self) -> String {
        self.endpoints
            .identity
            .clone()
            .unwrap_or_else(|| format!("https://cognito-identity.{}.amazonaws.com/", self.region))
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".amber")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load and validate configuration from a file
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'amber onboard' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Interactively collect the service identifiers and write the config file
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::Text;

    ui::print_header("Setup Wizard");
    println!("  I'll need the identifiers of your user pool, identity pool and bucket.\n");

    let prompt = |label: &str, help: &str| -> Result<String> {
        let value = Text::new(label)
            .with_help_message(help)
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        Ok(value.trim().to_string())
    };

    let mut config = Config {
        region: prompt("Region:", "e.g. ap-northeast-1")?,
        user_pool_id: prompt("User pool id:", "e.g. ap-northeast-1_7R43qBEk1")?,
        identity_pool_id: prompt("Identity pool id:", "e.g. ap-northeast-1:41d41301-...")?,
        bucket: prompt("Bucket:", "bucket holding home/<identityId>/ prefixes")?,
        app_client_id: prompt("App client id:", "public client, no secret")?,
        token_url: prompt("Token URL:", "https://<domain>.auth.<region>.amazoncognito.com/oauth2/token")?,
        signin_redirect_url: prompt("Sign-in redirect URL:", "e.g. amber-app://auth/callback/signin")?,
        ..Config::default()
    };

    config.custom_scheme = Url::parse(&config.signin_redirect_url)
        .map(|url| url.scheme().to_string())
        .map_err(|e| Error::Config(format!("Invalid redirect URL: {}", e)))?;

    config.validate()?;

    ui::print_thinking("Saving configuration");
    save_to(&config, &config_path())?;

    println!();
    ui::print_success("Setup complete!");
    ui::print_step("Run 'amber signin --email <you@example.com>' to start.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            region: "ap-northeast-1".into(),
            user_pool_id: "ap-northeast-1_pool".into(),
            identity_pool_id: "ap-northeast-1:identity".into(),
            bucket: "amber-bucket".into(),
            app_client_id: "client".into(),
            token_url: "https://amber.auth.ap-northeast-1.amazoncognito.com/oauth2/token".into(),
            signin_redirect_url: "amber-app://auth/callback/signin".into(),
            custom_scheme: "amber-app".into(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.callback_path, "/callback/signin");
        assert_eq!(config.content_extension, "txt");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logins_key_and_endpoints() {
        let config = sample();
        assert_eq!(
            config.logins_key(),
            "cognito-idp.ap-northeast-1.amazonaws.com/ap-northeast-1_pool"
        );
        assert_eq!(
            config.identity_endpoint(),
            "https://cognito-identity.ap-northeast-1.amazonaws.com/"
        );

        let mut config = config;
        config.endpoints.identity_provider = Some("http://localhost:9000/".into());
        assert_eq!(config.identity_provider_endpoint(), "http://localhost:9000/");
    }

    #[test]
    fn test_validate_rejects_empty_field() {
        let mut config = sample();
        assert!(config.validate().is_ok());

        config.bucket = "  ".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bucket"));
    }

    #[test]
    fn test_load_roundtrip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut json = serde_json::to_value(sample()).unwrap();
        let object = json.as_object_mut().unwrap();
        object.remove("callback_path");
        object.remove("endpoints");
        std::fs::write(&path, json.to_string()).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.callback_path, "/callback/signin");
        assert_eq!(loaded.bucket, "amber-bucket");
        assert!(loaded.endpoints.storage.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
