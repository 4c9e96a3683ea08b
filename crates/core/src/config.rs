use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Immutable process configuration. Resolved once at startup from defaults,
/// an optional `basket.toml` patch, and `BASKET_*` environment overrides,
/// in that order. Never re-read mid-session.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub vendor: VendorKind,
    pub rami_levy: RamiLevyConfig,
    pub keshet: KeshetConfig,
    pub shufersal: ShufersalConfig,
    pub browser: BrowserConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RamiLevyConfig {
    pub api_base: String,
    pub cart_query_base: String,
    pub store_id: String,
    pub account_id: String,
    pub api_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct KeshetConfig {
    pub api_base: String,
    pub retailer_id: String,
    pub branch_id: String,
    pub cart_id: String,
    pub api_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct ShufersalConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct BrowserConfig {
    /// CDP websocket endpoint of an already-running browser. When unset a
    /// local headless Chromium is launched instead.
    pub cdp_endpoint: Option<String>,
    /// Persistent profile directory for the launched browser.
    pub profile_dir: Option<PathBuf>,
    /// Where debug screenshots land.
    pub debug_dir: Option<PathBuf>,
    pub headless: bool,
    /// Bounded wait for the login form to appear.
    pub login_form_timeout_secs: u64,
    /// Bounded wait for the post-login redirect race.
    pub login_redirect_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorKind {
    RamiLevy,
    Keshet,
    Shufersal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vendor: VendorKind::RamiLevy,
            rami_levy: RamiLevyConfig {
                api_base: "https://www.rami-levy.co.il/api".to_string(),
                cart_query_base: "https://www-api.rami-levy.co.il/api/v2/site/clubs/customer"
                    .to_string(),
                store_id: "331".to_string(),
                account_id: String::new(),
                api_token: String::new().into(),
            },
            keshet: KeshetConfig {
                api_base: "https://www.keshet-teamim.co.il/v2".to_string(),
                retailer_id: "1219".to_string(),
                branch_id: "2725".to_string(),
                cart_id: String::new(),
                api_token: String::new().into(),
            },
            shufersal: ShufersalConfig {
                base_url: "https://www.shufersal.co.il/online/he".to_string(),
                username: None,
                password: None,
            },
            browser: BrowserConfig {
                cdp_endpoint: None,
                profile_dir: None,
                debug_dir: None,
                headless: true,
                login_form_timeout_secs: 10,
                login_redirect_timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for VendorKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rami_levy" | "rami-levy" => Ok(Self::RamiLevy),
            "keshet" => Ok(Self::Keshet),
            "shufersal" => Ok(Self::Shufersal),
            other => Err(ConfigError::Validation(format!(
                "unsupported vendor `{other}` (expected rami_levy|keshet|shufersal)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("basket.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(vendor) = patch.vendor {
            self.vendor = vendor;
        }

        if let Some(rami_levy) = patch.rami_levy {
            if let Some(api_base) = rami_levy.api_base {
                self.rami_levy.api_base = api_base;
            }
            if let Some(cart_query_base) = rami_levy.cart_query_base {
                self.rami_levy.cart_query_base = cart_query_base;
            }
            if let Some(store_id) = rami_levy.store_id {
                self.rami_levy.store_id = store_id;
            }
            if let Some(account_id) = rami_levy.account_id {
                self.rami_levy.account_id = account_id;
            }
            if let Some(api_token_value) = rami_levy.api_token {
                self.rami_levy.api_token = secret_value(api_token_value);
            }
        }

        if let Some(keshet) = patch.keshet {
            if let Some(api_base) = keshet.api_base {
                self.keshet.api_base = api_base;
            }
            if let Some(retailer_id) = keshet.retailer_id {
                self.keshet.retailer_id = retailer_id;
            }
            if let Some(branch_id) = keshet.branch_id {
                self.keshet.branch_id = branch_id;
            }
            if let Some(cart_id) = keshet.cart_id {
                self.keshet.cart_id = cart_id;
            }
            if let Some(api_token_value) = keshet.api_token {
                self.keshet.api_token = secret_value(api_token_value);
            }
        }

        if let Some(shufersal) = patch.shufersal {
            if let Some(base_url) = shufersal.base_url {
                self.shufersal.base_url = base_url;
            }
            if let Some(username) = shufersal.username {
                self.shufersal.username = Some(username);
            }
            if let Some(password_value) = shufersal.password {
                self.shufersal.password = Some(secret_value(password_value));
            }
        }

        if let Some(browser) = patch.browser {
            if let Some(cdp_endpoint) = browser.cdp_endpoint {
                self.browser.cdp_endpoint = Some(cdp_endpoint);
            }
            if let Some(profile_dir) = browser.profile_dir {
                self.browser.profile_dir = Some(PathBuf::from(profile_dir));
            }
            if let Some(debug_dir) = browser.debug_dir {
                self.browser.debug_dir = Some(PathBuf::from(debug_dir));
            }
            if let Some(headless) = browser.headless {
                self.browser.headless = headless;
            }
            if let Some(secs) = browser.login_form_timeout_secs {
                self.browser.login_form_timeout_secs = secs;
            }
            if let Some(secs) = browser.login_redirect_timeout_secs {
                self.browser.login_redirect_timeout_secs = secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BASKET_VENDOR") {
            self.vendor = value.parse()?;
        }

        if let Some(value) = read_env("BASKET_RAMI_LEVY_ACCOUNT_ID") {
            self.rami_levy.account_id = value;
        }
        if let Some(value) = read_env("BASKET_RAMI_LEVY_API_TOKEN") {
            self.rami_levy.api_token = secret_value(value);
        }
        if let Some(value) = read_env("BASKET_RAMI_LEVY_STORE_ID") {
            self.rami_levy.store_id = value;
        }

        if let Some(value) = read_env("BASKET_KESHET_CART_ID") {
            self.keshet.cart_id = value;
        }
        if let Some(value) = read_env("BASKET_KESHET_API_TOKEN") {
            self.keshet.api_token = secret_value(value);
        }

        if let Some(value) = read_env("BASKET_SHUFERSAL_USERNAME") {
            self.shufersal.username = Some(value);
        }
        if let Some(value) = read_env("BASKET_SHUFERSAL_PASSWORD") {
            self.shufersal.password = Some(secret_value(value));
        }

        if let Some(value) = read_env("BASKET_BROWSER_CDP_ENDPOINT") {
            self.browser.cdp_endpoint = Some(value);
        }
        if let Some(value) = read_env("BASKET_BROWSER_PROFILE_DIR") {
            self.browser.profile_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BASKET_BROWSER_HEADLESS") {
            self.browser.headless = parse_bool("BASKET_BROWSER_HEADLESS", &value)?;
        }

        if let Some(value) = read_env("BASKET_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("BASKET_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        match self.vendor {
            VendorKind::RamiLevy => {
                if self.rami_levy.api_token.expose_secret().is_empty() {
                    return Err(ConfigError::Validation(
                        "rami_levy.api_token is required when vendor = rami_levy".to_string(),
                    ));
                }
                if self.rami_levy.account_id.is_empty() {
                    return Err(ConfigError::Validation(
                        "rami_levy.account_id is required when vendor = rami_levy".to_string(),
                    ));
                }
            }
            VendorKind::Keshet => {
                if self.keshet.api_token.expose_secret().is_empty() {
                    return Err(ConfigError::Validation(
                        "keshet.api_token is required when vendor = keshet".to_string(),
                    ));
                }
                if self.keshet.cart_id.is_empty() {
                    return Err(ConfigError::Validation(
                        "keshet.cart_id is required when vendor = keshet".to_string(),
                    ));
                }
            }
            // Shufersal works unauthenticated; credentials only gate authorize().
            VendorKind::Shufersal => {}
        }

        if self.browser.login_form_timeout_secs == 0
            || self.browser.login_redirect_timeout_secs == 0
        {
            return Err(ConfigError::Validation(
                "browser login timeouts must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    vendor: Option<VendorKind>,
    rami_levy: Option<RamiLevyPatch>,
    keshet: Option<KeshetPatch>,
    shufersal: Option<ShufersalPatch>,
    browser: Option<BrowserPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RamiLevyPatch {
    api_base: Option<String>,
    cart_query_base: Option<String>,
    store_id: Option<String>,
    account_id: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KeshetPatch {
    api_base: Option<String>,
    retailer_id: Option<String>,
    branch_id: Option<String>,
    cart_id: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ShufersalPatch {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BrowserPatch {
    cdp_endpoint: Option<String>,
    profile_dir: Option<String>,
    debug_dir: Option<String>,
    headless: Option<bool>,
    login_form_timeout_secs: Option<u64>,
    login_redirect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("basket.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }),
    }
}
