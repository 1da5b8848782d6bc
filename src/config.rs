use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env as std_env;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_LANGUAGE: &str = "es";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

/// Flat-rate shipping rules applied when the shopper picks home delivery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cost: Decimal,
    /// Orders at or above this subtotal ship free
    pub free_above: Option<Decimal>,
}

/// Hosted-checkout gateway settings (redirect flow, optionally rendered as
/// an embedded card widget first).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct HostedGatewayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub public_key: String,
    /// Base URL of the backend that creates preferences and processes
    /// widget payments; credentials never reach this process.
    #[validate(url)]
    pub api_url: String,
    /// Environment selection is configuration, never inferred.
    #[serde(default)]
    pub sandbox: bool,
    /// Render the embedded card widget before falling back to redirect.
    #[serde(default)]
    pub embedded_widget: bool,
}

/// Card PaymentIntent gateway settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CardIntentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub publishable_key: String,
    #[validate(url)]
    pub api_url: String,
}

/// Manual bank-transfer details shown on the confirmation panel.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BankTransferConfig {
    #[serde(default)]
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub bank_name: String,
    #[validate(length(min = 1))]
    pub account_holder: String,
    #[validate(length(min = 1))]
    pub account_number: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    #[validate]
    pub hosted: Option<HostedGatewayConfig>,
    #[validate]
    pub card_intent: Option<CardIntentConfig>,
    #[validate]
    pub transfer: Option<BankTransferConfig>,
}

/// Business vertical, used to pick wording in the WhatsApp order message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessType {
    #[default]
    General,
    Food,
    Beauty,
}

/// Per-store settings consumed by the checkout engine.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,
    /// Message/localization language ("es" or "en")
    #[serde(default = "default_language")]
    pub language: String,
    /// ISO country code, drives country-specific delivery fields
    pub country: Option<String>,
    #[serde(default)]
    pub business_type: BusinessType,
    /// Destination phone for WhatsApp orders; normalized to digits on use
    pub whatsapp_phone: Option<String>,
    #[serde(default)]
    pub shipping: ShippingConfig,
    #[serde(default)]
    #[validate]
    pub payments: PaymentsConfig,
    /// Country codes whose delivery addresses require a state/province.
    /// Validated only when the store's country appears here.
    #[serde(default)]
    pub delivery_state_required_countries: Vec<String>,
}

impl StoreConfig {
    /// Whether delivery addresses for this store must carry a state field.
    pub fn requires_delivery_state(&self) -> bool {
        match &self.country {
            Some(country) => self
                .delivery_state_required_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country)),
            None => false,
        }
    }
}

/// Endpoints of the external collaborators.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CollaboratorConfig {
    /// Order persistence backend
    #[validate(url)]
    pub order_store_url: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[validate]
    pub collaborators: CollaboratorConfig,
    #[validate]
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay, and `APP__`-prefixed environment variables, then validates it.
pub fn load_config() -> Result<AppConfig, ConfigurationError> {
    let run_env = std_env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    info!(
        environment = %app_config.environment,
        store = %app_config.store.id,
        "configuration loaded"
    );
    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set and non-empty.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_checkout={},tower_http=debug", level);
    let filter_directive = std_env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config() -> StoreConfig {
        StoreConfig {
            id: "store-1".to_string(),
            name: "Demo Store".to_string(),
            currency: "PEN".to_string(),
            language: "es".to_string(),
            country: Some("PE".to_string()),
            business_type: BusinessType::General,
            whatsapp_phone: Some("+51 999 888 777".to_string()),
            shipping: ShippingConfig::default(),
            payments: PaymentsConfig::default(),
            delivery_state_required_countries: vec!["MX".to_string(), "US".to_string()],
        }
    }

    #[test]
    fn state_not_required_outside_configured_countries() {
        let store = store_config();
        assert!(!store.requires_delivery_state());
    }

    #[test]
    fn state_required_for_configured_country_case_insensitive() {
        let mut store = store_config();
        store.country = Some("mx".to_string());
        assert!(store.requires_delivery_state());
    }

    #[test]
    fn state_never_required_without_store_country() {
        let mut store = store_config();
        store.country = None;
        assert!(!store.requires_delivery_state());
    }

    #[test]
    fn currency_must_be_three_letter_iso() {
        assert!(validate_currency("PEN").is_ok());
        assert!(validate_currency("pe").is_err());
        assert!(validate_currency("P3N").is_err());
        assert!(validate_currency("SOLES").is_err());
    }

    #[test]
    fn store_config_validates() {
        let store = store_config();
        assert!(store.validate().is_ok());
    }
}
