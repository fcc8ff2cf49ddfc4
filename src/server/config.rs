//! Server configuration types

use serde::{Deserialize, Serialize};
use ussd_core::StorageConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub custodial: CustodialConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path Africa's Talking posts to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long shutdown waits for in-flight requests
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7123
}
fn default_endpoint() -> String {
    "/".to_string()
}
fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            endpoint: default_endpoint(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Menu resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuConfig {
    /// Menu definition TOML
    #[serde(default = "default_definition")]
    pub definition: String,
    /// Flag table CSV
    #[serde(default = "default_flags")]
    pub flags: String,
    /// Screen size cap in bytes
    #[serde(default = "default_max_output")]
    pub max_output: usize,
    /// Language used before a session picks one
    #[serde(default)]
    pub default_language: Option<String>,
}

fn default_definition() -> String {
    "menus/main.toml".to_string()
}
fn default_flags() -> String {
    "config/flags.csv".to_string()
}
fn default_max_output() -> usize {
    ussd_menu::DEFAULT_MAX_OUTPUT
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            definition: default_definition(),
            flags: default_flags(),
            max_output: default_max_output(),
            default_language: None,
        }
    }
}

/// Custodial account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodialConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Voucher holdings API
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5003".to_string()
}
fn default_data_url() -> String {
    "http://localhost:5006".to_string()
}
fn default_timeout() -> u64 {
    ussd_handlers::account_service::DEFAULT_TIMEOUT_SECS
}

impl Default for CustodialConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            data_url: default_data_url(),
            timeout_secs: default_timeout(),
        }
    }
}
