use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::Deserialize;

use crate::error::{ExtractError, Result};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "POWERBI_METADATA_CONFIG";

const LOGIN_HOST: &str = "https://login.microsoftonline.com";
const POWERBI_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";
const POWERBI_BASE_URL: &str = "https://api.powerbi.com/v1.0/myorg";

/// Service principal settings read from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "TENANT_ID")]
    pub tenant_id: String,
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "CLIENT_SECRET")]
    pub client_secret: String,
    #[serde(rename = "VERIFY_SSL")]
    pub verify_ssl: bool,
}

impl Config {
    /// `$POWERBI_METADATA_CONFIG` if set, otherwise `./config.json`.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = std::env::current_dir()?;
        path.push("config.json");
        Ok(path)
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            error!("config.json not found at {}", path.display());
            ExtractError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&contents)?;
        info!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| {
            error!("Invalid JSON in config.json: {e}");
            ExtractError::Config(format!("Invalid config.json: {e}"))
        })
    }
}

/// Endpoints derived from the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConstants {
    pub authority: String,
    pub scope: String,
    pub base_url: String,
    pub admin_base_url: String,
}

impl ApiConstants {
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            authority: format!("{}/{}", LOGIN_HOST, tenant_id),
            scope: POWERBI_SCOPE.to_string(),
            base_url: POWERBI_BASE_URL.to_string(),
            admin_base_url: format!("{}/admin", POWERBI_BASE_URL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_required_keys() {
        let config = Config::from_json(
            r#"{"TENANT_ID":"t","CLIENT_ID":"c","CLIENT_SECRET":"s","VERIFY_SSL":false}"#,
        )
        .unwrap();
        assert_eq!(config.tenant_id, "t");
        assert_eq!(config.client_id, "c");
        assert_eq!(config.client_secret, "s");
        assert!(!config.verify_ssl);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = Config::from_json(r#"{"TENANT_ID":"t","CLIENT_ID":"c"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"TENANT_ID":"t","CLIENT_ID":"c","CLIENT_SECRET":"s","VERIFY_SSL":true}"#,
        )
        .unwrap();
        assert!(Config::load(&path).unwrap().verify_ssl);
    }

    #[test]
    fn constants_follow_tenant() {
        let constants = ApiConstants::for_tenant("contoso");
        assert_eq!(constants.authority, "https://login.microsoftonline.com/contoso");
        assert_eq!(constants.admin_base_url, "https://api.powerbi.com/v1.0/myorg/admin");
    }
}
