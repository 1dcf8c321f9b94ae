use std::collections::HashMap;

use log::{error, info};
use reqwest::Client;
use serde_json::Value;

use crate::error::{ExtractError, Result};

/// Exchange application credentials for a bearer token.
///
/// `authority` is the tenant-qualified login endpoint, for example
/// `https://login.microsoftonline.com/<tenant>`.
pub async fn fetch_client_credentials_token(
    client_id: &str,
    client_secret: &str,
    authority: &str,
    scope: &str,
    verify_tls: bool,
) -> Result<String> {
    let client = Client::builder()
        .danger_accept_invalid_certs(!verify_tls)
        .build()?;
    let token_url = format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/'));

    let mut params = HashMap::new();
    params.insert("client_id", client_id);
    params.insert("client_secret", client_secret);
    params.insert("scope", scope);
    params.insert("grant_type", "client_credentials");

    info!("Requesting access token from {}", token_url);

    let resp = client
        .post(&token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| ExtractError::Auth(format!("Token request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        error!("HTTP error getting access token: {} - {}", status, body);
        return Err(ExtractError::Auth(format!("{}: {}", status, body)));
    }

    let json: Value = resp
        .json()
        .await
        .map_err(|e| ExtractError::Auth(format!("Failed to parse token response: {e}")))?;

    let access_token = json
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExtractError::Auth("No access_token in response".to_string()))?;

    if access_token.trim().is_empty() {
        return Err(ExtractError::Auth("Access token was empty".to_string()));
    }

    info!("Access token obtained successfully.");
    Ok(access_token.to_string())
}
