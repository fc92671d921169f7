//! OAuth2 client-credentials authentication against the Microsoft
//! identity platform v2.0.
//!
//! The connector runs as a daemon-style confidential client: there is no
//! user interaction, only `client_id` + `client_secret` exchanged for an
//! application token at `{authority}/oauth2/v2.0/token`.

use crate::onedrive::error::{SyncError, SyncResult};
use crate::onedrive::types::{BearerToken, Config};
use chrono::Utc;
use log::debug;

/// Acquire an application token via the client-credentials grant.
pub async fn client_credentials_token(config: &Config) -> SyncResult<BearerToken> {
    if config.client_secret.is_empty() {
        return Err(SyncError::auth(
            "client_secret is required for the client-credentials flow",
        ));
    }

    let token_url = format!("{}/oauth2/v2.0/token", config.authority.trim_end_matches('/'));
    let scope = config.scopes.join(" ");

    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("grant_type", "client_credentials"),
        ("scope", scope.as_str()),
    ];

    let client = reqwest::Client::new();
    let resp = client
        .post(&token_url)
        .form(&params)
        .send()
        .await
        .map_err(SyncError::from)?;

    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(SyncError::from)?;

    if status != 200 {
        return Err(SyncError::from_graph_response(status, &body));
    }

    parse_token_response(&body)
}

fn parse_token_response(body: &str) -> SyncResult<BearerToken> {
    let v: serde_json::Value = serde_json::from_str(body)?;

    let access_token = v["access_token"]
        .as_str()
        .ok_or_else(|| SyncError::auth("No access_token in response"))?
        .to_string();

    let expires_in = v["expires_in"].as_i64().unwrap_or(3600);
    let expires_at = Utc::now() + chrono::Duration::seconds(expires_in);

    debug!("Parsed token, expires in {}s", expires_in);

    Ok(BearerToken {
        access_token,
        token_type: v["token_type"].as_str().unwrap_or("Bearer").to_string(),
        expires_at,
    })
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
