use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::api::{ApiClient, ApiError};
use crate::config::{Config, ConfigError};

/// Endpoint used to check whether the stored access token still works.
const PROBE_PATH: &str = "/people/me";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode token response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Not configured properly: {field} not configured.\nVisit\n{authorize_url}")]
    MissingCredential {
        field: &'static str,
        authorize_url: String,
    },
    #[error("Unauthorized (401) by the token endpoint.\nVisit\n{authorize_url}")]
    Unauthorized { authorize_url: String },
    #[error("unexpected status from token endpoint: {status}\n{body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

impl AuthError {
    /// True when the user has to obtain a new authorization code.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredential { .. } | AuthError::Unauthorized { .. }
        )
    }
}

/// Parsed body of a successful `/access_token` exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(rename = "expires_in", default)]
    pub access_expires_in: f64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "refresh_token_expires_in", default)]
    pub refresh_expires_in: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorized {
    /// The stored access token passed the probe.
    AlreadyValid,
    /// A new token pair was obtained from the authorization code.
    Exchanged,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Makes sure the client holds a working access token.
///
/// A stored token is probed first. Only when there is none, or the probe is
/// rejected with 401, the authorization code is exchanged. The refresh token
/// is never used here; it is reserved for 401s in the middle of a session.
pub async fn authorize(client: &mut ApiClient) -> Result<Authorized, ApiError> {
    if client.config().has_access_token() {
        let probe = client.get_request(PROBE_PATH)?;
        let response = client.send_once(&probe).await?;
        let status = response.status();
        if status.is_success() {
            info!("stored access token is valid");
            return Ok(Authorized::AlreadyValid);
        }
        if status != StatusCode::UNAUTHORIZED {
            let body = response.text().await?;
            return Err(ApiError::Status { status, body });
        }
        info!("stored access token rejected, exchanging authorization code");
    }

    let (http, config) = client.parts_mut();
    exchange_code(http, config).await?;
    Ok(Authorized::Exchanged)
}

/// Exchanges the configured authorization code for a token pair and persists it.
pub async fn exchange_code(http: &Client, config: &mut Config) -> Result<(), AuthError> {
    check_client_config(config)?;

    info!("authorizing with authorization code");
    let request = TokenRequest {
        grant_type: "authorization_code",
        client_id: &config.client_id,
        client_secret: &config.client_secret,
        code: Some(&config.auth_code),
        redirect_uri: Some(&config.redirect_uri),
        refresh_token: None,
    };
    let tokens = post_token_request(http, config, &request).await?;
    apply_tokens(config, tokens, Grant::AuthorizationCode);
    config.save()?;
    Ok(())
}

/// Obtains a new access token from the stored refresh token and persists it.
pub async fn refresh(http: &Client, config: &mut Config) -> Result<(), AuthError> {
    if config.refresh_token.trim().is_empty() {
        return Err(AuthError::MissingCredential {
            field: "RefreshToken",
            authorize_url: authorize_url(config)?,
        });
    }

    info!("refreshing access token");
    let request = TokenRequest {
        grant_type: "refresh_token",
        client_id: &config.client_id,
        client_secret: &config.client_secret,
        code: None,
        redirect_uri: None,
        refresh_token: Some(&config.refresh_token),
    };
    let tokens = post_token_request(http, config, &request).await?;
    apply_tokens(config, tokens, Grant::RefreshToken);
    config.save()?;
    info!("access token refreshed");
    Ok(())
}

/// URL where the user grants access and receives an authorization code.
pub fn authorize_url(config: &Config) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&format!("{}/authorize", config.base_url.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("scope", &config.scope);
    Ok(url.into())
}

fn check_client_config(config: &Config) -> Result<(), AuthError> {
    let required = [
        ("ClientId", &config.client_id),
        ("ClientSecret", &config.client_secret),
        ("AuthCode", &config.auth_code),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AuthError::MissingCredential {
                field,
                authorize_url: authorize_url(config)?,
            });
        }
    }
    Ok(())
}

async fn post_token_request(
    http: &Client,
    config: &Config,
    form: &TokenRequest<'_>,
) -> Result<TokenPair, AuthError> {
    let token_url = format!("{}/access_token", config.base_url.trim_end_matches('/'));
    let response = http.post(token_url).form(form).send().await?;
    let status = response.status();
    let body = response.text().await?;
    match status {
        StatusCode::OK => Ok(serde_json::from_str(&body)?),
        StatusCode::UNAUTHORIZED => {
            warn!(grant_type = form.grant_type, "token endpoint returned 401");
            Err(AuthError::Unauthorized {
                authorize_url: authorize_url(config)?,
            })
        }
        _ => Err(AuthError::UnexpectedStatus { status, body }),
    }
}

/// A refresh response usually repeats neither the refresh token nor its
/// expiry, so those are only replaced when present.
fn apply_tokens(config: &mut Config, tokens: TokenPair, grant: Grant) {
    config.access_token = tokens.access_token;
    config.access_expires = tokens.access_expires_in;
    match grant {
        Grant::AuthorizationCode => {
            config.refresh_token = tokens.refresh_token.unwrap_or_default();
            config.refresh_expires = tokens.refresh_expires_in.unwrap_or_default();
        }
        Grant::RefreshToken => {
            if let Some(refresh_token) = tokens.refresh_token.filter(|token| !token.is_empty()) {
                config.refresh_token = refresh_token;
                if let Some(expires) = tokens.refresh_expires_in {
                    config.refresh_expires = expires;
                }
            }
        }
    }
}
