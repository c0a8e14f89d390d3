//! OAuth2 access tokens for Firestore
//!
//! Service account credentials are turned into short-lived bearer tokens with
//! the JWT bearer grant. Tokens are cached until shortly before they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Google service account key, as downloaded from the cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl ServiceAccount {
    /// Parse a service account key from its JSON representation
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid service account credentials: {}", e)))
    }
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Build the signed assertion exchanged for an access token
pub(crate) fn sign_assertion(account: &ServiceAccount, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
        iss: account.client_email.clone(),
        scope: DATASTORE_SCOPE.to_string(),
        aud: account.token_uri.clone(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = account.private_key_id.clone();

    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(&header, &claims, &key)?)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
pub(crate) struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Supplies the `Authorization` header value for Firestore requests
pub(crate) enum TokenSource {
    /// Local emulator, which accepts a fixed owner token
    Emulator,
    ServiceAccount {
        account: ServiceAccount,
        http: reqwest::Client,
        cached: Mutex<Option<AccessToken>>,
    },
}

impl TokenSource {
    pub fn service_account(account: ServiceAccount, http: reqwest::Client) -> Self {
        TokenSource::ServiceAccount {
            account,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, refreshing it if needed
    pub async fn bearer(&self) -> Result<String> {
        let (account, http, cached) = match self {
            TokenSource::Emulator => return Ok("owner".to_string()),
            TokenSource::ServiceAccount {
                account,
                http,
                cached,
            } => (account, http, cached),
        };

        // Held across the fetch: at most one refresh in flight
        let mut cached = cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.token.clone());
        }

        let token = fetch_token(account, http, now).await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

async fn fetch_token(
    account: &ServiceAccount,
    http: &reqwest::Client,
    now: DateTime<Utc>,
) -> Result<AccessToken> {
    let assertion = sign_assertion(account, now)?;

    let response = http
        .post(&account.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Auth(format!(
            "token endpoint returned {}: {}",
            status, body
        )));
    }

    let token: TokenResponse = response.json().await?;
    tracing::debug!("Obtained access token for {}", account.client_email);

    Ok(AccessToken {
        token: token.access_token,
        expires_at: now + Duration::seconds(token.expires_in),
    })
}
