//! Store credentials loaded from the environment.
//!
//! Two things are read:
//! - the service account identity (`FIREBASE_SERVICE_ACCOUNT` as JSON, or the
//!   `FIREBASE_PROJECT_ID` / `FIREBASE_CLIENT_EMAIL` / `FIREBASE_PRIVATE_KEY`
//!   triple), used to locate the project's database;
//! - the request token (`FIREBASE_ACCESS_TOKEN` or `FIREBASE_DATABASE_SECRET`)
//!   attached to every REST call.
//!
//! Minting access tokens from the service-account key happens outside this
//! process; the token is passed in through the environment.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Service account identity.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccount {
    /// Default realtime database URL of the account's project.
    pub fn default_database_url(&self) -> String {
        format!("https://{}-default-rtdb.firebaseio.com", self.project_id)
    }
}

/// Token attached to store requests.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// OAuth2 access token, sent as `access_token=`.
    AccessToken(String),
    /// Legacy database secret, sent as `auth=`.
    DatabaseSecret(String),
}

impl AuthToken {
    /// Query parameter carrying this token.
    pub fn query_param(&self) -> (&'static str, &str) {
        match self {
            AuthToken::AccessToken(token) => ("access_token", token),
            AuthToken::DatabaseSecret(secret) => ("auth", secret),
        }
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthToken::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            AuthToken::DatabaseSecret(_) => f.write_str("DatabaseSecret(<redacted>)"),
        }
    }
}

/// Everything needed to talk to the hosted store.
#[derive(Clone, Debug)]
pub struct StoreCredentials {
    pub service_account: Option<ServiceAccount>,
    pub token: AuthToken,
}

/// Message reported whenever credentials are needed but absent.
pub const MISSING_CREDENTIALS: &str = "Store credentials are missing. Set FIREBASE_ACCESS_TOKEN or FIREBASE_DATABASE_SECRET (and FIREBASE_SERVICE_ACCOUNT or FIREBASE_PROJECT_ID/FIREBASE_CLIENT_EMAIL/FIREBASE_PRIVATE_KEY).";

/// Load credentials from process environment variables.
///
/// Returns `Ok(None)` when no request token is configured.
pub fn load_from_env() -> Result<Option<StoreCredentials>> {
    load_with(|key| std::env::var(key).ok())
}

/// Load credentials through an arbitrary variable lookup.
pub fn load_with<F>(lookup: F) -> Result<Option<StoreCredentials>>
where
    F: Fn(&str) -> Option<String>,
{
    let service_account = service_account_with(&lookup)?;

    let token = match (
        non_empty(lookup("FIREBASE_ACCESS_TOKEN")),
        non_empty(lookup("FIREBASE_DATABASE_SECRET")),
    ) {
        (Some(token), _) => AuthToken::AccessToken(token),
        (None, Some(secret)) => AuthToken::DatabaseSecret(secret),
        (None, None) => return Ok(None),
    };

    Ok(Some(StoreCredentials {
        service_account,
        token,
    }))
}

fn service_account_with<F>(lookup: &F) -> Result<Option<ServiceAccount>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(json) = non_empty(lookup("FIREBASE_SERVICE_ACCOUNT")) {
        let mut account: ServiceAccount = serde_json::from_str(&json)
            .context("FIREBASE_SERVICE_ACCOUNT is not valid service account JSON")?;
        account.private_key = unescape_newlines(&account.private_key);
        return Ok(Some(account));
    }

    match (
        non_empty(lookup("FIREBASE_PROJECT_ID")),
        non_empty(lookup("FIREBASE_CLIENT_EMAIL")),
        non_empty(lookup("FIREBASE_PRIVATE_KEY")),
    ) {
        (Some(project_id), Some(client_email), Some(private_key)) => Ok(Some(ServiceAccount {
            project_id,
            client_email,
            private_key: unescape_newlines(&private_key),
        })),
        _ => Ok(None),
    }
}

/// Keys pasted into env vars usually carry literal `\n` sequences.
fn unescape_newlines(key: &str) -> String {
    key.replace("\\n", "\n")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
