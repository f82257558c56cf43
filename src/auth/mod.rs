//! Authentication module
//!
//! Signs in with Firebase Authentication (email/password), keeps the ID
//! token fresh with the refresh token, and caches the account profile
//! (uid, email, phone number, photo URL) used when sending messages.

pub mod identity;
pub mod session;
pub mod tokens;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{presence_fields, CurrentUser};
use crate::store::{DocumentStore, FieldValue, FirestoreStore};
pub use session::SessionTokens;
pub use tokens::{StoredToken, TokenStore};

/// Firebase Authentication endpoints
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity Toolkit base (sign-in, account lookup)
    pub identity_url: String,
    /// Secure Token base (refresh)
    pub token_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_url: "https://securetoken.googleapis.com/v1".to_string(),
        }
    }
}

/// Sign in with email and password and cache tokens and profile.
pub async fn login(email: &str, password: &str, force: bool) -> Result<()> {
    let mut config = Config::load()?;

    if !force {
        if let (Some(token), Some(profile)) = (config.get_id_token(), config.profile.as_ref()) {
            if !token.is_expired() {
                println!("Already logged in as {}. Use --force to sign in again.", profile.email);
                return Ok(());
            }
        }
    }

    let api_key = config.require_api_key()?.to_string();
    let auth = AuthConfig::default();
    let http = reqwest::Client::new();

    let session = identity::sign_in_with_password(&http, &auth, &api_key, email, password)
        .await
        .context("Login failed")?;
    let profile = identity::lookup_account(&http, &auth, &api_key, &session.id_token).await?;

    config.set_id_token(session.id_token.clone(), session.expires_in);
    config.set_refresh_token(session.refresh_token);
    config.profile = Some(profile.clone());
    config.save()?;

    // Make the account discoverable by email so peers can see our presence.
    let store = FirestoreStore::new(
        config.firestore_url.as_deref(),
        config.require_project_id()?,
        Some(session.id_token),
    );
    if let Err(e) = store.merge(&profile.record_path(), profile_fields(&profile)).await {
        tracing::warn!("Could not update user record: {}", e);
    }

    println!("Logged in as {}", profile.email);
    Ok(())
}

/// Fields merged into `users/{uid}` at login.
fn profile_fields(profile: &CurrentUser) -> crate::store::Fields {
    let mut fields = presence_fields();
    fields.insert("email".into(), profile.email.as_str().into());
    fields.insert("photoURL".into(), profile.photo_url.clone().into());
    if let Some(ref phone) = profile.phone_number {
        fields.insert("phoneNumber".into(), FieldValue::from(phone.as_str()));
    }
    fields
}

/// Clear cached credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Show current authentication status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("Project: {}", config.project_id.as_deref().unwrap_or("(not set)"));

    match (config.profile.as_ref(), config.get_id_token()) {
        (Some(profile), Some(token)) => {
            println!("Signed in as: {} ({})", profile.email, profile.uid);
            if token.is_expired() {
                let refreshable = config.get_refresh_token().is_some();
                println!(
                    "ID token: expired{}",
                    if refreshable { " (will refresh on next use)" } else { "" }
                );
            } else {
                match token.remaining_secs() {
                    Some(secs) => println!("ID token: valid for {}m", secs / 60),
                    None => println!("ID token: valid"),
                }
            }
        }
        _ => println!("Not logged in. Run 'firechat login'."),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_fields() {
        let profile = CurrentUser {
            uid: "u1".into(),
            email: "me@x.com".into(),
            phone_number: None,
            photo_url: None,
        };
        let fields = profile_fields(&profile);
        assert_eq!(fields["email"], FieldValue::String("me@x.com".into()));
        assert_eq!(fields["lastSeen"], FieldValue::ServerTimestamp);
        assert_eq!(fields["photoURL"], FieldValue::Null);
        assert!(!fields.contains_key("phoneNumber"));
    }
}
