//! Authenticated store client.
//!
//! Loads config and hands out a Firestore-backed `DocumentStore` together
//! with the signed-in profile. The store renews the ID token itself, on
//! expiry or when Firestore rejects it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::auth::{AuthConfig, SessionTokens, TokenStore};
use crate::config::Config;
use crate::models::CurrentUser;
use crate::store::{DocumentStore, FirestoreStore};

pub struct ChatClient {
    store: Arc<dyn DocumentStore>,
    me: CurrentUser,
    poll_interval: Duration,
}

impl ChatClient {
    /// Load config and build client.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;

        let token = config
            .get_id_token()
            .context("Not logged in. Run 'firechat login'.")?;
        let refresh_token = config.get_refresh_token();
        if token.is_expired() && refresh_token.is_none() {
            bail!("ID token expired and no refresh token available. Run 'firechat login'.");
        }
        let me = config
            .profile
            .clone()
            .context("No cached profile. Run 'firechat login --force'.")?;

        let tokens = SessionTokens::new(
            AuthConfig::default(),
            config.require_api_key()?.to_string(),
            token,
            refresh_token,
        )
        .persisted();
        let store = FirestoreStore::with_tokens(
            config.firestore_url.as_deref(),
            config.require_project_id()?,
            Arc::new(tokens),
        );

        Ok(Self {
            store: Arc::new(store),
            me,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn me(&self) -> &CurrentUser {
        &self.me
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
