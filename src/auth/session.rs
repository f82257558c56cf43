//! Self-renewing ID token for long-lived store handles.
//!
//! Firebase ID tokens live for an hour. A chat screen stays open longer than
//! that, so the Firestore store asks `SessionTokens` for a token on every
//! request and hands back rejected ones for renewal.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::identity::{self, Session};
use super::{AuthConfig, StoredToken, TokenStore};
use crate::config::Config;
use crate::store::{StoreError, TokenSource};

pub struct SessionTokens {
    http: reqwest::Client,
    auth: AuthConfig,
    api_key: String,
    state: Mutex<State>,
    /// Write renewed tokens back to the config file.
    persist: bool,
}

struct State {
    id_token: StoredToken,
    refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn new(
        auth: AuthConfig,
        api_key: String,
        id_token: StoredToken,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
            api_key,
            state: Mutex::new(State {
                id_token,
                refresh_token,
            }),
            persist: false,
        }
    }

    /// Also save renewed tokens to the config file, so the next command
    /// starts with them.
    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    async fn renew(&self, state: &mut State) -> Result<String, StoreError> {
        let refresh_token = state.refresh_token.clone().ok_or_else(|| {
            StoreError::TokenRefresh("no refresh token, run 'firechat login'".to_string())
        })?;

        tracing::info!("Refreshing ID token...");
        let session =
            identity::refresh_id_token(&self.http, &self.auth, &self.api_key, &refresh_token)
                .await
                .map_err(|e| StoreError::TokenRefresh(format!("{:#}", e)))?;

        state.id_token = StoredToken::new(session.id_token.clone(), session.expires_in);
        state.refresh_token = Some(session.refresh_token.clone());
        if self.persist {
            if let Err(e) = save_session(&session) {
                tracing::warn!("Could not save refreshed token: {:#}", e);
            }
        }
        tracing::info!("Token refresh complete");
        Ok(session.id_token)
    }
}

fn save_session(session: &Session) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    config.set_id_token(session.id_token.clone(), session.expires_in);
    config.set_refresh_token(session.refresh_token.clone());
    config.save()
}

#[async_trait]
impl TokenSource for SessionTokens {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        if state.id_token.is_expired() && state.refresh_token.is_some() {
            return self.renew(&mut state).await.map(Some);
        }
        Ok(Some(state.id_token.token.clone()))
    }

    async fn refresh(&self, rejected: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        // A concurrent request already swapped it out.
        if state.id_token.token != rejected {
            return Ok(Some(state.id_token.token.clone()));
        }
        if state.refresh_token.is_none() {
            return Ok(None);
        }
        self.renew(&mut state).await.map(Some)
    }
}
