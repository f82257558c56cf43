//! Firebase Authentication REST calls (Identity Toolkit + Secure Token).

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::AuthConfig;
use crate::models::CurrentUser;

/// Tokens returned by sign-in or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

/// The secure token endpoint answers in snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    user_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    users: Option<Vec<AccountInfo>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    phone_number: Option<String>,
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Lifetimes arrive as decimal strings ("3600").
fn parse_expires_in(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.parse().ok())
}

/// Turn an auth error body like `{"error":{"message":"INVALID_PASSWORD"}}`
/// into a readable error.
async fn check_response(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => bail!("{} failed: {}", what, env.error.message),
        Err(_) => bail!("{} failed: HTTP {}: {}", what, status.as_u16(), body),
    }
}

/// Email/password sign-in.
pub async fn sign_in_with_password(
    http: &reqwest::Client,
    auth: &AuthConfig,
    api_key: &str,
    email: &str,
    password: &str,
) -> Result<Session> {
    let url = format!("{}/accounts:signInWithPassword", auth.identity_url);
    tracing::debug!("Identity POST {}", url);

    let body = serde_json::json!({
        "email": email,
        "password": password,
        "returnSecureToken": true,
    });
    let resp = http
        .post(&url)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Identity POST {} failed", url))?;

    let parsed: SignInResponse = check_response(resp, "Sign-in")
        .await?
        .json()
        .await
        .context("Failed to parse sign-in response")?;

    Ok(Session {
        uid: parsed.local_id,
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: parse_expires_in(parsed.expires_in.as_deref()),
    })
}

/// Exchange a refresh token for a fresh ID token.
pub async fn refresh_id_token(
    http: &reqwest::Client,
    auth: &AuthConfig,
    api_key: &str,
    refresh_token: &str,
) -> Result<Session> {
    let url = format!("{}/token", auth.token_url);
    tracing::debug!("Secure token POST {}", url);

    let resp = http
        .post(&url)
        .query(&[("key", api_key)])
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .with_context(|| format!("Secure token POST {} failed", url))?;

    let parsed: RefreshResponse = check_response(resp, "Token refresh")
        .await?
        .json()
        .await
        .context("Failed to parse token refresh response")?;

    Ok(Session {
        uid: parsed.user_id,
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: parse_expires_in(parsed.expires_in.as_deref()),
    })
}

/// Look up the profile (email, phone, photo) behind an ID token.
pub async fn lookup_account(
    http: &reqwest::Client,
    auth: &AuthConfig,
    api_key: &str,
    id_token: &str,
) -> Result<CurrentUser> {
    let url = format!("{}/accounts:lookup", auth.identity_url);
    tracing::debug!("Identity POST {}", url);

    let resp = http
        .post(&url)
        .query(&[("key", api_key)])
        .json(&serde_json::json!({ "idToken": id_token }))
        .send()
        .await
        .with_context(|| format!("Identity POST {} failed", url))?;

    let parsed: LookupResponse = check_response(resp, "Account lookup")
        .await?
        .json()
        .await
        .context("Failed to parse account lookup response")?;

    let account = parsed
        .users
        .and_then(|users| users.into_iter().next())
        .context("Account lookup returned no user")?;

    current_user_from(account)
}

fn current_user_from(account: AccountInfo) -> Result<CurrentUser> {
    let email = account
        .email
        .context("Account has no email address; chats are keyed by email")?;
    Ok(CurrentUser {
        uid: account.local_id,
        email,
        phone_number: account.phone_number,
        photo_url: account.photo_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sign_in_response() {
        let json = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "u1",
            "email": "me@x.com",
            "idToken": "id",
            "refreshToken": "rt",
            "expiresIn": "3600",
            "registered": true
        }"#;
        let parsed: SignInResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.local_id, "u1");
        assert_eq!(parse_expires_in(parsed.expires_in.as_deref()), Some(3600));
    }

    #[test]
    fn test_parse_refresh_response() {
        let json = r#"{
            "expires_in": "3600",
            "token_type": "Bearer",
            "refresh_token": "rt2",
            "id_token": "id2",
            "user_id": "u1",
            "project_id": "123"
        }"#;
        let parsed: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.user_id, "u1");
        assert_eq!(parsed.refresh_token, "rt2");
    }

    #[test]
    fn test_lookup_to_current_user() {
        let json = r#"{"users": [{
            "localId": "u1",
            "email": "me@x.com",
            "phoneNumber": "+15550100",
            "photoUrl": "https://example.com/me.png"
        }]}"#;
        let parsed: LookupResponse = serde_json::from_str(json).unwrap();
        let account = parsed.users.unwrap().into_iter().next().unwrap();
        let user = current_user_from(account).unwrap();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.phone_number.as_deref(), Some("+15550100"));
        assert_eq!(user.photo_url.as_deref(), Some("https://example.com/me.png"));
    }

    #[test]
    fn test_lookup_without_email_rejected() {
        let account = AccountInfo {
            local_id: "u1".into(),
            email: None,
            phone_number: Some("+1".into()),
            photo_url: None,
        };
        assert!(current_user_from(account).is_err());
    }

    #[test]
    fn test_parse_error_envelope() {
        let env: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"code": 400, "message": "INVALID_PASSWORD"}}"#)
                .unwrap();
        assert_eq!(env.error.message, "INVALID_PASSWORD");
    }

    #[test]
    fn test_parse_expires_in_garbage() {
        assert_eq!(parse_expires_in(Some("soon")), None);
        assert_eq!(parse_expires_in(None), None);
    }
}
