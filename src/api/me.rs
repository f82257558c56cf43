//! Current user info

use anyhow::Result;

use super::client::ChatClient;
use crate::models::UserRecord;
use crate::screen::time_ago;

/// Display the signed-in profile and the presence stored in its user record.
pub async fn whoami() -> Result<()> {
    let client = ChatClient::new().await?;
    let me = client.me();

    println!();
    println!("Email:  {}", me.email);
    println!("Phone:  {}", me.phone_number.as_deref().unwrap_or("(none)"));
    println!("Photo:  {}", me.photo_url.as_deref().unwrap_or("(none)"));
    println!("UID:    {}", me.uid);

    match client.store().get(&me.record_path()).await {
        Ok(doc) => {
            let record = UserRecord::from_document(&doc);
            let seen = record
                .last_seen
                .map(|ts| time_ago(ts, chrono::Utc::now()))
                .unwrap_or_else(|| "Unavailable".to_string());
            println!("Last active: {}", seen);
        }
        Err(e) => tracing::warn!("Could not read user record: {}", e),
    }

    Ok(())
}
