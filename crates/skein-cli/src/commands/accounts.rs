//! `skein accounts`

use anyhow::Result;
use skein_client::{Account, Client};

pub async fn execute(client: &Client, json: bool) -> Result<()> {
    let accounts = client.list_accounts().await?;
    for account in &accounts {
        if json {
            println!("{}", serde_json::to_string(account)?);
        } else {
            println!("{}", format_account(account));
        }
    }
    Ok(())
}

/// One tab-separated line: id, address, display name.
pub fn format_account(account: &Account) -> String {
    match account {
        Account::Configured {
            id,
            display_name,
            addr,
            ..
        } => format!(
            "{}\t{}\t{}",
            id,
            addr.as_deref().unwrap_or("-"),
            display_name.as_deref().unwrap_or("")
        ),
        Account::Unconfigured { id } => format!("{}\t(unconfigured)", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_configured() {
        let account = Account::Configured {
            id: 1,
            display_name: Some("Alice".into()),
            addr: Some("alice@example.org".into()),
            profile_image: None,
            color: "#4c9a2a".into(),
        };
        assert_eq!(format_account(&account), "1\talice@example.org\tAlice");
    }

    #[test]
    fn test_format_unconfigured() {
        assert_eq!(
            format_account(&Account::Unconfigured { id: 4 }),
            "4\t(unconfigured)"
        );
    }
}
