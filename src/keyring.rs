use std::collections::HashMap;

use crate::error::{Error, Result};

pub(crate) const SERVICE_NAME: &str = "taskpad";

fn attributes(store_url: &str) -> HashMap<&str, &str> {
    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("server", store_url);
    attrs
}

/// Store an access token in the system keyring via Secret Service.
pub async fn store_token(store_url: &str, token: &str) -> Result<()> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| Error::Keyring(format!("Failed to connect to keyring: {}", e)))?;

    keyring
        .create_item(
            &format!("Taskpad ({})", store_url),
            &attributes(store_url),
            token.as_bytes(),
            true, // replace existing
        )
        .await
        .map_err(|e| Error::Keyring(format!("Failed to store token: {}", e)))?;

    Ok(())
}

/// Load the access token for `store_url`, if one was stored.
pub async fn load_token(store_url: &str) -> Result<Option<String>> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| Error::Keyring(format!("Failed to connect to keyring: {}", e)))?;

    let items = keyring
        .search_items(&attributes(store_url))
        .await
        .map_err(|e| Error::Keyring(format!("Failed to search keyring: {}", e)))?;

    if let Some(item) = items.first() {
        let secret = item
            .secret()
            .await
            .map_err(|e| Error::Keyring(format!("Failed to read secret: {}", e)))?;
        let token = String::from_utf8(secret.to_vec())
            .map_err(|e| Error::Keyring(format!("Invalid UTF-8 in secret: {}", e)))?;
        return Ok(Some(token));
    }

    Ok(None)
}

pub async fn delete_token(store_url: &str) -> Result<()> {
    let keyring = oo7::Keyring::new()
        .await
        .map_err(|e| Error::Keyring(format!("Failed to connect to keyring: {}", e)))?;

    let items = keyring
        .search_items(&attributes(store_url))
        .await
        .map_err(|e| Error::Keyring(format!("Failed to search keyring: {}", e)))?;

    for item in items {
        item.delete()
            .await
            .map_err(|e| Error::Keyring(format!("Failed to delete token: {}", e)))?;
    }

    Ok(())
}
