use std::{
    collections::HashMap,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::Result,
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize, Serializer},
};

fn serialize_secret<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredToken {
    #[serde(serialize_with = "serialize_secret")]
    access_token: SecretString,
    saved_at: u64,
}

/// File-based bearer token storage, keyed by account (the API base URL), at
/// `~/.config/tidings/session_tokens.json`.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new() -> Self {
        let dir = tidings_config::config_dir().unwrap_or_else(tidings_config::data_dir);
        Self {
            path: dir.join("session_tokens.json"),
        }
    }

    /// Create a token store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, StoredToken> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|d| serde_json::from_str(&d).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, map: &HashMap<String, StoredToken>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(map)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn load(&self, account: &str) -> Option<SecretString> {
        self.read_all()
            .remove(account)
            .map(|stored| stored.access_token)
    }

    pub fn save(&self, account: &str, token: &SecretString) -> Result<()> {
        let mut map = self.read_all();
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        map.insert(account.to_string(), StoredToken {
            access_token: token.clone(),
            saved_at,
        });
        self.write_all(&map)
    }

    /// Remove the token for `account`. Missing file or entry is not an error.
    pub fn delete(&self, account: &str) -> Result<()> {
        let mut map = self.read_all();
        if map.remove(account).is_none() {
            return Ok(());
        }
        self.write_all(&map)
    }

    pub fn accounts(&self) -> Vec<String> {
        let mut accounts: Vec<_> = self.read_all().into_keys().collect();
        accounts.sort();
        accounts
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_path(dir.path().join("nested").join("tokens.json"));
        (dir, store)
    }

    #[test]
    fn save_load_survives_new_instance() {
        let (_dir, store) = store();
        store
            .save("http://a/api", &SecretString::new("tok-a".into()))
            .unwrap();

        let reopened = TokenStore::with_path(store.path().clone());
        let token = reopened.load("http://a/api").unwrap();
        assert_eq!(token.expose_secret(), "tok-a");
        assert!(reopened.load("http://b/api").is_none());
    }

    #[test]
    fn accounts_are_independent() {
        let (_dir, store) = store();
        store.save("b", &SecretString::new("2".into())).unwrap();
        store.save("a", &SecretString::new("1".into())).unwrap();
        assert_eq!(store.accounts(), vec!["a", "b"]);

        store.delete("a").unwrap();
        assert_eq!(store.accounts(), vec!["b"]);
        assert_eq!(store.load("b").unwrap().expose_secret(), "2");
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, store) = store();
        store.delete("missing").unwrap();
        store.save("a", &SecretString::new("1".into())).unwrap();
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.load("a").is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.load("a").is_none());
        store.save("a", &SecretString::new("1".into())).unwrap();
        assert!(store.load("a").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.save("a", &SecretString::new("1".into())).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
