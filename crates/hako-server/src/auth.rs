//! Login checks against the configured accounts.

use std::collections::HashMap;
use std::path::Path;

use russh::keys::ssh_key::PublicKey;

use crate::config::{Account, ConfigError, ServerConfig};

/// Verifies passwords and public keys for configured accounts.
#[derive(Debug, Clone)]
pub struct Authenticator {
    accounts: HashMap<String, Account>,
    authorized_keys: Vec<PublicKey>,
}

impl Authenticator {
    /// Build from config, reading `authorized_keys_file` if one is set.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let authorized_keys = match &config.authorized_keys_file {
            Some(path) => load_authorized_keys(path)?,
            None => Vec::new(),
        };
        Ok(Self::new(config.accounts.clone(), authorized_keys))
    }

    pub fn new(accounts: Vec<Account>, authorized_keys: Vec<PublicKey>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.username.clone(), a))
                .collect(),
            authorized_keys,
        }
    }

    /// Account for `user` if `password` matches.
    pub fn check_password(&self, user: &str, password: &str) -> Option<&Account> {
        self.accounts
            .get(user)
            .filter(|a| a.password.as_deref() == Some(password))
    }

    /// Account for `user` if `key` is listed in the authorized keys.
    pub fn check_public_key(&self, user: &str, key: &PublicKey) -> Option<&Account> {
        let listed = self
            .authorized_keys
            .iter()
            .any(|k| k.key_data() == key.key_data());
        if !listed {
            return None;
        }
        self.accounts.get(user)
    }
}

/// Parse an OpenSSH `authorized_keys` file. Unparseable lines are skipped.
pub fn load_authorized_keys(path: &Path) -> Result<Vec<PublicKey>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_authorized_keys(&text))
}

fn parse_authorized_keys(text: &str) -> Vec<PublicKey> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match PublicKey::from_openssh(line) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Skipping authorized_keys line: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::keys::{Algorithm, PrivateKey};

    fn account(user: &str, password: Option<&str>) -> Account {
        Account {
            username: user.to_string(),
            password: password.map(str::to_string),
            bucket: format!("{user}-bucket"),
        }
    }

    fn random_key() -> PublicKey {
        PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone()
    }

    #[test]
    fn test_password_login() {
        let auth = Authenticator::new(
            vec![account("amy", Some("pw")), account("keyonly", None)],
            Vec::new(),
        );
        assert_eq!(auth.check_password("amy", "pw").unwrap().bucket, "amy-bucket");
        assert!(auth.check_password("amy", "wrong").is_none());
        assert!(auth.check_password("nobody", "pw").is_none());
        assert!(auth.check_password("keyonly", "").is_none());
    }

    #[test]
    fn test_public_key_login() {
        let listed = random_key();
        let other = random_key();
        let auth = Authenticator::new(vec![account("amy", None)], vec![listed.clone()]);

        assert!(auth.check_public_key("amy", &listed).is_some());
        assert!(auth.check_public_key("amy", &other).is_none());
        assert!(auth.check_public_key("nobody", &listed).is_none());
    }

    #[test]
    fn test_parse_authorized_keys_ignores_comments_and_junk() {
        let key = random_key();
        let line = key.to_openssh().unwrap();
        let text = format!("# comment\n\n{line}\nnot-a-key at all\n");

        let keys = parse_authorized_keys(&text);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key_data(), key.key_data());
    }
}
