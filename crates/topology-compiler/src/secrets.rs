//! Per-site credential generation
//!
//! Secrets come from the operating system's CSPRNG. A site's credential is
//! generated exactly once, when the site is created; redeploys reuse it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ddeployer_common::{Credential, SiteKind, WordPressSalts};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use rand::RngCore;

const DATABASE_PASSWORD_LEN: usize = 24;
const WORDPRESS_SALT_LEN: usize = 64;
const APP_KEY_BYTES: usize = 32;

/// Generates the secret material a new site needs
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialGenerator;

impl CredentialGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, kind: SiteKind, database_requested: bool) -> Credential {
        let mut credential = Credential::default();

        if database_requested {
            credential.database_password = Some(random_string(DATABASE_PASSWORD_LEN));
            credential.database_root_password = Some(random_string(DATABASE_PASSWORD_LEN));
        }

        match kind {
            SiteKind::WordPress => {
                credential.wordpress = Some(WordPressSalts {
                    auth_key: random_string(WORDPRESS_SALT_LEN),
                    secure_auth_key: random_string(WORDPRESS_SALT_LEN),
                    logged_in_key: random_string(WORDPRESS_SALT_LEN),
                    nonce_key: random_string(WORDPRESS_SALT_LEN),
                    auth_salt: random_string(WORDPRESS_SALT_LEN),
                    secure_auth_salt: random_string(WORDPRESS_SALT_LEN),
                    logged_in_salt: random_string(WORDPRESS_SALT_LEN),
                    nonce_salt: random_string(WORDPRESS_SALT_LEN),
                });
            }
            SiteKind::Laravel => {
                let mut key = [0u8; APP_KEY_BYTES];
                OsRng.fill_bytes(&mut key);
                credential.app_key = Some(format!("base64:{}", STANDARD.encode(key)));
            }
            SiteKind::GenericPhp => {}
        }

        credential
    }
}

fn random_string(len: usize) -> String {
    Alphanumeric.sample_string(&mut OsRng, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wordpress_with_database() {
        let credential = CredentialGenerator::new().generate(SiteKind::WordPress, true);

        let password = credential.database_password.as_ref().unwrap();
        assert_eq!(password.len(), DATABASE_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(credential.database_root_password.as_ref(), Some(password));

        let salts = credential.wordpress.as_ref().unwrap();
        let values: HashSet<&str> = salts.entries().iter().map(|(_, v)| *v).collect();
        assert_eq!(values.len(), 8, "salts must be independent");
        assert!(values.iter().all(|v| v.len() == WORDPRESS_SALT_LEN));
        assert!(credential.app_key.is_none());
    }

    #[test]
    fn test_laravel_app_key() {
        let credential = CredentialGenerator::new().generate(SiteKind::Laravel, false);

        assert!(credential.database_password.is_none());
        let key = credential.app_key.unwrap();
        let encoded = key.strip_prefix("base64:").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap().len(), APP_KEY_BYTES);
    }

    #[test]
    fn test_generic_php_without_database_has_no_secrets() {
        let credential = CredentialGenerator::new().generate(SiteKind::GenericPhp, false);
        assert_eq!(credential, Credential::default());
    }

    #[test]
    fn test_database_passwords_do_not_repeat() {
        let generator = CredentialGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let password = generator
                .generate(SiteKind::GenericPhp, true)
                .database_password
                .unwrap();
            assert!(seen.insert(password), "duplicate database password generated");
        }
    }
}
