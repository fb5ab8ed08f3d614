//! Generated secret material owned by a site
//!
//! Values are produced once when the site is created and persisted alongside
//! the descriptor. `Debug` never prints them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight WordPress authentication keys and salts
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPressSalts {
    pub auth_key: String,
    pub secure_auth_key: String,
    pub logged_in_key: String,
    pub nonce_key: String,
    pub auth_salt: String,
    pub secure_auth_salt: String,
    pub logged_in_salt: String,
    pub nonce_salt: String,
}

impl WordPressSalts {
    /// Pairs of (environment suffix, value), in wp-config order.
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("AUTH_KEY", self.auth_key.as_str()),
            ("SECURE_AUTH_KEY", self.secure_auth_key.as_str()),
            ("LOGGED_IN_KEY", self.logged_in_key.as_str()),
            ("NONCE_KEY", self.nonce_key.as_str()),
            ("AUTH_SALT", self.auth_salt.as_str()),
            ("SECURE_AUTH_SALT", self.secure_auth_salt.as_str()),
            ("LOGGED_IN_SALT", self.logged_in_salt.as_str()),
            ("NONCE_SALT", self.nonce_salt.as_str()),
        ]
    }
}

impl fmt::Debug for WordPressSalts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WordPressSalts(<redacted>)")
    }
}

/// Secrets generated for one site
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Password of the site's database user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_password: Option<String>,

    /// Password of the database root account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_root_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordpress: Option<WordPressSalts>,

    /// Laravel `APP_KEY`, already prefixed with `base64:`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}

/// Prints whether a secret is set, never its value.
struct Masked(bool);

impl fmt::Debug for Masked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "<redacted>" } else { "<none>" })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("database_password", &Masked(self.database_password.is_some()))
            .field(
                "database_root_password",
                &Masked(self.database_root_password.is_some()),
            )
            .field("wordpress", &Masked(self.wordpress.is_some()))
            .field("app_key", &Masked(self.app_key.is_some()))
            .finish()
    }
}
