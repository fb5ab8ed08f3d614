//! Layered environment assembly for the app service
//!
//! Layers are applied in a fixed order. A later layer may add keys but never
//! replace one an earlier layer defined.

use ddeployer_common::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct LayeredEnvironment {
    vars: BTreeMap<String, String>,
    origins: BTreeMap<String, String>,
}

impl LayeredEnvironment {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add every entry of `layer`, failing on the first key already owned by another layer.
    pub(crate) fn layer<K, V, I>(&mut self, layer: &str, entries: I) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            let key = key.into();
            if let Some(first) = self.origins.get(&key) {
                return Err(Error::ConfigConflict {
                    key,
                    first: first.clone(),
                    second: layer.to_string(),
                });
            }
            self.origins.insert(key.clone(), layer.to_string());
            self.vars.insert(key, value.into());
        }
        Ok(())
    }

    pub(crate) fn into_vars(self) -> BTreeMap<String, String> {
        self.vars
    }
}

/// Environment variable names the operator may set.
pub(crate) fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_accumulate() {
        let mut env = LayeredEnvironment::new();
        env.layer("database", [("DB_HOST", "db")]).unwrap();
        env.layer("cache", [("REDIS_HOST", "redis")]).unwrap();

        let vars = env.into_vars();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["DB_HOST"], "db");
    }

    #[test]
    fn test_collision_names_both_layers() {
        let mut env = LayeredEnvironment::new();
        env.layer("database", [("DB_HOST", "db")]).unwrap();

        let err = env.layer("operator", [("DB_HOST", "elsewhere")]).unwrap_err();
        match err {
            Error::ConfigConflict { key, first, second } => {
                assert_eq!(key, "DB_HOST");
                assert_eq!(first, "database");
                assert_eq!(second, "operator");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_key_syntax() {
        assert!(is_valid_env_key("APP_TIMEZONE"));
        assert!(is_valid_env_key("_private"));
        assert!(!is_valid_env_key("1ABC"));
        assert!(!is_valid_env_key("WITH-DASH"));
        assert!(!is_valid_env_key(""));
    }
}
