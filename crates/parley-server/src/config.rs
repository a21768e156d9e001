use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use parley_chat::ChatConfig;
use parley_chat::lifecycle::DEFAULT_MAX_BODY_LEN;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    /// Apply schema migrations at startup. Off when the schema is owned by
    /// the main application.
    pub run_migrations: bool,
    pub upload_root: PathBuf,
    pub chat: ChatConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder; it must match the main application's secret");
        }

        let host = var("PARLEY_HOST", "0.0.0.0");
        let port: u16 = var("PARLEY_PORT", "3000")
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let run_migrations = match var("PARLEY_RUN_MIGRATIONS", "true").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => bail!("PARLEY_RUN_MIGRATIONS must be true or false, got {other}"),
        };

        let max_body_len: usize = match lookup("PARLEY_MAX_MESSAGE_LEN") {
            Some(raw) => raw.parse().context("PARLEY_MAX_MESSAGE_LEN must be a positive integer")?,
            None => DEFAULT_MAX_BODY_LEN,
        };
        if max_body_len == 0 {
            bail!("PARLEY_MAX_MESSAGE_LEN must be a positive integer");
        }

        let defaults = ChatConfig::default();
        Ok(Self {
            jwt_secret,
            db_path: var("PARLEY_DB_PATH", "parley.db").into(),
            addr,
            run_migrations,
            upload_root: var("PARLEY_UPLOAD_ROOT", ".").into(),
            chat: ChatConfig {
                secure_file_base: lookup("PARLEY_SECURE_FILE_BASE").unwrap_or(defaults.secure_file_base),
                chat_link: lookup("PARLEY_CHAT_LINK").unwrap_or(defaults.chat_link),
                max_body_len,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("PARLEY_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert!(config.run_migrations);
        assert_eq!(config.chat.secure_file_base, "/api/secure_file.php");
        assert_eq!(config.chat.max_body_len, 5000);
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PARLEY_JWT_SECRET", "s3cret"),
            ("PARLEY_HOST", "127.0.0.1"),
            ("PARLEY_PORT", "8081"),
            ("PARLEY_RUN_MIGRATIONS", "off"),
            ("PARLEY_MAX_MESSAGE_LEN", "200"),
            ("PARLEY_SECURE_FILE_BASE", "/files/get"),
        ])
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8081".parse().unwrap());
        assert!(!config.run_migrations);
        assert_eq!(config.chat.max_body_len, 200);
        assert_eq!(config.chat.secure_file_base, "/files/get");
    }

    #[test]
    fn bad_numbers_fail() {
        assert!(load(&[("PARLEY_JWT_SECRET", "s"), ("PARLEY_PORT", "http")]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "s"), ("PARLEY_MAX_MESSAGE_LEN", "0")]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "s"), ("PARLEY_RUN_MIGRATIONS", "maybe")]).is_err());
    }
}
