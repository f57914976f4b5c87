use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::filter::DEFAULT_ALLOWED_REQUESTS;

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub bind_addr: String,
    pub target_url: String,
    pub max_message_bytes: usize,
    pub allowed_requests: Vec<String>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// Certificate chain and private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlsSettingsError {
    #[error("cert_path is set without key_path")]
    MissingKey,
    #[error("key_path is set without cert_path")]
    MissingCert,
}

impl ProxySettings {
    /// `None` serves plain websockets.
    pub fn tls_files(&self) -> Result<Option<TlsFiles>, TlsSettingsError> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Ok(Some(TlsFiles {
                cert: cert.clone(),
                key: key.clone(),
            })),
            (Some(_), None) => Err(TlsSettingsError::MissingKey),
            (None, Some(_)) => Err(TlsSettingsError::MissingCert),
            (None, None) => Ok(None),
        }
    }
}

/// Where acme.sh keeps the ECC certificate it issued for `domain`.
pub fn acme_files(home: &Path, domain: &str) -> TlsFiles {
    let dir = home.join(".acme.sh").join(format!("{domain}_ecc"));
    TlsFiles {
        cert: dir.join("fullchain.cer"),
        key: dir.join(format!("{domain}.key")),
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4445".into(),
            target_url: "ws://localhost:4455".into(),
            max_message_bytes: 10 * 1024 * 1024,
            allowed_requests: DEFAULT_ALLOWED_REQUESTS
                .iter()
                .map(|request| request.to_string())
                .collect(),
            cert_path: None,
            key_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    target_url: Option<String>,
    max_message_bytes: Option<usize>,
    allowed_requests: Option<Vec<String>>,
    ssl_domain: Option<String>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
}

pub fn load_settings() -> ProxySettings {
    load_settings_from(Path::new("proxy.toml"), |key| std::env::var(key).ok())
}

/// `path` overrides the defaults, the environment overrides both. An
/// explicit certificate or key wins over one found through `ssl_domain`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ProxySettings {
    let mut settings = ProxySettings::default();
    let mut ssl_domain = None;

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.bind_addr = v;
                }
                if let Some(v) = file_cfg.target_url {
                    settings.target_url = v;
                }
                if let Some(v) = file_cfg.max_message_bytes {
                    settings.max_message_bytes = v;
                }
                if let Some(v) = file_cfg.allowed_requests {
                    settings.allowed_requests = v;
                }
                ssl_domain = file_cfg.ssl_domain;
                settings.cert_path = file_cfg.cert_path;
                settings.key_path = file_cfg.key_path;
            }
            Err(error) => warn!(path = %path.display(), %error, "ignoring invalid proxy config"),
        }
    }

    if let Some(v) = env("PROXY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Some(v) = env("PROXY_TARGET") {
        settings.target_url = v;
    }
    if let Some(v) = env("APP__TARGET_URL") {
        settings.target_url = v;
    }

    if let Some(v) = env("APP__MAX_MESSAGE_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_message_bytes = parsed;
        }
    }

    if let Some(v) = env("APP__SSL_DOMAIN") {
        ssl_domain = Some(v);
    }
    if let Some(domain) = ssl_domain.filter(|domain| !domain.is_empty()) {
        match env("HOME") {
            Some(home) => {
                let acme = acme_files(Path::new(&home), &domain);
                settings.cert_path.get_or_insert(acme.cert);
                settings.key_path.get_or_insert(acme.key);
            }
            None => warn!(domain = %domain, "HOME is not set, cannot find acme.sh certificates"),
        }
    }
    if let Some(v) = env("APP__CERT_PATH") {
        settings.cert_path = Some(v.into());
    }
    if let Some(v) = env("APP__KEY_PATH") {
        settings.key_path = Some(v.into());
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
