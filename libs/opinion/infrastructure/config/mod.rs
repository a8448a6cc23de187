//! Account configuration loading
//!
//! Accounts come from plain-text files, one per line:
//!
//! ```text
//! remark api_key eoa_address private_key [proxy_address]
//! ```
//!
//! Separators may be `|`, spaces, or tabs, mixed freely. Missing proxy
//! addresses are resolved from the venue profile endpoint and cached to a
//! JSON file keyed by lowercased EOA address. The cache is an injected
//! handle, never module state.

use crate::infrastructure::client::rest::{fetch_proxy_address, DEFAULT_CHAIN_ID};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config directory not found: {0}")]
    MissingDirectory(String),

    #[error("no accounts loaded from {0}")]
    Empty(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One funded account: identity plus signing material.
#[derive(Clone)]
pub struct AccountConfig {
    pub remark: String,
    pub api_key: String,
    pub eoa_address: String,
    pub private_key: String,
    pub proxy_address: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("remark", &self.remark)
            .field("eoa_address", &mask_address(&self.eoa_address))
            .field("proxy_address", &self.proxy_address.as_deref().map(mask_address))
            .finish()
    }
}

/// Hide the middle of an address or key for logging.
pub fn mask_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// On-disk cache of resolved proxy addresses, keyed by lowercased EOA.
pub struct ProxyCache {
    path: PathBuf,
}

impl ProxyCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn get(&self, eoa_address: &str) -> Option<String> {
        self.load().get(&eoa_address.to_lowercase()).cloned()
    }

    pub fn insert(&self, eoa_address: &str, proxy_address: &str) {
        let mut cache = self.load();
        cache.insert(eoa_address.to_lowercase(), proxy_address.to_string());
        if let Ok(text) = serde_json::to_string_pretty(&cache) {
            if let Err(e) = std::fs::write(&self.path, text) {
                warn!(error = %e, "failed to persist proxy cache");
            }
        }
    }
}

/// Split one config line on `|`, spaces and tabs, mixed.
fn parse_line(line: &str) -> Vec<String> {
    line.split('|')
        .flat_map(|part| part.split_whitespace())
        .map(str::to_string)
        .collect()
}

fn looks_like_address(s: &str) -> bool {
    s.starts_with("0x") && s.len() == 42
}

/// Parse the account lines of one file. Malformed lines are skipped with a
/// warning; proxy addresses are not resolved here.
pub fn parse_accounts(content: &str, source: &str) -> Vec<AccountConfig> {
    let mut accounts = Vec::new();
    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = parse_line(line);
        if fields.len() < 4 {
            warn!(
                source,
                line = line_no + 1,
                fields = fields.len(),
                "skipping malformed account line (need remark api_key eoa private_key [proxy])"
            );
            continue;
        }
        let proxy_address = fields
            .get(4)
            .filter(|f| looks_like_address(f.as_str()))
            .cloned();
        accounts.push(AccountConfig {
            remark: fields[0].clone(),
            api_key: fields[1].clone(),
            eoa_address: fields[2].clone(),
            private_key: fields[3].clone(),
            proxy_address,
        });
    }
    accounts
}

/// Load accounts from one file and resolve missing proxy addresses through
/// the cache, then the profile endpoint.
pub async fn load_accounts(
    path: impl AsRef<Path>,
    cache: &ProxyCache,
    base_url: &str,
) -> Result<Vec<AccountConfig>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let mut accounts = parse_accounts(&content, &path.display().to_string());
    resolve_proxies(&mut accounts, cache, base_url).await;
    if accounts.is_empty() {
        return Err(ConfigError::Empty(path.display().to_string()));
    }
    info!(count = accounts.len(), path = %path.display(), "accounts loaded");
    Ok(accounts)
}

/// Load every `*.txt` / `*.conf` / `*.cfg` in a directory, skipping files
/// whose name starts with `.` or `_`.
pub async fn load_accounts_from_dir(
    dir: impl AsRef<Path>,
    cache: &ProxyCache,
    base_url: &str,
) -> Result<Vec<AccountConfig>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory(dir.display().to_string()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if name.starts_with('.') || name.starts_with('_') {
                return false;
            }
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("conf") | Some("cfg")
            )
        })
        .collect();
    files.sort();

    let mut all = Vec::new();
    for file in files {
        match load_accounts(&file, cache, base_url).await {
            Ok(accounts) => all.extend(accounts),
            Err(ConfigError::Empty(_)) => {}
            Err(e) => warn!(path = %file.display(), error = %e, "account file failed to load"),
        }
    }
    if all.is_empty() {
        return Err(ConfigError::Empty(dir.display().to_string()));
    }
    Ok(all)
}

async fn resolve_proxies(accounts: &mut [AccountConfig], cache: &ProxyCache, base_url: &str) {
    let http = reqwest::Client::new();
    for account in accounts.iter_mut().filter(|a| a.proxy_address.is_none()) {
        if let Some(cached) = cache.get(&account.eoa_address) {
            account.proxy_address = Some(cached);
            continue;
        }
        match fetch_proxy_address(&http, base_url, &account.eoa_address, DEFAULT_CHAIN_ID).await {
            Ok(Some(proxy)) => {
                cache.insert(&account.eoa_address, &proxy);
                info!(
                    remark = %account.remark,
                    proxy = %mask_address(&proxy),
                    "proxy address resolved"
                );
                account.proxy_address = Some(proxy);
            }
            Ok(None) => warn!(remark = %account.remark, "no proxy address on profile"),
            Err(e) => warn!(remark = %account.remark, error = %e, "proxy address lookup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_mixed_separators() {
        assert_eq!(
            parse_line("acc1|key  0xabc\tpriv"),
            vec!["acc1", "key", "0xabc", "priv"]
        );
    }

    #[test]
    fn test_parse_accounts_field_counts() {
        let proxy = format!("0x{}", "b".repeat(40));
        let content = format!(
            "# comment\n\
             acc1 key1 0xeoa1 priv1\n\
             acc2|key2|0xeoa2|priv2|{proxy}\n\
             acc3 key3 0xeoa3 priv3 not-an-address\n\
             short line\n"
        );
        let accounts = parse_accounts(&content, "test");
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts[0].remark, "acc1");
        assert_eq!(accounts[0].proxy_address, None);
        assert_eq!(accounts[1].proxy_address, Some(proxy));
        // Fifth field that is not an address is ignored.
        assert_eq!(accounts[2].proxy_address, None);
    }

    #[test]
    fn test_proxy_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProxyCache::new(dir.path().join("proxy_cache.json"));
        assert_eq!(cache.get("0xABCDEF"), None);
        cache.insert("0xABCDEF", "0xproxy");
        // Keys are lowercased on both paths.
        assert_eq!(cache.get("0xabcdef"), Some("0xproxy".to_string()));
        assert_eq!(cache.get("0xABCDEF"), Some("0xproxy".to_string()));
    }

    #[test]
    fn test_debug_masks_material() {
        let account = AccountConfig {
            remark: "a1".into(),
            api_key: "secret-key".into(),
            eoa_address: format!("0x{}", "c".repeat(40)),
            private_key: "deadbeef".repeat(8),
            proxy_address: None,
        };
        let debug = format!("{:?}", account);
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("deadbeef"));
    }
}
