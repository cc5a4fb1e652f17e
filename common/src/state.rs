use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Credential record produced by a successful login and consumed by the
/// report proxy as its downstream Basic-auth pair.
///
/// The token key has shipped under two casings across server generations;
/// loads accept both, stores always write the camel-cased form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthState {
    pub dsid: String,
    #[serde(rename = "searchPartyToken", alias = "searchpartytoken")]
    pub search_party_token: String,
}

pub fn load(path: &Path) -> Result<Option<AuthState>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read auth state {}", path.display()))?;
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("parse auth state {}", path.display()))?;
    Ok(Some(state))
}

pub fn store(path: &Path, state: &AuthState) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create state dir {}", dir.display()))?;
        }
    }
    let raw = serde_json::to_string_pretty(state).context("serialize auth state")?;
    std::fs::write(path, raw).with_context(|| format!("write auth state {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_accepts_both_token_casings() {
        let camel: AuthState =
            serde_json::from_str(r#"{"dsid":"123","searchPartyToken":"tok"}"#).unwrap();
        let lower: AuthState =
            serde_json::from_str(r#"{"dsid":"123","searchpartytoken":"tok"}"#).unwrap();
        assert_eq!(camel, lower);
        assert_eq!(camel.search_party_token, "tok");
    }

    #[test]
    fn store_writes_camel_cased_key() {
        let state = AuthState {
            dsid: "123".into(),
            search_party_token: "tok".into(),
        };
        let raw = serde_json::to_string(&state).unwrap();
        assert!(raw.contains("searchPartyToken"));
        assert!(!raw.contains("searchpartytoken"));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join("hayloft-state-test");
        let path = dir.join("auth.json");
        let state = AuthState {
            dsid: "8274".into(),
            search_party_token: "abc==".into(),
        };
        store(&path, &state).unwrap();
        assert_eq!(load(&path).unwrap(), Some(state));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_is_none() {
        let path = Path::new("/nonexistent/hayloft/auth.json");
        assert_eq!(load(path).unwrap(), None);
    }
}
