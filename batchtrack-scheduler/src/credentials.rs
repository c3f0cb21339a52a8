//! Job credentials
//!
//! Jobs need a GitHub token (required) and a Hugging Face token (optional).
//! Both are opaque here: they are loaded, forwarded to the job environment,
//! and never logged or printed.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::CredentialError;

pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const HF_TOKEN: &str = "HF_TOKEN";

/// Tokens forwarded to every submitted job
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    github_token: String,
    hf_token: Option<String>,
}

impl Credentials {
    pub fn new(github_token: String, hf_token: Option<String>) -> Self {
        Self {
            github_token,
            hf_token,
        }
    }

    /// Environment variables to set on the submitted job
    pub fn into_env(self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(GITHUB_TOKEN.to_string(), self.github_token);
        if let Some(hf) = self.hf_token {
            env.insert(HF_TOKEN.to_string(), hf);
        }
        env
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &"<redacted>")
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of job credentials
pub trait CredentialLoader: Send + Sync {
    /// Loads the credentials, failing if a required one is unavailable
    fn load(&self) -> Result<Credentials, CredentialError>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables
pub struct EnvCredentialLoader {
    lookup: Lookup,
}

impl EnvCredentialLoader {
    /// Loader backed by the process environment
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Loader backed by an arbitrary key lookup
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Default for EnvCredentialLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialLoader for EnvCredentialLoader {
    fn load(&self) -> Result<Credentials, CredentialError> {
        let github_token = self
            .read(GITHUB_TOKEN)
            .ok_or(CredentialError::Missing(GITHUB_TOKEN))?;

        let hf_token = self.read(HF_TOKEN);
        if hf_token.is_none() {
            warn!("{} not set; jobs needing model downloads may fail", HF_TOKEN);
        }

        let credentials = Credentials::new(github_token, hf_token);
        info!(
            "Loaded {} credential(s)",
            if credentials.hf_token.is_some() { 2 } else { 1 }
        );
        Ok(credentials)
    }
}
