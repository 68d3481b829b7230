//! Miner settings storage
//!
//! Stores configuration like API keys and service endpoints in a JSON file in
//! the user's config directory. Every field has a default, so a missing or
//! partial file is fine. Environment variables take precedence over stored keys.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MinerError, Result};
use crate::model::TableCategory;
use crate::papers::study_index::DEFAULT_STUDY_KEYWORDS;
use crate::papers::BROWSER_USER_AGENT;
use crate::tables::DEFAULT_CAPTION_MARKER;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const NCBI_API_KEY_ENV: &str = "NCBI_API_KEY";
pub const MIRROR_URL_ENV: &str = "EVIDENCE_MINER_MIRROR_URL";
pub const SCHOLAR_URL_ENV: &str = "EVIDENCE_MINER_SCHOLAR_URL";

/// Chat-completions backend used for classification and extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Substring that marks a caption line in supplement PDFs
    #[serde(default = "default_caption_marker")]
    pub caption_marker: String,
    /// Table categories mined from every document
    #[serde(default = "default_categories")]
    pub categories: Vec<TableCategory>,
    /// Caption and heading words that mark included studies
    #[serde(default = "default_study_keywords")]
    pub study_keywords: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub document_concurrency: usize,
    #[serde(default = "default_concurrency")]
    pub citation_concurrency: usize,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_repository_base_url")]
    pub repository_base_url: String,
    #[serde(default = "default_eutils_base_url")]
    pub eutils_base_url: String,
    #[serde(default = "default_doi_resolver_base_url")]
    pub doi_resolver_base_url: String,
    /// Mirror step is skipped when unset
    #[serde(default)]
    pub mirror_base_url: Option<String>,
    /// Scholar search step is skipped when unset
    #[serde(default)]
    pub scholar_base_url: Option<String>,
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    #[serde(default)]
    pub llm: LlmSettings,
}

fn default_caption_marker() -> String {
    DEFAULT_CAPTION_MARKER.to_string()
}

fn default_categories() -> Vec<TableCategory> {
    vec![TableCategory::QualityAssessment, TableCategory::SearchStrategy]
}

fn default_study_keywords() -> Vec<String> {
    DEFAULT_STUDY_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_concurrency() -> usize {
    4
}

fn default_http_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

fn default_repository_base_url() -> String {
    "https://www.ncbi.nlm.nih.gov".to_string()
}

fn default_eutils_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_doi_resolver_base_url() -> String {
    "https://doi.org".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            caption_marker: default_caption_marker(),
            categories: default_categories(),
            study_keywords: default_study_keywords(),
            document_concurrency: default_concurrency(),
            citation_concurrency: default_concurrency(),
            http_timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
            repository_base_url: default_repository_base_url(),
            eutils_base_url: default_eutils_base_url(),
            doi_resolver_base_url: default_doi_resolver_base_url(),
            mirror_base_url: None,
            scholar_base_url: None,
            ncbi_api_key: None,
            llm: LlmSettings::default(),
        }
    }
}

/// `{config_dir}/evidence-miner/settings.json`, when the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("evidence-miner").join("settings.json"))
}

/// Non-empty value of an environment variable
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Load settings from disk, falling back to defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match Self::read(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unusable settings file, using defaults");
                Settings::default()
            }
        }
    }

    /// Load settings from disk, reporting unreadable or invalid files
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides on top of stored values
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_value(OPENAI_API_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = env_value(NCBI_API_KEY_ENV) {
            self.ncbi_api_key = Some(key);
        }
        if let Some(url) = env_value(MIRROR_URL_ENV) {
            self.mirror_base_url = Some(url);
        }
        if let Some(url) = env_value(SCHOLAR_URL_ENV) {
            self.scholar_base_url = Some(url);
        }
        self
    }

    /// Reject values the miner cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.caption_marker.trim().is_empty() {
            return Err(MinerError::Config("caption_marker must not be empty".to_string()));
        }
        if self.document_concurrency == 0 || self.citation_concurrency == 0 {
            return Err(MinerError::Config("concurrency must be at least 1".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(MinerError::Config("http_timeout_secs must be at least 1".to_string()));
        }
        for (name, value) in [
            ("repository_base_url", Some(&self.repository_base_url)),
            ("eutils_base_url", Some(&self.eutils_base_url)),
            ("doi_resolver_base_url", Some(&self.doi_resolver_base_url)),
            ("mirror_base_url", self.mirror_base_url.as_ref()),
            ("scholar_base_url", self.scholar_base_url.as_ref()),
            ("llm.base_url", Some(&self.llm.base_url)),
        ] {
            if let Some(value) = value {
                url::Url::parse(value)
                    .map_err(|e| MinerError::Config(format!("{}: {}", name, e)))?;
            }
        }
        Ok(())
    }

    /// LLM key if one is configured
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Masked LLM key for display (shows first 8 and last 4 chars)
    pub fn masked_llm_api_key(&self) -> Option<String> {
        self.llm_api_key().map(|key| {
            if key.len() > 12 {
                format!("{}...{}", &key[..8], &key[key.len() - 4..])
            } else {
                "*".repeat(key.len())
            }
        })
    }
}
