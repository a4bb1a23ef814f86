//! Application configuration.
//!
//! Settings come from three layers: built-in defaults, environment variables
//! (a `.env` file is honored), and an optional `config.json` in the data
//! directory. The file layer wins so a repo-local config can pin values
//! without touching the shell environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the whole application.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub llm_model: String,
    pub llm_base_url: String,
    #[serde(skip_serializing)]
    pub llm_api_key: Option<String>,

    pub image_model: String,
    pub image_base_url: String,
    #[serde(skip_serializing)]
    pub image_api_key: Option<String>,

    /// Tavily key; search is skipped entirely when absent.
    #[serde(skip_serializing)]
    pub search_api_key: Option<String>,
    pub search_enabled: bool,

    /// Session cookie override; when set, login is skipped.
    #[serde(skip_serializing)]
    pub xhs_cookie: Option<String>,

    /// Content category; `auto` lets the LLM pick one per theme.
    pub category: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_model: "deepseek-chat".to_string(),
            llm_base_url: "https://api.deepseek.com".to_string(),
            llm_api_key: None,
            image_model: "cogview-3-plus".to_string(),
            image_base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            image_api_key: None,
            search_api_key: None,
            search_enabled: true,
            xhs_cookie: None,
            category: "auto".to_string(),
        }
    }
}

/// Partial config as read from `config.json`; absent and null fields leave
/// the current value untouched.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    llm_model: Option<String>,
    llm_base_url: Option<String>,
    llm_api_key: Option<String>,
    image_model: Option<String>,
    image_base_url: Option<String>,
    image_api_key: Option<String>,
    search_api_key: Option<String>,
    search_enabled: Option<bool>,
    xhs_cookie: Option<String>,
    category: Option<String>,
}

impl AppConfig {
    /// Load configuration: defaults, then environment, then `config.json`
    /// under `data_dir` when present.
    pub fn load(data_dir: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env();
        config.apply_file(&data_dir.join("config.json"))?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        let take = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = take("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = take("LLM_BASE_URL") {
            self.llm_base_url = v;
        }
        self.llm_api_key = take("LLM_API_KEY").or(self.llm_api_key.take());

        if let Some(v) = take("IMAGE_MODEL") {
            self.image_model = v;
        }
        if let Some(v) = take("IMAGE_BASE_URL") {
            self.image_base_url = v;
        }
        self.image_api_key = take("IMAGE_API_KEY").or(self.image_api_key.take());

        self.search_api_key = take("SEARCH_API_KEY").or(self.search_api_key.take());
        if let Some(v) = take("SEARCH_ENABLED") {
            self.search_enabled = v.eq_ignore_ascii_case("true");
        }

        self.xhs_cookie = take("XHS_COOKIE").or(self.xhs_cookie.take());
        if let Some(v) = take("CATEGORY") {
            self.category = v;
        }
    }

    /// Overlay values from a JSON config file. A missing file is fine; a
    /// malformed one is an error rather than a silent fallback.
    fn apply_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        if let Some(v) = file.llm_model {
            self.llm_model = v;
        }
        if let Some(v) = file.llm_base_url {
            self.llm_base_url = v;
        }
        if let Some(v) = file.llm_api_key {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = file.image_model {
            self.image_model = v;
        }
        if let Some(v) = file.image_base_url {
            self.image_base_url = v;
        }
        if let Some(v) = file.image_api_key {
            self.image_api_key = Some(v);
        }
        if let Some(v) = file.search_api_key {
            self.search_api_key = Some(v);
        }
        if let Some(v) = file.search_enabled {
            self.search_enabled = v;
        }
        if let Some(v) = file.xhs_cookie {
            self.xhs_cookie = Some(v);
        }
        if let Some(v) = file.category {
            self.category = v;
        }
        Ok(())
    }

    /// Persist the non-sensitive settings to `config.json`. API keys and
    /// cookies never land on disk here.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("config.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
