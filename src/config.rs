use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Everything the CLI needs, read once at startup.
///
/// Values come from `config.toml` (all keys optional), then environment
/// variables override individual fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub browser: BrowserSettings,
    pub search: SearchSettings,
    pub generation: GenerationSettings,
    pub scrub: ScrubSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// WebDriver endpoint, usually a local `chromedriver`.
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    /// Seconds to wait after navigation, drawn uniformly from `[min, max]`.
    pub page_wait_secs: [f64; 2],
    /// Seconds to pause between cards, drawn uniformly from `[min, max]`.
    pub card_pause_secs: [f64; 2],
    /// Where to dump the rendered page when no job cards are found.
    pub debug_dump: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_wait_secs: [4.0, 7.0],
            card_pause_secs: [0.5, 2.0],
            debug_dump: Some(PathBuf::from("debug_page.html")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub location: String,
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            location: "remote".to_string(),
            max_results: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Absent key means letters are template-only.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 800,
            temperature: 0.2,
        }
    }
}

/// Literal strings that must never reach the user from generated text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrubSettings {
    pub terms: Vec<ScrubTerm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScrubTerm {
    pub term: String,
    #[serde(default)]
    pub field: ScrubField,
}

/// Which applicant field a scrubbed literal stands in for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrubField {
    Name,
    Email,
    Phone,
    #[default]
    Other,
}

impl Settings {
    /// Load from `path`, or from the default config location when `path` is
    /// `None`. A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.generation.api_key = Some(key.trim().to_string());
        }
        if let Some(model) = lookup("JOBHUNT_MODEL") {
            self.generation.model = model;
        }
        if let Some(db) = lookup("JOBHUNT_DB") {
            self.database.path = Some(PathBuf::from(db));
        }
        if let Some(url) = lookup("JOBHUNT_WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Some(terms) = lookup("JOBHUNT_SCRUB_TERMS") {
            for term in terms.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                self.scrub.terms.push(ScrubTerm {
                    term: term.to_string(),
                    field: ScrubField::Other,
                });
            }
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "jobhunt")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn default_database_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobhunt") {
        proj_dirs.data_dir().join("jobs.db")
    } else {
        PathBuf::from("jobs.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.search.max_results, 10);
        assert_eq!(settings.search.location, "remote");
        assert_eq!(settings.browser.page_wait_secs, [4.0, 7.0]);
        assert!(settings.browser.headless);
        assert!(settings.generation.api_key.is_none());
        assert!(settings.scrub.terms.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let raw = r#"
            [browser]
            webdriver_url = "http://chromedriver:4444"
            card_pause_secs = [0.0, 0.0]

            [generation]
            model = "gpt-4o-mini"

            [[scrub.terms]]
            term = "Jane Roe"
            field = "name"

            [[scrub.terms]]
            term = "Acme Secret Project"
        "#;
        let settings = Settings::from_toml_str(raw).unwrap();
        assert_eq!(settings.browser.webdriver_url, "http://chromedriver:4444");
        assert_eq!(settings.browser.card_pause_secs, [0.0, 0.0]);
        assert_eq!(settings.browser.page_wait_secs, [4.0, 7.0]);
        assert_eq!(settings.generation.model, "gpt-4o-mini");
        assert_eq!(settings.generation.max_tokens, 800);
        assert_eq!(
            settings.scrub.terms,
            vec![
                ScrubTerm { term: "Jane Roe".to_string(), field: ScrubField::Name },
                ScrubTerm { term: "Acme Secret Project".to_string(), field: ScrubField::Other },
            ]
        );
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", " sk-test "),
            ("JOBHUNT_DB", "/tmp/jobs-test.db"),
            ("JOBHUNT_SCRUB_TERMS", "foo@example.com, , Bar"),
            ("JOBHUNT_MODEL", ""),
        ]);
        let mut settings = Settings::default();
        settings.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/jobs-test.db"));
        // empty values are ignored
        assert_eq!(settings.generation.model, "gpt-3.5-turbo");
        let terms: Vec<_> = settings.scrub.terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["foo@example.com", "Bar"]);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[search]\nmax_results = 25\n").unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.search.max_results, 25);
    }
}
