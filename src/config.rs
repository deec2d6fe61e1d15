use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::NumberFormatOptions;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub formatting: FormattingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base of the report, chat and URL endpoints.
    pub api_url: String,
    /// Base of the scrape / index / ingest endpoints.
    pub pipeline_url: String,
    pub research_url: String,
    /// Zero disables the request timeout.
    #[serde(default)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    pub settle_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatConfig {
    pub max_input_rows: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormattingConfig {
    pub number_comma: bool,
    pub locale: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://vocsentimentapi.azurewebsites.net/api".to_string(),
            pipeline_url: "http://localhost:5103/api".to_string(),
            research_url: "https://app-pdt223-qaipe.azurewebsites.net/".to_string(),
            timeout_seconds: 0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { max_input_rows: 8 }
    }
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            number_comma: true,
            locale: "en".to_string(),
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".vocscope.toml"))
    }

    /// `Ok(None)` when there is no config file yet.
    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;
        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read config file {}", config_path.display())
                });
            }
        };

        toml::from_str(&content)
            .map(Some)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.server.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.pipeline.settle_delay_ms)
    }

    pub fn number_format(&self) -> NumberFormatOptions {
        NumberFormatOptions {
            use_comma: self.formatting.number_comma,
            locale: self.formatting.locale.clone(),
        }
    }
}

/// Accept an http(s) base URL, without its trailing slash.
fn base_url(value: &str) -> Result<String> {
    let value = value.trim().trim_end_matches('/');
    anyhow::ensure!(
        value.starts_with("http://") || value.starts_with("https://"),
        "Invalid URL '{value}'. Expected an http:// or https:// address"
    );
    Ok(value.to_string())
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid number value for {key}: '{value}'"))
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file.");
        println!("📍 Point it at your sentiment service with:");
        println!("   vocscope config set api-url https://...");
        println!("or edit");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("🔧 Current configuration:");
            println!("   API URL: {}", config.server.api_url);
            println!("   Pipeline URL: {}", config.server.pipeline_url);
            println!("   Research URL: {}", config.server.research_url);
            println!(
                "   Timeout: {}",
                match config.server.timeout_seconds {
                    0 => "None".to_string(),
                    secs => format!("{secs}s"),
                }
            );
            println!("   Settle Delay: {}ms", config.pipeline.settle_delay_ms);
            println!("   Max Input Rows: {}", config.chat.max_input_rows);
            println!("   Number Comma: {}", config.formatting.number_comma);
            println!("   Locale: {}", config.formatting.locale);
        }
        None => {
            println!("❌ No configuration file found.");
            println!("   Run 'vocscope config init' to create one.");
        }
    }
    Ok(())
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "api-url" => config.server.api_url = base_url(value)?,
        "pipeline-url" => config.server.pipeline_url = base_url(value)?,
        "research-url" => config.server.research_url = value.trim().to_string(),
        "timeout-seconds" => config.server.timeout_seconds = number(key, value)?,
        "settle-delay-ms" => config.pipeline.settle_delay_ms = number(key, value)?,
        "max-input-rows" => {
            let rows: u16 = number(key, value)?;
            anyhow::ensure!(rows > 0, "max-input-rows must be at least 1");
            config.chat.max_input_rows = rows;
        }
        "number-comma" => {
            let enabled = value
                .parse::<bool>()
                .context("Invalid boolean value. Use 'true' or 'false'")?;
            config.formatting.number_comma = enabled;
        }
        "locale" => {
            config.formatting.locale = value.to_string();
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    config.save(false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_config() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join(".vocscope.toml");
        set_test_config_path(config_path.clone());
        (dir, config_path)
    }

    #[test]
    fn default_config_round_trip() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        let loaded = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(
            loaded.server.api_url,
            "https://vocsentimentapi.azurewebsites.net/api"
        );
        assert_eq!(loaded.server.pipeline_url, "http://localhost:5103/api");
        assert_eq!(loaded.pipeline.settle_delay_ms, 1000);
        assert_eq!(loaded.chat.max_input_rows, 8);
        assert!(loaded.formatting.number_comma);
        assert_eq!(loaded.request_timeout(), None);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let (_dir, path) = setup_test_config();
        fs::write(
            &path,
            "[server]\napi_url = \"http://a\"\npipeline_url = \"http://b\"\nresearch_url = \"\"\n",
        )
        .unwrap();

        let loaded = Config::load().unwrap().unwrap();
        assert_eq!(loaded.server.api_url, "http://a");
        assert_eq!(loaded.settle_delay(), Duration::from_millis(1000));
        assert_eq!(loaded.formatting.locale, "en");
    }

    #[test]
    fn set_config_value_behaviour() {
        let (_dir, _path) = setup_test_config();
        create_default_config(true).expect("create_default_config");

        set_config_value("api-url", "http://127.0.0.1:9000/api/").expect("set api-url");
        set_config_value("pipeline-url", "http://127.0.0.1:9001/api").expect("set pipeline-url");
        set_config_value("timeout-seconds", "30").expect("set timeout-seconds");
        set_config_value("settle-delay-ms", "250").expect("set settle-delay-ms");
        set_config_value("max-input-rows", "4").expect("set max-input-rows");
        set_config_value("number-comma", "false").expect("set number-comma");
        set_config_value("locale", "de").expect("set locale");

        let cfg = Config::load()
            .expect("load config")
            .expect("config should exist");

        assert_eq!(cfg.server.api_url, "http://127.0.0.1:9000/api");
        assert_eq!(cfg.server.pipeline_url, "http://127.0.0.1:9001/api");
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.settle_delay(), Duration::from_millis(250));
        assert_eq!(cfg.chat.max_input_rows, 4);
        assert!(!cfg.number_format().use_comma);
        assert_eq!(cfg.number_format().locale, "de");

        let err = set_config_value("unknown-key", "value").unwrap_err();
        let msg = format!("{err}");
        assert!(
            msg.contains("Unknown config key"),
            "unexpected error message: {msg}"
        );
        let err = set_config_value("number-comma", "not-a-bool").unwrap_err();
        let msg = format!("{err}");
        assert!(
            msg.contains("Invalid boolean value"),
            "unexpected error message: {msg}"
        );
        assert!(set_config_value("max-input-rows", "0").is_err());
        let err = set_config_value("api-url", "localhost:9000").unwrap_err();
        assert!(format!("{err}").contains("Invalid URL"), "{err}");
        let err = set_config_value("timeout-seconds", "soon").unwrap_err();
        assert!(format!("{err}").contains("timeout-seconds"), "{err}");
    }

    #[test]
    fn load_without_file_is_none() {
        let (_dir, _path) = setup_test_config();
        assert!(Config::load().expect("load").is_none());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let (_dir, path) = setup_test_config();
        fs::write(&path, "[server\n").unwrap();
        let err = Config::load().unwrap_err();
        assert!(format!("{err}").contains(".vocscope.toml"), "{err}");
    }
}
