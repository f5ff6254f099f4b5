use std::time::Duration;

use anyhow::Context as _;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let api_key = api_key.trim().to_owned();
        if api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is empty");
        }

        let base_url = non_empty_var("BOOKFORGE_OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned());
        let model = non_empty_var("BOOKFORGE_OPENAI_MODEL")
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_owned());
        let temperature = match non_empty_var("BOOKFORGE_OPENAI_TEMPERATURE") {
            Some(raw) => parse_temperature(&raw).with_context(|| {
                format!("invalid BOOKFORGE_OPENAI_TEMPERATURE={raw:?}. expected 0.0..=2.0")
            })?,
            None => 0.7,
        };
        let timeout_secs = match non_empty_var("BOOKFORGE_OPENAI_TIMEOUT_SECS") {
            Some(raw) => parse_positive_secs(&raw).with_context(|| {
                format!("invalid BOOKFORGE_OPENAI_TIMEOUT_SECS={raw:?}. expected seconds > 0")
            })?,
            None => 300,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            temperature,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

pub fn autosave_interval_from_env() -> anyhow::Result<Duration> {
    let secs = match non_empty_var("BOOKFORGE_AUTOSAVE_SECS") {
        Some(raw) => parse_positive_secs(&raw).with_context(|| {
            format!("invalid BOOKFORGE_AUTOSAVE_SECS={raw:?}. expected seconds > 0")
        })?,
        None => DEFAULT_AUTOSAVE_SECS,
    };
    Ok(Duration::from_secs(secs))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_positive_secs(raw: &str) -> anyhow::Result<u64> {
    let secs: u64 = raw.trim().parse().context("parse seconds")?;
    if secs == 0 {
        anyhow::bail!("must be greater than zero");
    }
    Ok(secs)
}

fn parse_temperature(raw: &str) -> anyhow::Result<f32> {
    let value: f32 = raw.trim().parse().context("parse temperature")?;
    if !(0.0..=2.0).contains(&value) {
        anyhow::bail!("temperature out of range: {value}");
    }
    Ok(value)
}
