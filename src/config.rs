use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_GOOGLE_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_MAX_FILES_CAP: usize = 100;
const DEFAULT_SUMMARY_CHUNK_SIZE: usize = 10_000;
const DEFAULT_MIN_SENTENCES: usize = 5;
const DEFAULT_MAX_SENTENCES: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Prompt template file could not be read or lacks the text placeholder.
    #[error("Invalid summary prompt template: {0}")]
    InvalidPrompt(String),
}

/// Unit used to measure text against the per-call summarization threshold.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// `cl100k_base` BPE tokens.
    Tokens,
}

/// Runtime configuration for the Drive Digest server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bearer key for the Groq chat completions API.
    pub groq_api_key: String,
    /// Groq model identifier used for every summarization call.
    pub groq_model: String,
    /// Base URL of the OpenAI-compatible completions API.
    pub groq_base_url: String,
    /// OAuth client identifier issued by Google.
    pub google_client_id: String,
    /// OAuth client secret issued by Google.
    pub google_client_secret: String,
    /// Callback URL registered for the OAuth client.
    pub google_redirect_uri: String,
    /// Authorization endpoint the user is redirected to.
    pub google_auth_url: String,
    /// Token endpoint used for the code exchange.
    pub google_token_url: String,
    /// Base URL of the Drive v3 REST API.
    pub google_drive_api_url: String,
    /// Maximum number of files processed in one run.
    pub max_files_cap: usize,
    /// Maximum input size per summarization call, measured in `summary_chunk_unit`.
    pub summary_chunk_size: usize,
    /// Unit used for `summary_chunk_size`.
    pub summary_chunk_unit: ChunkUnit,
    /// Lower bound of the requested summary length in sentences.
    pub summary_min_sentences: usize,
    /// Upper bound of the requested summary length in sentences.
    pub summary_max_sentences: usize,
    /// Prompt template loaded from `SUMMARY_PROMPT_FILE`, when set.
    pub summary_prompt_template: Option<String>,
    /// Timeout applied to each download, extraction, and backend call.
    pub request_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let (summary_min_sentences, summary_max_sentences) = sentence_range(
            parse_optional("SUMMARY_MIN_SENTENCES")?,
            parse_optional("SUMMARY_MAX_SENTENCES")?,
        )?;

        Ok(Self {
            groq_api_key: load_env("GROQ_API_KEY")?,
            groq_model: load_env("GROQ_MODEL")?,
            groq_base_url: load_env_optional("GROQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            google_client_id: load_env("GOOGLE_CLIENT_ID")?,
            google_client_secret: load_env("GOOGLE_CLIENT_SECRET")?,
            google_redirect_uri: load_env("GOOGLE_REDIRECT_URI")?,
            google_auth_url: load_env_optional("GOOGLE_AUTH_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_AUTH_URL.to_string()),
            google_token_url: load_env_optional("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_TOKEN_URL.to_string()),
            google_drive_api_url: load_env_optional("GOOGLE_DRIVE_API_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_DRIVE_API_URL.to_string()),
            max_files_cap: positive("MAX_FILES_CAP", DEFAULT_MAX_FILES_CAP)?,
            summary_chunk_size: positive("SUMMARY_CHUNK_SIZE", DEFAULT_SUMMARY_CHUNK_SIZE)?,
            summary_chunk_unit: load_env_optional("SUMMARY_CHUNK_UNIT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("SUMMARY_CHUNK_UNIT".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            summary_min_sentences,
            summary_max_sentences,
            summary_prompt_template: load_env_optional("SUMMARY_PROMPT_FILE")
                .map(|path| load_prompt_template(PathBuf::from(path)))
                .transpose()?,
            request_timeout_secs: parse_optional("REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }

    /// Timeout applied to each outbound operation.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn positive(key: &str, default: usize) -> Result<usize, ConfigError> {
    match parse_optional::<usize>(key)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

/// Resolve the target sentence range, blaming the variable that makes it invalid.
///
/// An explicit maximum below the minimum is reported against `SUMMARY_MAX_SENTENCES`; a minimum
/// above the default maximum is reported against `SUMMARY_MIN_SENTENCES`.
fn sentence_range(
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(usize, usize), ConfigError> {
    let low = min.unwrap_or(DEFAULT_MIN_SENTENCES);
    let high = max.unwrap_or(DEFAULT_MAX_SENTENCES);
    if low == 0 {
        return Err(ConfigError::InvalidValue("SUMMARY_MIN_SENTENCES".into()));
    }
    if high < low {
        let key = if max.is_some() {
            "SUMMARY_MAX_SENTENCES"
        } else {
            "SUMMARY_MIN_SENTENCES"
        };
        return Err(ConfigError::InvalidValue(key.into()));
    }
    Ok((low, high))
}

fn load_prompt_template(path: PathBuf) -> Result<String, ConfigError> {
    let template = std::fs::read_to_string(&path)
        .map_err(|error| ConfigError::InvalidPrompt(format!("{}: {error}", path.display())))?;
    if !template.contains("{document_text}") {
        return Err(ConfigError::InvalidPrompt(format!(
            "{} does not contain the {{document_text}} placeholder",
            path.display()
        )));
    }
    Ok(template)
}

impl std::str::FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        groq_model = %config.groq_model,
        redirect_uri = %config.google_redirect_uri,
        max_files_cap = config.max_files_cap,
        chunk_size = config.summary_chunk_size,
        chunk_unit = ?config.summary_chunk_unit,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    let _ = CONFIG.set(config);
}

/// Fully populated configuration for unit tests.
#[cfg(test)]
pub(crate) fn sample_config() -> Config {
    Config {
        groq_api_key: "test-key".into(),
        groq_model: "llama-3.1-8b-instant".into(),
        groq_base_url: DEFAULT_GROQ_BASE_URL.into(),
        google_client_id: "client-id".into(),
        google_client_secret: "client-secret".into(),
        google_redirect_uri: "http://localhost:4100/auth/callback".into(),
        google_auth_url: DEFAULT_GOOGLE_AUTH_URL.into(),
        google_token_url: DEFAULT_GOOGLE_TOKEN_URL.into(),
        google_drive_api_url: DEFAULT_GOOGLE_DRIVE_API_URL.into(),
        max_files_cap: DEFAULT_MAX_FILES_CAP,
        summary_chunk_size: DEFAULT_SUMMARY_CHUNK_SIZE,
        summary_chunk_unit: ChunkUnit::Chars,
        summary_min_sentences: DEFAULT_MIN_SENTENCES,
        summary_max_sentences: DEFAULT_MAX_SENTENCES,
        summary_prompt_template: None,
        request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        server_port: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_unit_parses_known_values() {
        assert_eq!("chars".parse::<ChunkUnit>(), Ok(ChunkUnit::Chars));
        assert_eq!(" Tokens ".parse::<ChunkUnit>(), Ok(ChunkUnit::Tokens));
        assert!("words".parse::<ChunkUnit>().is_err());
    }

    #[test]
    fn prompt_template_requires_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "Summarize this.").expect("write");
        let error = load_prompt_template(bad).expect_err("missing placeholder");
        assert!(matches!(error, ConfigError::InvalidPrompt(_)));

        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Summarize:\n{document_text}").expect("write");
        let template = load_prompt_template(good).expect("valid template");
        assert!(template.contains("{document_text}"));
    }

    #[test]
    fn sentence_range_blames_the_offending_variable() {
        assert_eq!(sentence_range(None, None).expect("defaults"), (5, 10));
        assert_eq!(sentence_range(Some(2), Some(2)).expect("equal"), (2, 2));

        let invalid = |min, max| match sentence_range(min, max) {
            Err(ConfigError::InvalidValue(key)) => key,
            other => panic!("expected invalid value, got {other:?}"),
        };
        assert_eq!(invalid(None, Some(3)), "SUMMARY_MAX_SENTENCES");
        assert_eq!(invalid(Some(6), Some(4)), "SUMMARY_MAX_SENTENCES");
        assert_eq!(invalid(Some(5), Some(0)), "SUMMARY_MAX_SENTENCES");
        assert_eq!(invalid(Some(12), None), "SUMMARY_MIN_SENTENCES");
        assert_eq!(invalid(Some(0), Some(4)), "SUMMARY_MIN_SENTENCES");
    }

    #[test]
    fn request_timeout_is_never_zero() {
        let mut config = sample_config();
        config.request_timeout_secs = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
