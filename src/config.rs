use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "credential",
    "_token",
    "token_",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 4] = ["max_tokens", "total_tokens", "tokens", "tokenizer"];

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        let log_dir = user_data_dir.join("logs");
        let secrets_path = user_data_dir.join("secrets.yaml");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            secrets_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("PURSER_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("PURSER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Purser");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Purser");
    }

    home_dir().join(".local").join("share").join("purser")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Retrieval and session tunables surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub documents_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_turns: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data/docs"),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            max_turns: 10,
        }
    }
}

impl RagSettings {
    pub fn resolve_documents_dir(&self, paths: &AppPaths) -> PathBuf {
        if self.documents_dir.is_absolute() {
            self.documents_dir.clone()
        } else {
            paths.project_root.join(&self.documents_dir)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            model: "nomic-embed-text-v1.5".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            api_key: None,
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8900,
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub rag: RagSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub server: ServerSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.rag.chunk_size == 0 {
            return Err(ApiError::BadRequest("chunk_size must be positive".into()));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ApiError::BadRequest(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.rag.top_k == 0 {
            return Err(ApiError::BadRequest("top_k must be positive".into()));
        }
        if self.rag.max_turns == 0 {
            return Err(ApiError::BadRequest("max_turns must be positive".into()));
        }
        Ok(())
    }
}

/// Loads and persists the YAML configuration, with sensitive keys split
/// into a separate secrets file and redacted on the way out.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        ConfigService { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }
        self.paths.project_root.join("config.yml")
    }

    pub fn config_write_path(&self) -> PathBuf {
        if cfg!(debug_assertions) {
            return self.paths.project_root.join("config.yml");
        }
        self.paths.user_data_dir.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        Ok(deep_merge(&public_config, &secrets_config))
    }

    /// Typed view of the merged configuration. `GROQ_API_KEY` in the
    /// environment overrides the stored generation credential.
    pub fn settings(&self) -> Result<Settings, ApiError> {
        let merged = self.load_config()?;
        let mut settings: Settings = serde_json::from_value(merged)
            .map_err(|err| ApiError::BadRequest(format!("invalid configuration: {err}")))?;

        if let Ok(key) = env::var("GROQ_API_KEY") {
            if !key.trim().is_empty() {
                settings.generation.api_key = Some(key);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn update_config(&self, config_data: Value, merge: bool) -> Result<(), ApiError> {
        let current = self.load_config()?;
        let restored = restore_redacted_values(&config_data, &current);
        let to_save = if merge {
            deep_merge(&current, &restored)
        } else {
            restored
        };

        let candidate: Settings = serde_json::from_value(to_save.clone())
            .map_err(|err| ApiError::BadRequest(format!("invalid configuration: {err}")))?;
        candidate.validate()?;

        save_config_files(self, &to_save)?;
        Ok(())
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => match value {
                Value::Object(_) => value,
                _ => Value::Object(Map::new()),
            },
            Err(_) => Value::Object(Map::new()),
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn save_config_files(service: &ConfigService, config: &Value) -> Result<(), ApiError> {
    let (public_config, secrets_config) = split_config(config);

    let config_path = service.config_write_path();
    if let Some(parent) = config_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let public_yaml = serde_yaml::to_string(&public_config).map_err(ApiError::internal)?;
    fs::write(&config_path, public_yaml).map_err(ApiError::internal)?;

    let secrets_path = service.secrets_path();
    if let Some(parent) = secrets_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let secrets_yaml = serde_yaml::to_string(&secrets_config).map_err(ApiError::internal)?;
    fs::write(&secrets_path, secrets_yaml).map_err(ApiError::internal)?;

    Ok(())
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn split_config(config: &Value) -> (Value, Value) {
    match config {
        Value::Object(map) => {
            let mut public_map = Map::new();
            let mut secret_map = Map::new();

            for (key, value) in map {
                match value {
                    Value::Object(_) => {
                        let (public_sub, secret_sub) = split_config(value);
                        if !is_empty_object(&public_sub) {
                            public_map.insert(key.clone(), public_sub);
                        }
                        if !is_empty_object(&secret_sub) {
                            secret_map.insert(key.clone(), secret_sub);
                        }
                    }
                    _ => {
                        if is_sensitive_key(key) && !value.is_null() {
                            secret_map.insert(key.clone(), value.clone());
                        } else {
                            public_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            }

            (Value::Object(public_map), Value::Object(secret_map))
        }
        _ => (config.clone(), Value::Object(Map::new())),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn restore_redacted_values(new_value: &Value, original: &Value) -> Value {
    match new_value {
        Value::Object(map) => {
            let mut restored = Map::new();
            let original_map = original.as_object();

            for (key, value) in map {
                let orig_val = original_map.and_then(|m| m.get(key));
                if value.as_str() == Some(REDACT_PLACEHOLDER) {
                    if let Some(orig) = orig_val {
                        restored.insert(key.clone(), orig.clone());
                    }
                    continue;
                }

                if value.is_object() || value.is_array() {
                    let merged = restore_redacted_values(value, orig_val.unwrap_or(&Value::Null));
                    restored.insert(key.clone(), merged);
                } else {
                    restored.insert(key.clone(), value.clone());
                }
            }

            Value::Object(restored)
        }
        _ => new_value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    if SENSITIVE_WHITELIST.iter().any(|white| lower == *white) {
        return false;
    }
    SENSITIVE_PATTERNS.iter().any(|pat| lower.contains(pat))
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deep_merge_overrides_nested_keys() {
        let base = json!({"rag": {"chunk_size": 500, "top_k": 3}});
        let over = json!({"rag": {"top_k": 5}});
        let merged = deep_merge(&base, &over);
        assert_eq!(merged["rag"]["chunk_size"], 500);
        assert_eq!(merged["rag"]["top_k"], 5);
    }

    #[test]
    fn split_config_moves_api_key_to_secrets() {
        let config = json!({
            "generation": {"model": "m", "api_key": "gsk-123"}
        });
        let (public, secrets) = split_config(&config);
        assert!(public["generation"].get("api_key").is_none());
        assert_eq!(secrets["generation"]["api_key"], "gsk-123");
        assert_eq!(public["generation"]["model"], "m");
    }

    #[test]
    fn redact_then_restore_round_trips_secret() {
        let original = json!({"generation": {"api_key": "gsk-123", "temperature": 0.7}});
        let redacted = redact_sensitive_values(&original);
        assert_eq!(redacted["generation"]["api_key"], REDACT_PLACEHOLDER);
        assert_eq!(redacted["generation"]["temperature"], 0.7);

        let restored = restore_redacted_values(&redacted, &original);
        assert_eq!(restored["generation"]["api_key"], "gsk-123");
    }

    #[test]
    fn max_tokens_is_not_treated_as_sensitive() {
        assert!(!is_sensitive_key("max_tokens"));
        assert!(is_sensitive_key("api_key"));
        assert!(is_sensitive_key("ACCESS_KEY"));
    }

    #[test]
    fn settings_defaults_deserialize_from_empty_config() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.rag.chunk_size, 500);
        assert_eq!(settings.rag.chunk_overlap, 50);
        assert_eq!(settings.rag.top_k, 3);
        assert_eq!(settings.rag.max_turns, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk_size() {
        let mut settings = Settings::default();
        settings.rag.chunk_overlap = settings.rag.chunk_size;
        assert!(matches!(
            settings.validate(),
            Err(ApiError::BadRequest(_))
        ));
    }
}
