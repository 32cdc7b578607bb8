use crate::types::*;
use chrono::Local;
use std::{
    env,
    fs,
    io::Write,
    path::PathBuf,
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  if let Some(raw) = env_default("SCHEDULE_EDITOR_CONFIG") {
    return resolve_repo_path(&raw);
  }
  repo_root().join("config.json")
}

pub fn logs_dir() -> PathBuf {
  repo_root().join("logs")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn parse_id(raw: &str) -> Option<i64> {
  raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

pub fn apply_env_defaults(mut config: EditorConfig) -> EditorConfig {
  if config.api_base_url.trim().is_empty() {
    if let Some(value) = env_default("SCHEDULE_API_URL") {
      config.api_base_url = value;
    }
  }
  if config.api_token.trim().is_empty() {
    if let Some(value) = env_default("SCHEDULE_API_TOKEN") {
      config.api_token = value;
    }
  }
  if config.tournament_id.is_none() {
    config.tournament_id = env_default("SCHEDULE_TOURNAMENT_ID").and_then(|v| parse_id(&v));
  }
  if config.version_id.is_none() {
    config.version_id = env_default("SCHEDULE_VERSION_ID").and_then(|v| parse_id(&v));
  }
  if config.snapshot_addr.trim().is_empty() || config.snapshot_addr == DEFAULT_SNAPSHOT_ADDR {
    if let Some(value) = env_default("SCHEDULE_SNAPSHOT_ADDR") {
      config.snapshot_addr = value;
    }
  }
  if !config.test_mode {
    config.test_mode = env_default("SCHEDULE_TEST_MODE")
      .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
      .unwrap_or(false);
  }
  if config.request_retries == 0 {
    config.request_retries = 1;
  }
  config
}

pub fn load_config_inner() -> Result<EditorConfig, String> {
  let path = config_path();
  if !path.is_file() {
    return Ok(apply_env_defaults(EditorConfig::default()));
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<EditorConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn api_log_path() -> PathBuf {
  logs_dir().join("schedule_api.log")
}

pub fn append_api_log(label: &str, payload: &str) {
  if fs::create_dir_all(logs_dir()).is_err() {
    return;
  }
  let path = api_log_path();
  let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
  let entry = format!("[{timestamp}] {label}\n{payload}\n\n");
  if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&path) {
    let _ = file.write_all(entry.as_bytes());
  }
}

pub fn log_env_warnings(config: &EditorConfig) {
  let mut warnings = Vec::new();

  if config.test_mode {
    warnings.push("SCHEDULE_TEST_MODE enabled; using the in-memory schedule store");
  } else {
    if config.api_base_url.trim().is_empty() {
      warnings.push("SCHEDULE_API_URL not set and no apiBaseUrl in config; schedule loads will fail");
    }
    if config.api_token.trim().is_empty() {
      warnings.push("SCHEDULE_API_TOKEN not set; requests go out unauthenticated");
    }
  }
  if config.tournament_id.is_none() {
    warnings.push("SCHEDULE_TOURNAMENT_ID not set; editor will stay uninitialized");
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_env_line_variants() {
    assert_eq!(
      parse_env_line("export SCHEDULE_API_URL=\"http://localhost:8000/api\""),
      Some(("SCHEDULE_API_URL".to_string(), "http://localhost:8000/api".to_string()))
    );
    assert_eq!(
      parse_env_line("SCHEDULE_TOURNAMENT_ID=7 # dev event"),
      Some(("SCHEDULE_TOURNAMENT_ID".to_string(), "7".to_string()))
    );
    assert_eq!(parse_env_line("# comment"), None);
    assert_eq!(parse_env_line("=value"), None);
  }

  #[test]
  fn test_parse_id_rejects_non_positive() {
    assert_eq!(parse_id(" 42 "), Some(42));
    assert_eq!(parse_id("0"), None);
    assert_eq!(parse_id("abc"), None);
  }

  #[test]
  fn test_config_defaults_fill_missing_fields() {
    let config: EditorConfig = serde_json::from_str(r#"{"apiBaseUrl": "http://x", "tournamentId": 7}"#).unwrap();
    assert_eq!(config.api_base_url, "http://x");
    assert_eq!(config.tournament_id, Some(7));
    assert_eq!(config.version_id, None);
    assert_eq!(config.snapshot_addr, DEFAULT_SNAPSHOT_ADDR);
    assert_eq!(config.request_retries, DEFAULT_REQUEST_RETRIES);
  }
}
