use crate::config::append_api_log;
use crate::types::*;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

pub const CONFLICT_FETCH_ERROR_PREFIX: &str = "Failed to load conflicts";

/// The authoritative schedule store. Every call may fail with a transport
/// or validation error; `Err` carries whatever message the store gave.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
  async fn get_schedule_versions(&self, tournament_id: i64) -> Result<Vec<ScheduleVersion>, String>;

  async fn get_schedule_grid(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleGrid, String>;

  async fn get_conflicts(&self, tournament_id: i64, version_id: i64) -> Result<ConflictReport, String>;

  async fn clone_schedule_version(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleVersion, String>;

  async fn create_assignment(&self, tournament_id: i64, request: &NewAssignment) -> Result<Assignment, String>;

  async fn update_assignment(
    &self,
    tournament_id: i64,
    assignment_id: i64,
    new_slot_id: i64,
  ) -> Result<Assignment, String>;

  async fn delete_assignment(&self, tournament_id: i64, assignment_id: i64) -> Result<(), String>;
}

// ── HTTP store ─────────────────────────────────────────────────────────

pub struct HttpScheduleStore {
  client: reqwest::Client,
  base_url: String,
  token: Option<String>,
  retries: u32,
}

impl HttpScheduleStore {
  pub fn new(config: &EditorConfig) -> Result<Self, String> {
    let base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
      return Err("Schedule API URL is not set (config apiBaseUrl or SCHEDULE_API_URL).".to_string());
    }
    let token = Some(config.api_token.trim().to_string()).filter(|t| !t.is_empty());
    let client = reqwest::Client::builder()
      .user_agent("schedule-editor")
      .build()
      .map_err(|e| format!("build http client: {e}"))?;
    Ok(HttpScheduleStore {
      client,
      base_url,
      token,
      retries: config.request_retries.max(1),
    })
  }

  pub fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  /// Reads retry on transport errors; mutations go out once.
  async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<String, String> {
    let url = self.endpoint(path);
    let attempts = if method == Method::GET { self.retries } else { 1 };
    let request_log = {
      let body_text = body
        .as_ref()
        .map(|b| serde_json::to_string_pretty(b).unwrap_or_else(|_| b.to_string()))
        .unwrap_or_default();
      format!("{method} {url}\nAuthorization: Bearer [redacted]\nbody:\n{body_text}")
    };
    append_api_log("Schedule API request", &request_log);

    let mut last_send_err = String::new();
    let mut resp = None;
    for attempt in 0..attempts {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
      }
      let mut request = self.client.request(method.clone(), &url);
      if let Some(token) = &self.token {
        request = request.bearer_auth(token);
      }
      if let Some(body) = &body {
        request = request.json(body);
      }
      match request.send().await {
        Ok(r) => {
          resp = Some(r);
          break;
        }
        Err(e) => {
          last_send_err = format!("Schedule API request failed (attempt {}): {e}", attempt + 1);
          append_api_log("Schedule API error", &last_send_err);
          tracing::warn!("{}", last_send_err);
        }
      }
    }
    let resp = resp.ok_or_else(|| last_send_err.clone())?;
    let status = resp.status();
    let text = resp.text().await.map_err(|e| {
      append_api_log("Schedule API error", &format!("read failed: {e}"));
      format!("Schedule API read failed: {e}")
    })?;
    append_api_log("Schedule API response", &format!("status: {status}\nbody:\n{text}"));
    if !status.is_success() {
      return Err(extract_error_message(status.as_u16(), &text));
    }
    Ok(text)
  }

  async fn send_json<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<Value>,
  ) -> Result<T, String> {
    let text = self.send(method, path, body).await?;
    serde_json::from_str::<T>(&text).map_err(|e| {
      append_api_log("Schedule API error", &format!("parse failed: {e}"));
      format!("Schedule API parse failed: {e}")
    })
  }
}

/// Pulls a readable message out of an error body (`detail` as text or as a
/// list of `{msg}` objects, then `message`, then `error`).
pub fn extract_error_message(status: u16, body: &str) -> String {
  let fallback = format!("Schedule API error {status}");
  let Ok(value) = serde_json::from_str::<Value>(body) else {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
      return fallback;
    }
    return trimmed.to_string();
  };
  if let Some(detail) = value.get("detail") {
    if let Some(text) = detail.as_str().map(str::trim).filter(|t| !t.is_empty()) {
      return text.to_string();
    }
    if let Some(items) = detail.as_array() {
      let joined = items
        .iter()
        .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
        .collect::<Vec<_>>()
        .join("; ");
      if !joined.is_empty() {
        return joined;
      }
    }
  }
  for key in ["message", "error"] {
    if let Some(text) = value.get(key).and_then(|v| v.as_str()).map(str::trim) {
      if !text.is_empty() {
        return text.to_string();
      }
    }
  }
  fallback
}

#[async_trait]
impl ScheduleStore for HttpScheduleStore {
  async fn get_schedule_versions(&self, tournament_id: i64) -> Result<Vec<ScheduleVersion>, String> {
    self
      .send_json(Method::GET, &format!("tournaments/{tournament_id}/schedule/versions"), None)
      .await
  }

  async fn get_schedule_grid(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleGrid, String> {
    self
      .send_json(
        Method::GET,
        &format!("tournaments/{tournament_id}/schedule/grid?schedule_version_id={version_id}"),
        None,
      )
      .await
  }

  async fn get_conflicts(&self, tournament_id: i64, version_id: i64) -> Result<ConflictReport, String> {
    self
      .send_json(
        Method::GET,
        &format!("tournaments/{tournament_id}/schedule/conflicts?schedule_version_id={version_id}"),
        None,
      )
      .await
      .map_err(|e| format!("{CONFLICT_FETCH_ERROR_PREFIX}: {e}"))
  }

  async fn clone_schedule_version(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleVersion, String> {
    self
      .send_json(
        Method::POST,
        &format!("tournaments/{tournament_id}/schedule/versions/{version_id}/clone"),
        None,
      )
      .await
  }

  async fn create_assignment(&self, tournament_id: i64, request: &NewAssignment) -> Result<Assignment, String> {
    let body = serde_json::to_value(request).map_err(|e| e.to_string())?;
    self
      .send_json(
        Method::POST,
        &format!("tournaments/{tournament_id}/schedule/assignments"),
        Some(body),
      )
      .await
  }

  async fn update_assignment(
    &self,
    tournament_id: i64,
    assignment_id: i64,
    new_slot_id: i64,
  ) -> Result<Assignment, String> {
    self
      .send_json(
        Method::PATCH,
        &format!("tournaments/{tournament_id}/schedule/assignments/{assignment_id}"),
        Some(json!({ "new_slot_id": new_slot_id })),
      )
      .await
  }

  async fn delete_assignment(&self, tournament_id: i64, assignment_id: i64) -> Result<(), String> {
    self
      .send(
        Method::DELETE,
        &format!("tournaments/{tournament_id}/schedule/assignments/{assignment_id}"),
        None,
      )
      .await
      .map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_message_prefers_detail() {
    assert_eq!(
      extract_error_message(409, r#"{"detail": "Slot already assigned"}"#),
      "Slot already assigned"
    );
    assert_eq!(
      extract_error_message(422, r#"{"detail": [{"msg": "field required"}, {"msg": "bad slot"}]}"#),
      "field required; bad slot"
    );
    assert_eq!(extract_error_message(400, r#"{"message": "Version is final"}"#), "Version is final");
  }

  #[test]
  fn test_error_message_falls_back_to_status() {
    assert_eq!(extract_error_message(500, ""), "Schedule API error 500");
    assert_eq!(extract_error_message(502, "<html>bad gateway</html>"), "Schedule API error 502");
    assert_eq!(extract_error_message(404, r#"{"detail": ""}"#), "Schedule API error 404");
    assert_eq!(extract_error_message(503, "upstream timeout"), "upstream timeout");
  }

  #[test]
  fn test_store_requires_base_url() {
    let config = EditorConfig::default();
    assert!(HttpScheduleStore::new(&config).is_err());
  }

  #[test]
  fn test_endpoint_joins_without_double_slash() {
    let config = EditorConfig {
      api_base_url: "http://localhost:8000/api/".to_string(),
      ..EditorConfig::default()
    };
    let store = HttpScheduleStore::new(&config).unwrap();
    assert_eq!(
      store.endpoint("/tournaments/7/schedule/versions"),
      "http://localhost:8000/api/tournaments/7/schedule/versions"
    );
  }
}
