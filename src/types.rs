use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Arc, Mutex};

use crate::conflicts::ConflictView;
use crate::grid::{GridIndex, UnassignedCache};

// ── Constants ──────────────────────────────────────────────────────────

pub const SLOT_GRANULARITY_MINUTES: i64 = 15;
pub const DEFAULT_MATCH_DURATION_MINUTES: i64 = 60;
pub const MAX_MATCH_DURATION_MINUTES: i64 = 24 * 60;
pub const UNASSIGNED_PREVIEW_LIMIT: usize = 10;
pub const DEFAULT_REQUEST_RETRIES: u32 = 3;
pub const DEFAULT_SNAPSHOT_ADDR: &str = "127.0.0.1:17990";
pub const CLONE_FIRST_MESSAGE: &str =
    "This schedule version is final. Clone it to a draft before making changes.";

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedEditorState = Arc<Mutex<EditorState>>;

// ── Schedule domain types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleVersion {
    pub id: i64,
    pub version_number: i64,
    pub status: VersionStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: i64,
    pub day_date: String,
    pub start_time: String,
    pub court_id: i64,
    #[serde(default)]
    pub court_label: String,
}

fn default_duration_minutes() -> i64 {
    DEFAULT_MATCH_DURATION_MINUTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: i64,
    #[serde(default)]
    pub match_code: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub round_index: Option<i64>,
    #[serde(default)]
    pub sequence_in_round: Option<i64>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
    /// Teams are not bound to matches yet; the store sends these when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_a_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_b_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub slot_id: i64,
    pub match_id: i64,
    pub schedule_version_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleGrid {
    pub slots: Vec<Slot>,
    pub assignments: Vec<Assignment>,
    pub matches: Vec<Match>,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub schedule_version_id: i64,
    pub match_id: i64,
    pub slot_id: i64,
}

// ── Conflict report types ──────────────────────────────────────────────

/// Treats an explicit `null` section the same as a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictSummary {
    pub total_slots: usize,
    pub total_matches: usize,
    pub assigned_matches: usize,
    pub unassigned_matches: usize,
    pub assignment_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConflict {
    pub team_id: i64,
    #[serde(default)]
    pub team_name: Option<String>,
    pub match_a_id: i64,
    pub match_b_id: i64,
    #[serde(default)]
    pub slot_a_id: Option<i64>,
    #[serde(default)]
    pub slot_b_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConflictSection {
    #[serde(deserialize_with = "null_as_default")]
    pub conflicts: Vec<TeamConflict>,
    /// Matches that could not be checked because a team is still unknown.
    pub unknown_team_match_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingViolation {
    pub earlier_match_id: i64,
    pub later_match_id: i64,
    #[serde(default)]
    pub reason: String,
}

fn default_expected_count() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotPressure {
    pub slot_id: i64,
    pub assigned_count: usize,
    #[serde(default = "default_expected_count")]
    pub expected_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictReport {
    #[serde(deserialize_with = "null_as_default")]
    pub summary: ConflictSummary,
    #[serde(deserialize_with = "null_as_default")]
    pub unassigned: Vec<Match>,
    #[serde(deserialize_with = "null_as_default")]
    pub team_conflicts: TeamConflictSection,
    #[serde(deserialize_with = "null_as_default")]
    pub ordering_violations: Vec<OrderingViolation>,
    #[serde(deserialize_with = "null_as_default")]
    pub slot_pressure: Vec<SlotPressure>,
}

// ── Editor state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorPhase {
    #[default]
    Uninitialized,
    LoadingVersions,
    VersionsLoaded,
    LoadingGrid,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorScope {
    LoadVersions,
    LoadGrid,
    LoadConflicts,
    Patch,
    Clone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorError {
    pub scope: ErrorScope,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOps {
    /// Assignment id for move/unassign, match id for assign.
    pub patching_assignment_id: Option<i64>,
    pub cloning: bool,
}

#[derive(Debug, Default)]
pub struct EditorState {
    pub phase: EditorPhase,
    pub tournament_id: Option<i64>,
    pub version_id: Option<i64>,
    pub version_status: Option<VersionStatus>,
    pub versions: Vec<ScheduleVersion>,
    pub versions_loaded: bool,
    pub slots: Arc<Vec<Slot>>,
    pub assignments: Arc<Vec<Assignment>>,
    pub matches: Arc<Vec<Match>>,
    pub teams: Arc<Vec<Team>>,
    pub index: GridIndex,
    pub conflicts: Option<ConflictReport>,
    pub pending: PendingOps,
    pub loading_versions: bool,
    pub loading_grid: bool,
    pub last_error: Option<EditorError>,
    pub unassigned_cache: UnassignedCache,
}

// ── Presentation snapshot ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub phase: EditorPhase,
    pub tournament_id: Option<i64>,
    pub version_id: Option<i64>,
    pub version_status: Option<VersionStatus>,
    pub can_edit: bool,
    pub versions: Vec<ScheduleVersion>,
    pub slots: Vec<Slot>,
    pub assignments: Vec<Assignment>,
    pub matches: Vec<Match>,
    pub unassigned_queue: Vec<Match>,
    pub conflicts: ConflictView,
    pub pending: PendingOps,
    pub loading_versions: bool,
    pub loading_grid: bool,
    pub last_error: Option<EditorError>,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub tournament_id: Option<i64>,
    pub version_id: Option<i64>,
    pub snapshot_addr: String,
    pub request_retries: u32,
    pub test_mode: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_token: String::new(),
            tournament_id: None,
            version_id: None,
            snapshot_addr: DEFAULT_SNAPSHOT_ADDR.to_string(),
            request_retries: DEFAULT_REQUEST_RETRIES,
            test_mode: false,
        }
    }
}
