use crate::conflicts::analyze_grid;
use crate::grid::parse_time_minutes;
use crate::remote::ScheduleStore;
use crate::types::*;
use async_trait::async_trait;
use std::{
  collections::{HashMap, HashSet},
  sync::Mutex,
  time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimOp {
  GetVersions,
  GetGrid,
  GetConflicts,
  CloneVersion,
  CreateAssignment,
  UpdateAssignment,
  DeleteAssignment,
}

#[derive(Clone, Debug)]
struct SimVersion {
  version: ScheduleVersion,
  assignments: Vec<Assignment>,
}

#[derive(Default)]
struct SimInner {
  tournament_id: i64,
  versions: Vec<SimVersion>,
  slots: Vec<Slot>,
  matches: Vec<Match>,
  teams: Vec<Team>,
  next_version_id: i64,
  next_slot_id: i64,
  next_assignment_id: i64,
  calls: HashMap<SimOp, usize>,
  failures: HashMap<SimOp, String>,
  delays: HashMap<SimOp, u64>,
}

impl SimInner {
  fn check_tournament(&self, tournament_id: i64) -> Result<(), String> {
    if tournament_id != self.tournament_id {
      return Err(format!("Tournament {tournament_id} not found."));
    }
    Ok(())
  }

  fn version(&self, version_id: i64) -> Result<&SimVersion, String> {
    self
      .versions
      .iter()
      .find(|v| v.version.id == version_id)
      .ok_or_else(|| format!("Schedule version {version_id} not found."))
  }

  fn draft_version_mut(&mut self, version_id: i64) -> Result<&mut SimVersion, String> {
    let version = self
      .versions
      .iter_mut()
      .find(|v| v.version.id == version_id)
      .ok_or_else(|| format!("Schedule version {version_id} not found."))?;
    if version.version.status == VersionStatus::Final {
      return Err(format!("Schedule version {version_id} is final; clone it to a draft first."));
    }
    Ok(version)
  }

  fn version_id_for_assignment(&self, assignment_id: i64) -> Result<i64, String> {
    self
      .versions
      .iter()
      .find(|v| v.assignments.iter().any(|a| a.id == assignment_id))
      .map(|v| v.version.id)
      .ok_or_else(|| format!("Assignment {assignment_id} not found."))
  }

  fn record_call(&mut self, op: SimOp) -> Result<(), String> {
    *self.calls.entry(op).or_insert(0) += 1;
    match self.failures.get(&op) {
      Some(message) => Err(message.clone()),
      None => Ok(()),
    }
  }
}

/// In-memory schedule store that enforces the same rules as the real
/// backend: final versions are read-only and each slot and match appears
/// in at most one assignment per version.
pub struct ScheduleStoreSim {
  inner: Mutex<SimInner>,
}

impl ScheduleStoreSim {
  pub fn new(tournament_id: i64) -> Self {
    ScheduleStoreSim {
      inner: Mutex::new(SimInner {
        tournament_id,
        next_version_id: 1,
        next_slot_id: 1,
        next_assignment_id: 1,
        ..SimInner::default()
      }),
    }
  }

  /// Small two-court day with a handful of placeholder matches.
  pub fn demo(tournament_id: i64) -> Result<Self, String> {
    let sim = ScheduleStoreSim::new(tournament_id);
    let final_id = sim.add_version(VersionStatus::Final, Some("Published".to_string()));
    let draft_id = sim.add_version(VersionStatus::Draft, None);
    let slot_ids = sim.generate_slots("2026-03-14", "09:00", "13:00", &[(1, "Court 1"), (2, "Court 2")])?;
    let codes = [
      ("WOM_R1_M1", "MAIN", 1, 1),
      ("WOM_R1_M2", "MAIN", 1, 2),
      ("WOM_R2_M1", "MAIN", 2, 1),
      ("MIX_R1_M1", "MAIN", 1, 1),
      ("MIX_R1_M2", "MAIN", 1, 2),
      ("WOM_C1_M1", "CONSOLATION", 1, 1),
    ];
    for (idx, (code, stage, round, sequence)) in codes.iter().enumerate() {
      sim.add_match(Match {
        match_id: idx as i64 + 1,
        match_code: code.to_string(),
        stage: stage.to_string(),
        round_index: Some(*round),
        sequence_in_round: Some(*sequence),
        duration_minutes: DEFAULT_MATCH_DURATION_MINUTES,
        team_a_id: None,
        team_b_id: None,
      });
    }
    for version_id in [final_id, draft_id] {
      sim.seed_assignment(version_id, slot_ids[0], 1)?;
      sim.seed_assignment(version_id, slot_ids[1], 2)?;
    }
    Ok(sim)
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, SimInner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn add_version(&self, status: VersionStatus, notes: Option<String>) -> i64 {
    let mut inner = self.lock();
    let id = inner.next_version_id;
    inner.next_version_id += 1;
    let version_number = inner.versions.iter().map(|v| v.version.version_number).max().unwrap_or(0) + 1;
    inner.versions.push(SimVersion {
      version: ScheduleVersion { id, version_number, status, notes },
      assignments: Vec::new(),
    });
    id
  }

  pub fn finalize_version(&self, version_id: i64) -> Result<(), String> {
    let mut inner = self.lock();
    let version = inner
      .versions
      .iter_mut()
      .find(|v| v.version.id == version_id)
      .ok_or_else(|| format!("Schedule version {version_id} not found."))?;
    version.version.status = VersionStatus::Final;
    Ok(())
  }

  pub fn add_slot(&self, slot: Slot) -> Result<(), String> {
    let mut inner = self.lock();
    let minutes = parse_time_minutes(&slot.start_time)
      .ok_or_else(|| format!("Invalid start time {}.", slot.start_time))?;
    let clash = inner.slots.iter().any(|s| {
      s.slot_id == slot.slot_id
        || (s.day_date == slot.day_date
          && s.court_id == slot.court_id
          && parse_time_minutes(&s.start_time) == Some(minutes))
    });
    if clash {
      return Err(format!(
        "Slot {} duplicates an existing slot id or day/time/court cell.",
        slot.slot_id
      ));
    }
    inner.next_slot_id = inner.next_slot_id.max(slot.slot_id + 1);
    inner.slots.push(slot);
    Ok(())
  }

  /// Generates one slot per court per 15-minute row in `[start, end)`.
  pub fn generate_slots(
    &self,
    day_date: &str,
    start_time: &str,
    end_time: &str,
    courts: &[(i64, &str)],
  ) -> Result<Vec<i64>, String> {
    let start = parse_time_minutes(start_time).ok_or_else(|| format!("Invalid start time {start_time}."))?;
    let end = parse_time_minutes(end_time).ok_or_else(|| format!("Invalid end time {end_time}."))?;
    if end <= start {
      return Err(format!("Time window {start_time}-{end_time} is empty."));
    }
    let mut ids = Vec::new();
    let mut minutes = start;
    while minutes < end {
      for (court_id, court_label) in courts {
        let slot_id = self.lock().next_slot_id;
        self.add_slot(Slot {
          slot_id,
          day_date: day_date.to_string(),
          start_time: format!("{:02}:{:02}", minutes / 60, minutes % 60),
          court_id: *court_id,
          court_label: court_label.to_string(),
        })?;
        ids.push(slot_id);
      }
      minutes += SLOT_GRANULARITY_MINUTES;
    }
    Ok(ids)
  }

  pub fn add_match(&self, m: Match) {
    self.lock().matches.push(m);
  }

  pub fn add_team(&self, team: Team) {
    self.lock().teams.push(team);
  }

  /// Places a match directly, ignoring the final-version lock. Setup only.
  pub fn seed_assignment(&self, version_id: i64, slot_id: i64, match_id: i64) -> Result<Assignment, String> {
    let mut inner = self.lock();
    inner.version(version_id)?;
    insert_assignment(&mut inner, version_id, slot_id, match_id)
  }

  pub fn assignments(&self, version_id: i64) -> Vec<Assignment> {
    self
      .lock()
      .versions
      .iter()
      .find(|v| v.version.id == version_id)
      .map(|v| v.assignments.clone())
      .unwrap_or_default()
  }

  pub fn fail(&self, op: SimOp, message: &str) {
    self.lock().failures.insert(op, message.to_string());
  }

  pub fn clear_failure(&self, op: SimOp) {
    self.lock().failures.remove(&op);
  }

  pub fn set_delay(&self, op: SimOp, delay_ms: u64) {
    self.lock().delays.insert(op, delay_ms);
  }

  pub fn call_count(&self, op: SimOp) -> usize {
    self.lock().calls.get(&op).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.lock().calls.values().sum()
  }

  pub fn mutation_calls(&self) -> usize {
    [SimOp::CloneVersion, SimOp::CreateAssignment, SimOp::UpdateAssignment, SimOp::DeleteAssignment]
      .iter()
      .map(|op| self.call_count(*op))
      .sum()
  }

  async fn enter(&self, op: SimOp) -> Result<(), String> {
    let delay = self.lock().delays.get(&op).copied().unwrap_or(0);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    self.lock().record_call(op)
  }

  fn grid(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleGrid, String> {
    let inner = self.lock();
    inner.check_tournament(tournament_id)?;
    let version = inner.version(version_id)?;
    Ok(ScheduleGrid {
      slots: inner.slots.clone(),
      assignments: version.assignments.clone(),
      matches: inner.matches.clone(),
      teams: inner.teams.clone(),
    })
  }
}

fn insert_assignment(
  inner: &mut SimInner,
  version_id: i64,
  slot_id: i64,
  match_id: i64,
) -> Result<Assignment, String> {
  if !inner.slots.iter().any(|s| s.slot_id == slot_id) {
    return Err(format!("Slot {slot_id} not found."));
  }
  if !inner.matches.iter().any(|m| m.match_id == match_id) {
    return Err(format!("Match {match_id} not found."));
  }
  let id = inner.next_assignment_id;
  let version = inner
    .versions
    .iter_mut()
    .find(|v| v.version.id == version_id)
    .ok_or_else(|| format!("Schedule version {version_id} not found."))?;
  if version.assignments.iter().any(|a| a.match_id == match_id) {
    return Err(format!("Match {match_id} is already assigned in this version."));
  }
  if version.assignments.iter().any(|a| a.slot_id == slot_id) {
    return Err(format!("Slot {slot_id} is already occupied."));
  }
  let assignment = Assignment {
    id,
    slot_id,
    match_id,
    schedule_version_id: version_id,
  };
  version.assignments.push(assignment.clone());
  inner.next_assignment_id += 1;
  Ok(assignment)
}

#[async_trait]
impl ScheduleStore for ScheduleStoreSim {
  async fn get_schedule_versions(&self, tournament_id: i64) -> Result<Vec<ScheduleVersion>, String> {
    self.enter(SimOp::GetVersions).await?;
    let inner = self.lock();
    inner.check_tournament(tournament_id)?;
    Ok(inner.versions.iter().map(|v| v.version.clone()).collect())
  }

  async fn get_schedule_grid(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleGrid, String> {
    self.enter(SimOp::GetGrid).await?;
    self.grid(tournament_id, version_id)
  }

  async fn get_conflicts(&self, tournament_id: i64, version_id: i64) -> Result<ConflictReport, String> {
    self.enter(SimOp::GetConflicts).await?;
    let grid = self.grid(tournament_id, version_id)?;
    Ok(analyze_grid(&grid))
  }

  async fn clone_schedule_version(&self, tournament_id: i64, version_id: i64) -> Result<ScheduleVersion, String> {
    self.enter(SimOp::CloneVersion).await?;
    let mut inner = self.lock();
    inner.check_tournament(tournament_id)?;
    let source = inner.version(version_id)?.clone();
    let id = inner.next_version_id;
    inner.next_version_id += 1;
    let version_number = inner.versions.iter().map(|v| v.version.version_number).max().unwrap_or(0) + 1;
    let mut assignments = Vec::with_capacity(source.assignments.len());
    for assignment in &source.assignments {
      assignments.push(Assignment {
        id: inner.next_assignment_id,
        schedule_version_id: id,
        ..assignment.clone()
      });
      inner.next_assignment_id += 1;
    }
    let version = ScheduleVersion {
      id,
      version_number,
      status: VersionStatus::Draft,
      notes: Some(format!("Cloned from version {}", source.version.version_number)),
    };
    inner.versions.push(SimVersion {
      version: version.clone(),
      assignments,
    });
    Ok(version)
  }

  async fn create_assignment(&self, tournament_id: i64, request: &NewAssignment) -> Result<Assignment, String> {
    self.enter(SimOp::CreateAssignment).await?;
    let mut inner = self.lock();
    inner.check_tournament(tournament_id)?;
    inner.draft_version_mut(request.schedule_version_id)?;
    insert_assignment(&mut inner, request.schedule_version_id, request.slot_id, request.match_id)
  }

  async fn update_assignment(
    &self,
    tournament_id: i64,
    assignment_id: i64,
    new_slot_id: i64,
  ) -> Result<Assignment, String> {
    self.enter(SimOp::UpdateAssignment).await?;
    let mut inner = self.lock();
    inner.check_tournament(tournament_id)?;
    if !inner.slots.iter().any(|s| s.slot_id == new_slot_id) {
      return Err(format!("Slot {new_slot_id} not found."));
    }
    let version_id = inner.version_id_for_assignment(assignment_id)?;
    let version = inner.draft_version_mut(version_id)?;
    if version
      .assignments
      .iter()
      .any(|a| a.slot_id == new_slot_id && a.id != assignment_id)
    {
      return Err(format!("Slot {new_slot_id} is already occupied."));
    }
    let assignment = version
      .assignments
      .iter_mut()
      .find(|a| a.id == assignment_id)
      .ok_or_else(|| format!("Assignment {assignment_id} not found."))?;
    assignment.slot_id = new_slot_id;
    Ok(assignment.clone())
  }

  async fn delete_assignment(&self, tournament_id: i64, assignment_id: i64) -> Result<(), String> {
    self.enter(SimOp::DeleteAssignment).await?;
    let mut inner = self.lock();
    inner.check_tournament(tournament_id)?;
    let version_id = inner.version_id_for_assignment(assignment_id)?;
    let version = inner.draft_version_mut(version_id)?;
    version.assignments.retain(|a| a.id != assignment_id);
    Ok(())
  }
}

/// Checks the per-version uniqueness rules over a set of assignments.
pub fn assignments_are_exclusive(assignments: &[Assignment]) -> bool {
  let mut slots = HashSet::new();
  let mut matches = HashSet::new();
  assignments.iter().all(|a| {
    slots.insert((a.schedule_version_id, a.slot_id)) && matches.insert((a.schedule_version_id, a.match_id))
  })
}
