use crate::types::*;
use chrono::{NaiveTime, Timelike};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::warn;

// ── Time helpers ───────────────────────────────────────────────────────

/// Minutes since midnight for "HH:MM" or "HH:MM:SS" start times.
pub fn parse_time_minutes(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let time = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f"))
        .ok()?;
    Some(i64::from(time.hour()) * 60 + i64::from(time.minute()))
}

/// Durations come straight from the store; anything outside one row to one
/// day is pulled back into that range.
pub fn clamp_duration(duration_minutes: i64) -> i64 {
    duration_minutes.clamp(SLOT_GRANULARITY_MINUTES, MAX_MATCH_DURATION_MINUTES)
}

pub fn rows_for_duration(duration_minutes: i64) -> i64 {
    let duration = clamp_duration(duration_minutes);
    (duration + SLOT_GRANULARITY_MINUTES - 1) / SLOT_GRANULARITY_MINUTES
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CellKey {
    day_date: String,
    minutes: i64,
    court_id: i64,
}

impl CellKey {
    fn for_slot(slot: &Slot) -> Option<Self> {
        Some(CellKey {
            day_date: slot.day_date.trim().to_string(),
            minutes: parse_time_minutes(&slot.start_time)?,
            court_id: slot.court_id,
        })
    }
}

// ── Grid index ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct GridIndex {
    pub slots_by_id: HashMap<i64, Slot>,
    pub assignments_by_slot_id: HashMap<i64, Assignment>,
    pub matches_by_id: HashMap<i64, Match>,
    cells: HashMap<CellKey, i64>,
    /// Ids that appeared more than once in the input; later entries won.
    pub duplicate_keys: usize,
}

impl GridIndex {
    pub fn build(slots: &[Slot], assignments: &[Assignment], matches: &[Match]) -> Self {
        let mut index = GridIndex::default();

        for slot in slots {
            if let Some(key) = CellKey::for_slot(slot) {
                index.cells.insert(key, slot.slot_id);
            }
            if index.slots_by_id.insert(slot.slot_id, slot.clone()).is_some() {
                warn!("duplicate slot_id {} in grid payload", slot.slot_id);
                index.duplicate_keys += 1;
            }
        }
        for assignment in assignments {
            if let Some(previous) = index
                .assignments_by_slot_id
                .insert(assignment.slot_id, assignment.clone())
            {
                warn!(
                    "slot {} referenced by assignments {} and {}",
                    assignment.slot_id, previous.id, assignment.id
                );
                index.duplicate_keys += 1;
            }
        }
        for m in matches {
            if index.matches_by_id.insert(m.match_id, m.clone()).is_some() {
                warn!("duplicate match_id {} in grid payload", m.match_id);
                index.duplicate_keys += 1;
            }
        }

        index
    }

    pub fn slot(&self, slot_id: i64) -> Option<&Slot> {
        self.slots_by_id.get(&slot_id)
    }

    pub fn assignment_at(&self, slot_id: i64) -> Option<&Assignment> {
        self.assignments_by_slot_id.get(&slot_id)
    }

    pub fn match_by_id(&self, match_id: i64) -> Option<&Match> {
        self.matches_by_id.get(&match_id)
    }

    pub fn cell_lookup(&self, day_date: &str, start_time: &str, court_id: i64) -> Option<&Slot> {
        let key = CellKey {
            day_date: day_date.trim().to_string(),
            minutes: parse_time_minutes(start_time)?,
            court_id,
        };
        self.cells.get(&key).and_then(|id| self.slots_by_id.get(id))
    }

    /// Cells a match covers on its court, starting at `slot_id`.
    /// Stops early when the court has no further row (end of a time window).
    pub fn occupied_slot_ids(&self, slot_id: i64, duration_minutes: i64) -> Vec<i64> {
        let Some(start) = self.slots_by_id.get(&slot_id).and_then(CellKey::for_slot) else {
            return if self.slots_by_id.contains_key(&slot_id) {
                vec![slot_id]
            } else {
                Vec::new()
            };
        };
        let mut out = Vec::new();
        for row in 0..rows_for_duration(duration_minutes) {
            let key = CellKey {
                minutes: start.minutes + row * SLOT_GRANULARITY_MINUTES,
                ..start.clone()
            };
            match self.cells.get(&key) {
                Some(id) => out.push(*id),
                None => break,
            }
        }
        out
    }
}

// ── Unassigned matches ─────────────────────────────────────────────────

pub fn unassigned_matches(matches: &[Match], assignments: &[Assignment]) -> Vec<Match> {
    let assigned: HashSet<i64> = assignments.iter().map(|a| a.match_id).collect();
    matches
        .iter()
        .filter(|m| !assigned.contains(&m.match_id))
        .cloned()
        .collect()
}

/// Remembers the last inputs by identity. A hit hands back the same `Arc`,
/// so views holding the previous list can compare by pointer.
#[derive(Debug, Default)]
pub struct UnassignedCache {
    last: Option<(Arc<Vec<Match>>, Arc<Vec<Assignment>>, Arc<Vec<Match>>)>,
}

impl UnassignedCache {
    pub fn get(
        &mut self,
        matches: &Arc<Vec<Match>>,
        assignments: &Arc<Vec<Assignment>>,
    ) -> Arc<Vec<Match>> {
        if let Some((cached_matches, cached_assignments, result)) = &self.last {
            if Arc::ptr_eq(cached_matches, matches) && Arc::ptr_eq(cached_assignments, assignments) {
                return Arc::clone(result);
            }
        }
        let result = Arc::new(unassigned_matches(matches, assignments));
        self.last = Some((Arc::clone(matches), Arc::clone(assignments), Arc::clone(&result)));
        result
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}
