use crate::grid::{clamp_duration, parse_time_minutes, unassigned_matches, GridIndex};
use crate::ordering::{event_category_rank, sorted_matches};
use crate::types::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

// ── Report normalization ───────────────────────────────────────────────

/// Fills in values a partial report leaves inconsistent. Sections already
/// default to empty on deserialization; this only repairs the summary.
pub fn normalize_report(mut report: ConflictReport) -> ConflictReport {
    let summary = &mut report.summary;
    summary.unassigned_matches = summary.unassigned_matches.max(report.unassigned.len());
    if !summary.assignment_rate.is_finite() {
        summary.assignment_rate = if summary.total_matches > 0 {
            summary.assigned_matches as f64 / summary.total_matches as f64
        } else {
            0.0
        };
    }
    summary.assignment_rate = summary.assignment_rate.clamp(0.0, 1.0);
    report
}

// ── Presentation view ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportStatus {
    NotLoaded,
    AllClear,
    Issues,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictView {
    pub status: ReportStatus,
    pub summary: ConflictSummary,
    pub unassigned_total: usize,
    pub unassigned_preview: Vec<Match>,
    pub unassigned_remaining: usize,
    pub known_team_conflict_count: usize,
    /// Not yet checkable, which is different from conflict-free.
    pub unknown_team_match_count: usize,
    pub team_conflicts: Vec<TeamConflict>,
    pub ordering_violations: Vec<OrderingViolation>,
    pub slot_pressure: Vec<SlotPressure>,
}

impl ConflictView {
    pub fn from_report(report: Option<&ConflictReport>) -> Self {
        let Some(report) = report else {
            return ConflictView {
                status: ReportStatus::NotLoaded,
                summary: ConflictSummary::default(),
                unassigned_total: 0,
                unassigned_preview: Vec::new(),
                unassigned_remaining: 0,
                known_team_conflict_count: 0,
                unknown_team_match_count: 0,
                team_conflicts: Vec::new(),
                ordering_violations: Vec::new(),
                slot_pressure: Vec::new(),
            };
        };

        let unassigned_total = report.summary.unassigned_matches.max(report.unassigned.len());
        let mut preview = sorted_matches(&report.unassigned);
        preview.truncate(UNASSIGNED_PREVIEW_LIMIT);
        let unassigned_remaining = unassigned_total.saturating_sub(preview.len());
        let known_team_conflict_count = report.team_conflicts.conflicts.len();

        let all_clear = unassigned_total == 0
            && report.ordering_violations.is_empty()
            && report.slot_pressure.is_empty()
            && known_team_conflict_count == 0;

        ConflictView {
            status: if all_clear { ReportStatus::AllClear } else { ReportStatus::Issues },
            summary: report.summary.clone(),
            unassigned_total,
            unassigned_preview: preview,
            unassigned_remaining,
            known_team_conflict_count,
            unknown_team_match_count: report.team_conflicts.unknown_team_match_count,
            team_conflicts: report.team_conflicts.conflicts.clone(),
            ordering_violations: report.ordering_violations.clone(),
            slot_pressure: report.slot_pressure.clone(),
        }
    }
}

// ── Local analysis ─────────────────────────────────────────────────────

struct Placed<'a> {
    m: &'a Match,
    slot_id: i64,
    day_date: &'a str,
    start: i64,
    end: i64,
}

impl Placed<'_> {
    fn overlaps(&self, other: &Placed<'_>) -> bool {
        self.day_date == other.day_date && self.start < other.end && other.start < self.end
    }
}

/// Builds a conflict report from a grid snapshot. Only direct time overlap
/// is checked; rest time between matches is not a rule here.
pub fn analyze_grid(grid: &ScheduleGrid) -> ConflictReport {
    let index = GridIndex::build(&grid.slots, &grid.assignments, &grid.matches);
    let team_names: HashMap<i64, &str> =
        grid.teams.iter().map(|team| (team.id, team.name.as_str())).collect();

    let unassigned = unassigned_matches(&grid.matches, &grid.assignments);
    let total_matches = grid.matches.len();
    let assigned_matches = total_matches - unassigned.len();
    let summary = ConflictSummary {
        total_slots: grid.slots.len(),
        total_matches,
        assigned_matches,
        unassigned_matches: unassigned.len(),
        assignment_rate: if total_matches > 0 {
            assigned_matches as f64 / total_matches as f64
        } else {
            0.0
        },
    };

    let mut placed: Vec<Placed<'_>> = Vec::new();
    for assignment in &grid.assignments {
        let (Some(m), Some(slot)) = (
            index.match_by_id(assignment.match_id),
            index.slot(assignment.slot_id),
        ) else {
            continue;
        };
        let Some(start) = parse_time_minutes(&slot.start_time) else {
            continue;
        };
        placed.push(Placed {
            m,
            slot_id: slot.slot_id,
            day_date: slot.day_date.trim(),
            start,
            end: start + clamp_duration(m.duration_minutes),
        });
    }
    placed.sort_by_key(|p| (p.day_date.to_string(), p.start, p.m.match_id));

    let mut team_conflicts = TeamConflictSection::default();
    for (i, a) in placed.iter().enumerate() {
        let (Some(a1), Some(a2)) = (a.m.team_a_id, a.m.team_b_id) else {
            team_conflicts.unknown_team_match_count += 1;
            continue;
        };
        for b in &placed[i + 1..] {
            let (Some(b1), Some(b2)) = (b.m.team_a_id, b.m.team_b_id) else {
                continue;
            };
            if !a.overlaps(b) {
                continue;
            }
            let shared: HashSet<i64> = [a1, a2]
                .into_iter()
                .filter(|team| *team == b1 || *team == b2)
                .collect();
            let mut shared: Vec<i64> = shared.into_iter().collect();
            shared.sort();
            for team_id in shared {
                team_conflicts.conflicts.push(TeamConflict {
                    team_id,
                    team_name: team_names.get(&team_id).map(|name| name.to_string()),
                    match_a_id: a.m.match_id,
                    match_b_id: b.m.match_id,
                    slot_a_id: Some(a.slot_id),
                    slot_b_id: Some(b.slot_id),
                });
            }
        }
    }

    let mut ordering_violations = Vec::new();
    for earlier in &placed {
        for later in &placed {
            let (Some(earlier_round), Some(later_round)) =
                (earlier.m.round_index, later.m.round_index)
            else {
                continue;
            };
            if earlier_round >= later_round
                || event_category_rank(&earlier.m.match_code) != event_category_rank(&later.m.match_code)
                || !earlier.m.stage.eq_ignore_ascii_case(&later.m.stage)
            {
                continue;
            }
            // ISO dates compare correctly as strings.
            if (later.day_date, later.start) < (earlier.day_date, earlier.end) {
                ordering_violations.push(OrderingViolation {
                    earlier_match_id: earlier.m.match_id,
                    later_match_id: later.m.match_id,
                    reason: format!(
                        "{} (round {later_round}) starts before {} (round {earlier_round}) finishes",
                        later.m.match_code, earlier.m.match_code
                    ),
                });
            }
        }
    }

    let mut coverage: BTreeMap<i64, usize> = BTreeMap::new();
    for p in &placed {
        for slot_id in index.occupied_slot_ids(p.slot_id, p.m.duration_minutes) {
            *coverage.entry(slot_id).or_insert(0) += 1;
        }
    }
    let slot_pressure = coverage
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(slot_id, assigned_count)| SlotPressure {
            slot_id,
            assigned_count,
            expected_count: 1,
        })
        .collect();

    ConflictReport {
        summary,
        unassigned,
        team_conflicts,
        ordering_violations,
        slot_pressure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(slot_id: i64, start_time: &str, court_id: i64) -> Slot {
        Slot {
            slot_id,
            day_date: "2026-03-14".to_string(),
            start_time: start_time.to_string(),
            court_id,
            court_label: format!("Court {court_id}"),
        }
    }

    fn make_match(match_id: i64, round_index: i64, teams: Option<(i64, i64)>) -> Match {
        Match {
            match_id,
            match_code: format!("WOM_R{round_index}_{match_id}"),
            stage: "MAIN".to_string(),
            round_index: Some(round_index),
            sequence_in_round: Some(match_id),
            duration_minutes: 30,
            team_a_id: teams.map(|t| t.0),
            team_b_id: teams.map(|t| t.1),
        }
    }

    fn assign(id: i64, slot_id: i64, match_id: i64) -> Assignment {
        Assignment { id, slot_id, match_id, schedule_version_id: 1 }
    }

    fn quarter_hour_slots() -> Vec<Slot> {
        vec![
            slot(1, "09:00", 1),
            slot(2, "09:15", 1),
            slot(3, "09:30", 1),
            slot(4, "09:45", 1),
            slot(5, "09:00", 2),
            slot(6, "09:15", 2),
            slot(7, "09:30", 2),
            slot(8, "09:45", 2),
        ]
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let report: ConflictReport = serde_json::from_str(r#"{"summary": null}"#).unwrap();
        assert_eq!(report, ConflictReport::default());

        let report: ConflictReport = serde_json::from_str(
            r#"{"team_conflicts": {"unknown_team_match_count": 4}, "slot_pressure": null}"#,
        )
        .unwrap();
        assert_eq!(report.team_conflicts.unknown_team_match_count, 4);
        assert!(report.team_conflicts.conflicts.is_empty());
        assert!(report.slot_pressure.is_empty());
    }

    #[test]
    fn test_normalize_clamps_rate() {
        let mut report = ConflictReport::default();
        report.summary.assignment_rate = 1.7;
        assert_eq!(normalize_report(report).summary.assignment_rate, 1.0);

        let mut report = ConflictReport::default();
        report.summary.total_matches = 4;
        report.summary.assigned_matches = 1;
        report.summary.assignment_rate = f64::NAN;
        assert_eq!(normalize_report(report).summary.assignment_rate, 0.25);
    }

    #[test]
    fn test_view_distinguishes_not_loaded_from_all_clear() {
        let view = ConflictView::from_report(None);
        assert_eq!(view.status, ReportStatus::NotLoaded);

        let view = ConflictView::from_report(Some(&ConflictReport::default()));
        assert_eq!(view.status, ReportStatus::AllClear);
    }

    #[test]
    fn test_unknown_teams_do_not_block_all_clear() {
        let mut report = ConflictReport::default();
        report.team_conflicts.unknown_team_match_count = 12;

        let view = ConflictView::from_report(Some(&report));
        assert_eq!(view.status, ReportStatus::AllClear);
        assert_eq!(view.unknown_team_match_count, 12);
        assert_eq!(view.known_team_conflict_count, 0);
    }

    #[test]
    fn test_unassigned_preview_truncates_without_touching_report() {
        let mut report = ConflictReport::default();
        report.unassigned = (1..=13).rev().map(|id| make_match(id, 1, None)).collect();
        report.summary.unassigned_matches = 13;

        let view = ConflictView::from_report(Some(&report));

        assert_eq!(view.status, ReportStatus::Issues);
        assert_eq!(view.unassigned_preview.len(), 10);
        assert_eq!(view.unassigned_preview[0].match_id, 1);
        assert_eq!(view.unassigned_remaining, 3);
        assert_eq!(report.unassigned.len(), 13);
        assert_eq!(report.unassigned[0].match_id, 13);
    }

    #[test]
    fn test_analyze_counts_and_unassigned() {
        let grid = ScheduleGrid {
            slots: quarter_hour_slots(),
            assignments: vec![assign(10, 1, 1)],
            matches: vec![make_match(1, 1, None), make_match(2, 1, None)],
            teams: Vec::new(),
        };

        let report = analyze_grid(&grid);

        assert_eq!(report.summary.total_slots, 8);
        assert_eq!(report.summary.assigned_matches, 1);
        assert_eq!(report.summary.unassigned_matches, 1);
        assert_eq!(report.summary.assignment_rate, 0.5);
        assert_eq!(report.unassigned[0].match_id, 2);
        assert_eq!(report.team_conflicts.unknown_team_match_count, 1);
        assert!(report.team_conflicts.conflicts.is_empty());
    }

    #[test]
    fn test_analyze_detects_shared_team_overlap() {
        let grid = ScheduleGrid {
            slots: quarter_hour_slots(),
            assignments: vec![assign(10, 1, 1), assign(11, 6, 2), assign(12, 7, 3)],
            matches: vec![
                make_match(1, 1, Some((100, 200))),
                make_match(2, 1, Some((300, 100))),
                // Starts 09:30 on court 2; match 1 ends 09:30.
                make_match(3, 1, Some((100, 400))),
            ],
            teams: vec![Team { id: 100, name: "Harbor".to_string() }],
        };

        let report = analyze_grid(&grid);

        assert_eq!(report.team_conflicts.conflicts.len(), 2);
        let first = &report.team_conflicts.conflicts[0];
        assert_eq!((first.match_a_id, first.match_b_id, first.team_id), (1, 2, 100));
        assert_eq!(first.team_name.as_deref(), Some("Harbor"));
        let second = &report.team_conflicts.conflicts[1];
        assert_eq!((second.match_a_id, second.match_b_id), (2, 3));
        assert_eq!(report.team_conflicts.unknown_team_match_count, 0);
    }

    #[test]
    fn test_analyze_flags_later_round_scheduled_first() {
        let grid = ScheduleGrid {
            slots: quarter_hour_slots(),
            assignments: vec![assign(10, 3, 1), assign(11, 5, 2)],
            matches: vec![make_match(1, 1, None), make_match(2, 2, None)],
            teams: Vec::new(),
        };

        let report = analyze_grid(&grid);

        assert_eq!(report.ordering_violations.len(), 1);
        let violation = &report.ordering_violations[0];
        assert_eq!((violation.earlier_match_id, violation.later_match_id), (1, 2));
        assert!(violation.reason.contains("round 2"));
    }

    #[test]
    fn test_analyze_reports_overlapping_cells() {
        let mut long_match = make_match(1, 1, None);
        long_match.duration_minutes = 45;
        let grid = ScheduleGrid {
            slots: quarter_hour_slots(),
            assignments: vec![assign(10, 1, 1), assign(11, 2, 2)],
            matches: vec![long_match, make_match(2, 1, None)],
            teams: Vec::new(),
        };

        let report = analyze_grid(&grid);

        let pressured: Vec<(i64, usize)> = report
            .slot_pressure
            .iter()
            .map(|p| (p.slot_id, p.assigned_count))
            .collect();
        assert_eq!(pressured, vec![(2, 2), (3, 2)]);
    }

    #[test]
    fn test_analyze_survives_extreme_duration() {
        let mut endless = make_match(1, 1, Some((100, 200)));
        endless.duration_minutes = i64::MAX;
        let grid = ScheduleGrid {
            slots: quarter_hour_slots(),
            assignments: vec![assign(10, 1, 1), assign(11, 4, 2)],
            matches: vec![endless, make_match(2, 1, Some((100, 300)))],
            teams: Vec::new(),
        };

        let report = analyze_grid(&grid);

        // Clamped to a day, so it still runs through the 09:45 cell.
        assert_eq!(report.team_conflicts.conflicts.len(), 1);
        let pressured: Vec<i64> = report.slot_pressure.iter().map(|p| p.slot_id).collect();
        assert_eq!(pressured, vec![4]);
    }
}
