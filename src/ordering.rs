use crate::types::Match;
use std::cmp::Ordering;

// Display order for the unassigned queue. Nothing here is used to validate
// the grid; ordering integrity comes from the conflict report.

pub const EVENT_CATEGORY_PREFIXES: [&str; 2] = ["WOM_", "MIX_"];
pub const STAGE_PRECEDENCE: [&str; 3] = ["MAIN", "CONSOLATION", "PLACEMENT"];

pub fn event_category_rank(match_code: &str) -> usize {
    let code = match_code.trim().to_ascii_uppercase();
    EVENT_CATEGORY_PREFIXES
        .iter()
        .position(|prefix| code.starts_with(prefix))
        .unwrap_or(EVENT_CATEGORY_PREFIXES.len())
}

pub fn stage_rank(stage: &str) -> usize {
    let stage = stage.trim().to_ascii_uppercase();
    STAGE_PRECEDENCE
        .iter()
        .position(|known| *known == stage)
        .unwrap_or(STAGE_PRECEDENCE.len())
}

/// Missing values sort after every present value.
fn missing_last(value: Option<i64>) -> (bool, i64) {
    (value.is_none(), value.unwrap_or(0))
}

pub type MatchOrderKey = (usize, usize, (bool, i64), (bool, i64), i64);

pub fn match_order_key(m: &Match) -> MatchOrderKey {
    (
        event_category_rank(&m.match_code),
        stage_rank(&m.stage),
        missing_last(m.round_index),
        missing_last(m.sequence_in_round),
        m.match_id,
    )
}

pub fn compare_matches(a: &Match, b: &Match) -> Ordering {
    match_order_key(a).cmp(&match_order_key(b))
}

pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(compare_matches);
}

pub fn sorted_matches(matches: &[Match]) -> Vec<Match> {
    let mut out = matches.to_vec();
    sort_matches(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_match(
        match_id: i64,
        match_code: &str,
        stage: &str,
        round_index: Option<i64>,
        sequence_in_round: Option<i64>,
    ) -> Match {
        Match {
            match_id,
            match_code: match_code.to_string(),
            stage: stage.to_string(),
            round_index,
            sequence_in_round,
            duration_minutes: 60,
            team_a_id: None,
            team_b_id: None,
        }
    }

    fn ids(matches: &[Match]) -> Vec<i64> {
        matches.iter().map(|m| m.match_id).collect()
    }

    #[test]
    fn test_lower_sequence_wins_when_other_keys_tie() {
        let matches = vec![
            make_match(1, "WOM_A1", "MAIN", Some(1), Some(2)),
            make_match(2, "WOM_A1", "MAIN", Some(1), Some(1)),
        ];
        assert_eq!(ids(&sorted_matches(&matches)), vec![2, 1]);
    }

    #[test]
    fn test_event_category_then_stage() {
        let matches = vec![
            make_match(1, "OPEN_1", "MAIN", Some(1), Some(1)),
            make_match(2, "MIX_1", "MAIN", Some(1), Some(1)),
            make_match(3, "WOM_1", "PLACEMENT", Some(1), Some(1)),
            make_match(4, "WOM_2", "MAIN", Some(3), Some(1)),
            make_match(5, "wom_3", "SHOWCASE", Some(1), Some(1)),
        ];
        assert_eq!(ids(&sorted_matches(&matches)), vec![4, 3, 5, 2, 1]);
    }

    #[test]
    fn test_missing_round_and_sequence_sort_last() {
        let matches = vec![
            make_match(1, "WOM_A", "MAIN", None, Some(1)),
            make_match(2, "WOM_A", "MAIN", Some(9), Some(1)),
            make_match(3, "WOM_A", "MAIN", Some(9), None),
        ];
        assert_eq!(ids(&sorted_matches(&matches)), vec![2, 3, 1]);
    }

    #[test]
    fn test_match_id_breaks_full_ties() {
        let matches = vec![
            make_match(8, "MIX_A", "CONSOLATION", Some(2), Some(2)),
            make_match(3, "MIX_A", "CONSOLATION", Some(2), Some(2)),
        ];
        assert_eq!(ids(&sorted_matches(&matches)), vec![3, 8]);
    }

    fn arb_match() -> impl Strategy<Value = Match> {
        (
            0i64..50,
            prop::sample::select(vec!["WOM_A1", "MIX_B2", "OPEN_C3", ""]),
            prop::sample::select(vec!["MAIN", "CONSOLATION", "PLACEMENT", "POOL"]),
            prop::option::of(0i64..4),
            prop::option::of(0i64..4),
        )
            .prop_map(|(id, code, stage, round, seq)| make_match(id, code, stage, round, seq))
    }

    proptest! {
        #[test]
        fn prop_order_is_antisymmetric(a in arb_match(), b in arb_match()) {
            let forward = compare_matches(&a, &b);
            let backward = compare_matches(&b, &a);
            prop_assert_eq!(forward, backward.reverse());
            if match_order_key(&a) != match_order_key(&b) {
                prop_assert_ne!(forward, Ordering::Equal);
            }
        }

        #[test]
        fn prop_sort_is_idempotent(matches in proptest::collection::vec(arb_match(), 0..30)) {
            let once = sorted_matches(&matches);
            let twice = sorted_matches(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sorted_output_is_non_decreasing(matches in proptest::collection::vec(arb_match(), 0..30)) {
            let sorted = sorted_matches(&matches);
            for pair in sorted.windows(2) {
                prop_assert_ne!(compare_matches(&pair[0], &pair[1]), Ordering::Greater);
            }
        }
    }
}
