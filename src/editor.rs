use crate::conflicts::{normalize_report, ConflictView};
use crate::grid::GridIndex;
use crate::ordering::sorted_matches;
use crate::remote::ScheduleStore;
use crate::types::*;
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

/// Maps a failed grid/conflict load to its error scope. Conflict fetches
/// announce themselves in the message; everything else is a grid failure.
pub fn classify_load_failure(message: &str) -> ErrorScope {
    if message.to_ascii_lowercase().contains("conflict") {
        ErrorScope::LoadConflicts
    } else {
        ErrorScope::LoadGrid
    }
}

fn fallback_message(scope: ErrorScope) -> &'static str {
    match scope {
        ErrorScope::LoadVersions => "Failed to load schedule versions.",
        ErrorScope::LoadGrid => "Failed to load schedule grid.",
        ErrorScope::LoadConflicts => "Failed to load schedule conflicts.",
        ErrorScope::Patch => "Failed to update schedule assignment.",
        ErrorScope::Clone => "Failed to clone schedule version.",
    }
}

pub fn editor_error(scope: ErrorScope, message: &str) -> EditorError {
    let message = message.trim();
    EditorError {
        scope,
        message: if message.is_empty() {
            fallback_message(scope).to_string()
        } else {
            message.to_string()
        },
    }
}

/// Schedule editor over an injectable store. All state lives behind one
/// mutex that is never held across a store call, so operations may be
/// driven concurrently from clones of the same editor.
pub struct ScheduleEditor<S: ScheduleStore> {
    state: SharedEditorState,
    store: Arc<S>,
}

impl<S: ScheduleStore> Clone for ScheduleEditor<S> {
    fn clone(&self) -> Self {
        ScheduleEditor {
            state: Arc::clone(&self.state),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ScheduleStore> ScheduleEditor<S> {
    pub fn new(store: Arc<S>) -> Self {
        ScheduleEditor {
            state: Arc::new(Mutex::new(EditorState::default())),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_error(&self, scope: ErrorScope, message: &str) {
        let error = editor_error(scope, message);
        warn!("{:?}: {}", error.scope, error.message);
        self.lock().last_error = Some(error);
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Loads versions for a tournament, picks the active one, then loads
    /// its grid. Repeated calls for an already-loaded tournament do nothing
    /// unless they name a different version.
    pub async fn initialize(&self, tournament_id: i64, version_id: Option<i64>) {
        {
            let mut state = self.lock();
            let already_loaded = state.tournament_id == Some(tournament_id)
                && state.versions_loaded
                && (version_id.is_none() || version_id == state.version_id);
            if already_loaded {
                debug!("editor already initialized for tournament {tournament_id}");
                return;
            }
            if state.tournament_id != Some(tournament_id) {
                *state = EditorState::default();
            }
            state.tournament_id = Some(tournament_id);
            state.last_error = None;
        }
        info!("initializing schedule editor for tournament {tournament_id}");

        if !self.load_versions().await {
            return;
        }

        {
            let mut state = self.lock();
            if state.tournament_id != Some(tournament_id) {
                debug!("initialize for tournament {tournament_id} superseded");
                return;
            }
            let selected = version_id
                .or_else(|| {
                    state
                        .versions
                        .iter()
                        .find(|v| v.status == VersionStatus::Draft)
                        .map(|v| v.id)
                })
                .or_else(|| state.versions.first().map(|v| v.id));
            let Some(selected) = selected else {
                debug!("tournament {tournament_id} has no schedule versions");
                return;
            };
            state.version_status = state.versions.iter().find(|v| v.id == selected).map(|v| v.status);
            state.version_id = Some(selected);
        }

        self.load_grid_and_conflicts(false).await;
    }

    /// Replaces the version list. A failure leaves the previous list alone.
    pub async fn load_versions(&self) -> bool {
        let tournament_id = {
            let mut state = self.lock();
            let Some(tournament_id) = state.tournament_id else {
                drop(state);
                self.record_error(ErrorScope::LoadVersions, "No tournament selected.");
                return false;
            };
            state.loading_versions = true;
            state.last_error = None;
            if state.phase == EditorPhase::Uninitialized {
                state.phase = EditorPhase::LoadingVersions;
            }
            tournament_id
        };

        let result = self.store.get_schedule_versions(tournament_id).await;

        let mut state = self.lock();
        if state.tournament_id != Some(tournament_id) {
            debug!("discarding versions for stale tournament {tournament_id}");
            return false;
        }
        state.loading_versions = false;
        match result {
            Ok(versions) => {
                info!("loaded {} schedule versions for tournament {tournament_id}", versions.len());
                if let Some(active) = state.version_id {
                    if let Some(version) = versions.iter().find(|v| v.id == active) {
                        state.version_status = Some(version.status);
                    }
                }
                state.versions = versions;
                state.versions_loaded = true;
                if state.phase == EditorPhase::LoadingVersions {
                    state.phase = EditorPhase::VersionsLoaded;
                }
                true
            }
            Err(message) => {
                if state.phase == EditorPhase::LoadingVersions {
                    state.phase = if state.versions_loaded {
                        EditorPhase::VersionsLoaded
                    } else {
                        EditorPhase::Uninitialized
                    };
                }
                let error = editor_error(ErrorScope::LoadVersions, &message);
                warn!("load versions failed: {}", error.message);
                state.last_error = Some(error);
                false
            }
        }
    }

    /// Fetches the grid and the conflict report together and swaps in the
    /// result only when both arrive. `silent` leaves the loading flag and
    /// any existing error untouched.
    pub async fn load_grid_and_conflicts(&self, silent: bool) -> bool {
        let (tournament_id, version_id, previous_phase) = {
            let mut state = self.lock();
            let (Some(tournament_id), Some(version_id)) = (state.tournament_id, state.version_id) else {
                drop(state);
                self.record_error(ErrorScope::LoadGrid, "No schedule version selected.");
                return false;
            };
            let previous_phase = state.phase;
            if !silent {
                state.loading_grid = true;
                state.last_error = None;
                state.phase = EditorPhase::LoadingGrid;
            }
            (tournament_id, version_id, previous_phase)
        };
        debug!("loading grid for tournament {tournament_id} version {version_id} (silent: {silent})");

        let (grid, report) = tokio::join!(
            self.store.get_schedule_grid(tournament_id, version_id),
            self.store.get_conflicts(tournament_id, version_id),
        );

        let mut state = self.lock();
        if state.tournament_id != Some(tournament_id) || state.version_id != Some(version_id) {
            debug!("discarding grid for stale version {version_id}");
            return false;
        }
        if !silent {
            state.loading_grid = false;
        }
        match (grid, report) {
            (Ok(grid), Ok(report)) => {
                let index = GridIndex::build(&grid.slots, &grid.assignments, &grid.matches);
                info!(
                    "grid ready: {} slots, {} assignments, {} matches",
                    grid.slots.len(),
                    grid.assignments.len(),
                    grid.matches.len()
                );
                state.slots = Arc::new(grid.slots);
                state.assignments = Arc::new(grid.assignments);
                state.matches = Arc::new(grid.matches);
                state.teams = Arc::new(grid.teams);
                state.index = index;
                state.conflicts = Some(normalize_report(report));
                state.phase = EditorPhase::Ready;
                true
            }
            (Err(message), _) | (_, Err(message)) => {
                let scope = classify_load_failure(&message);
                let error = editor_error(scope, &message);
                warn!("grid load failed ({:?}): {}", error.scope, error.message);
                state.last_error = Some(error);
                // A silent reload never moved the phase, so it has nothing to restore.
                if !silent && state.phase == EditorPhase::LoadingGrid {
                    state.phase = if previous_phase == EditorPhase::Ready {
                        EditorPhase::Ready
                    } else {
                        EditorPhase::VersionsLoaded
                    };
                }
                false
            }
        }
    }

    /// Makes a listed version active and reloads. Unknown ids are ignored.
    pub async fn switch_version(&self, version_id: i64) {
        {
            let mut state = self.lock();
            let Some(status) = state.versions.iter().find(|v| v.id == version_id).map(|v| v.status) else {
                debug!("ignoring switch to unknown version {version_id}");
                return;
            };
            state.version_id = Some(version_id);
            state.version_status = Some(status);
        }
        info!("switched to schedule version {version_id}");
        self.load_grid_and_conflicts(false).await;
    }

    /// Clones the active final version into a draft and makes the draft
    /// active. Does nothing for a draft.
    pub async fn clone_to_edit(&self) {
        let (tournament_id, version_id) = {
            let mut state = self.lock();
            if state.version_status != Some(VersionStatus::Final) {
                return;
            }
            let (Some(tournament_id), Some(version_id)) = (state.tournament_id, state.version_id) else {
                return;
            };
            state.pending.cloning = true;
            state.last_error = None;
            (tournament_id, version_id)
        };
        info!("cloning schedule version {version_id}");

        let result = async {
            let clone = self.store.clone_schedule_version(tournament_id, version_id).await?;
            let versions = self.store.get_schedule_versions(tournament_id).await?;
            Ok::<_, String>((clone, versions))
        }
        .await;

        let reload = {
            let mut state = self.lock();
            if state.tournament_id != Some(tournament_id) {
                return;
            }
            match result {
                Ok((clone, versions)) => {
                    let status = versions
                        .iter()
                        .find(|v| v.id == clone.id)
                        .map(|v| v.status)
                        .unwrap_or(clone.status);
                    info!("cloned version {version_id} into draft {}", clone.id);
                    state.versions = versions;
                    state.versions_loaded = true;
                    state.version_id = Some(clone.id);
                    state.version_status = Some(status);
                    true
                }
                Err(message) => {
                    let error = editor_error(ErrorScope::Clone, &message);
                    warn!("clone failed: {}", error.message);
                    state.last_error = Some(error);
                    state.pending.cloning = false;
                    false
                }
            }
        };

        if reload {
            self.load_grid_and_conflicts(false).await;
            let mut state = self.lock();
            if state.tournament_id == Some(tournament_id) {
                state.pending.cloning = false;
            }
        }
    }

    /// Returns the editor to its initial state. Responses still in flight
    /// for the old tournament are dropped when they arrive.
    pub fn reset(&self) {
        *self.lock() = EditorState::default();
        debug!("schedule editor reset");
    }

    // ── Mutations ──────────────────────────────────────────────────────

    fn begin_mutation(&self, pending_key: i64) -> Option<(i64, i64)> {
        let mut state = self.lock();
        let (Some(tournament_id), Some(version_id)) = (state.tournament_id, state.version_id) else {
            state.last_error = Some(editor_error(ErrorScope::Patch, "No schedule version selected."));
            return None;
        };
        if state.version_status == Some(VersionStatus::Final) {
            warn!("rejected edit of final version {version_id}");
            state.last_error = Some(editor_error(ErrorScope::Patch, CLONE_FIRST_MESSAGE));
            return None;
        }
        state.pending.patching_assignment_id = Some(pending_key);
        state.last_error = None;
        Some((tournament_id, version_id))
    }

    /// Issues one store mutation and always follows it with a silent
    /// reload, whether the mutation succeeded or not.
    async fn mutate<F, Fut>(&self, pending_key: i64, action: &str, request: F)
    where
        F: FnOnce(i64, i64) -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let Some((tournament_id, version_id)) = self.begin_mutation(pending_key) else {
            return;
        };
        info!("{action} {pending_key} in version {version_id}");

        if let Err(message) = request(tournament_id, version_id).await {
            self.record_error(ErrorScope::Patch, &message);
        }

        self.load_grid_and_conflicts(true).await;

        let mut state = self.lock();
        if state.pending.patching_assignment_id == Some(pending_key) {
            state.pending.patching_assignment_id = None;
        }
    }

    pub async fn move_assignment(&self, assignment_id: i64, new_slot_id: i64) {
        let store = Arc::clone(&self.store);
        self.mutate(assignment_id, "move assignment", move |tournament_id, _| async move {
            store
                .update_assignment(tournament_id, assignment_id, new_slot_id)
                .await
                .map(|_| ())
        })
        .await;
    }

    /// Pending key is the match id, since no assignment exists yet.
    pub async fn assign_match(&self, match_id: i64, slot_id: i64) {
        let store = Arc::clone(&self.store);
        self.mutate(match_id, "assign match", move |tournament_id, version_id| async move {
            let request = NewAssignment {
                schedule_version_id: version_id,
                match_id,
                slot_id,
            };
            store.create_assignment(tournament_id, &request).await.map(|_| ())
        })
        .await;
    }

    pub async fn unassign_match(&self, assignment_id: i64) {
        let store = Arc::clone(&self.store);
        self.mutate(assignment_id, "unassign", move |tournament_id, _| async move {
            store.delete_assignment(tournament_id, assignment_id).await
        })
        .await;
    }

    // ── Reads ──────────────────────────────────────────────────────────

    pub fn phase(&self) -> EditorPhase {
        self.lock().phase
    }

    pub fn active_version(&self) -> (Option<i64>, Option<VersionStatus>) {
        let state = self.lock();
        (state.version_id, state.version_status)
    }

    pub fn last_error(&self) -> Option<EditorError> {
        self.lock().last_error.clone()
    }

    pub fn pending(&self) -> PendingOps {
        self.lock().pending.clone()
    }

    pub fn is_patching(&self, key: i64) -> bool {
        self.lock().pending.patching_assignment_id == Some(key)
    }

    pub fn can_edit(&self) -> bool {
        let state = self.lock();
        state.version_id.is_some() && state.version_status != Some(VersionStatus::Final)
    }

    pub fn assignments(&self) -> Arc<Vec<Assignment>> {
        Arc::clone(&self.lock().assignments)
    }

    pub fn conflicts(&self) -> Option<ConflictReport> {
        self.lock().conflicts.clone()
    }

    pub fn conflict_view(&self) -> ConflictView {
        ConflictView::from_report(self.lock().conflicts.as_ref())
    }

    /// Matches with no assignment in the active version. Returns the same
    /// `Arc` until the grid is replaced.
    pub fn unassigned_matches(&self) -> Arc<Vec<Match>> {
        let mut state = self.lock();
        let EditorState {
            matches,
            assignments,
            unassigned_cache,
            ..
        } = &mut *state;
        unassigned_cache.get(matches, assignments)
    }

    /// Which slots a placed match covers, for rendering multi-row matches.
    pub fn occupied_slot_ids(&self, slot_id: i64, match_id: i64) -> Vec<i64> {
        let state = self.lock();
        let duration = state
            .index
            .match_by_id(match_id)
            .map(|m| m.duration_minutes)
            .unwrap_or(DEFAULT_MATCH_DURATION_MINUTES);
        state.index.occupied_slot_ids(slot_id, duration)
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        let mut guard = self.lock();
        let state = &mut *guard;
        let unassigned = state.unassigned_cache.get(&state.matches, &state.assignments);
        EditorSnapshot {
            phase: state.phase,
            tournament_id: state.tournament_id,
            version_id: state.version_id,
            version_status: state.version_status,
            can_edit: state.version_id.is_some() && state.version_status != Some(VersionStatus::Final),
            versions: state.versions.clone(),
            slots: state.slots.to_vec(),
            assignments: state.assignments.to_vec(),
            matches: state.matches.to_vec(),
            unassigned_queue: sorted_matches(&unassigned),
            conflicts: ConflictView::from_report(state.conflicts.as_ref()),
            pending: state.pending.clone(),
            loading_versions: state.loading_versions,
            loading_grid: state.loading_grid,
            last_error: state.last_error.clone(),
        }
    }
}
