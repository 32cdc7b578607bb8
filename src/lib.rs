pub mod types;
pub mod config;
pub mod grid;
pub mod ordering;
pub mod conflicts;
pub mod remote;
pub mod store_sim;
pub mod editor;

use types::*;
use config::*;
use editor::ScheduleEditor;
use remote::{HttpScheduleStore, ScheduleStore};
use store_sim::ScheduleStoreSim;

use std::{fs, sync::Arc};
use axum::{
    extract::State as AxumState,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

// ── Snapshot HTTP server ───────────────────────────────────────────────

const NO_CACHE_JSON: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Cache-Control", "no-store"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

fn snapshot_router<S: ScheduleStore + 'static>(editor: ScheduleEditor<S>) -> Router {
    Router::new()
        .route("/state.json", get(get_state_json::<S>))
        .route("/conflicts.json", get(get_conflicts_json::<S>))
        .with_state(editor)
}

async fn start_snapshot_server<S: ScheduleStore + 'static>(editor: ScheduleEditor<S>, addr: &str) {
    let app = snapshot_router(editor);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("snapshot server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("snapshot server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("snapshot server error: {e}");
    }
}

async fn get_state_json<S: ScheduleStore + 'static>(
    AxumState(editor): AxumState<ScheduleEditor<S>>,
) -> impl IntoResponse {
    let body = serde_json::to_string(&editor.snapshot()).unwrap_or_else(|_| "{}".to_string());
    (NO_CACHE_JSON, body)
}

async fn get_conflicts_json<S: ScheduleStore + 'static>(
    AxumState(editor): AxumState<ScheduleEditor<S>>,
) -> impl IntoResponse {
    let body = serde_json::to_string(&editor.conflict_view()).unwrap_or_else(|_| "{}".to_string());
    (NO_CACHE_JSON, body)
}

// ── Entry point ────────────────────────────────────────────────────────

fn log_editor_outcome<S: ScheduleStore>(editor: &ScheduleEditor<S>) {
    if let Some(err) = editor.last_error() {
        warn!("editor error {:?}: {}", err.scope, err.message);
        return;
    }
    let view = editor.conflict_view();
    info!(
        "schedule loaded: status {:?}, {} unassigned, {} team conflicts ({} unknown), {} ordering violations, {} overfilled cells",
        view.status,
        view.unassigned_total,
        view.known_team_conflict_count,
        view.unknown_team_match_count,
        view.ordering_violations.len(),
        view.slot_pressure.len()
    );
}

async fn serve_editor<S: ScheduleStore + 'static>(store: Arc<S>, config: &EditorConfig, tournament_id: Option<i64>) {
    let editor = ScheduleEditor::new(store);
    if let Some(tournament_id) = tournament_id {
        editor.initialize(tournament_id, config.version_id).await;
        log_editor_outcome(&editor);
    }
    start_snapshot_server(editor, &config.snapshot_addr).await;
}

pub async fn run() {
    load_env_file();

    // Initialize tracing with file output
    let logs_dir = logs_dir();
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "editor.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Schedule editor starting");

    let config = load_config_inner().unwrap_or_else(|e| {
        error!("{e}");
        apply_env_defaults(EditorConfig::default())
    });
    log_env_warnings(&config);

    if config.test_mode {
        let tournament_id = config.tournament_id.unwrap_or(1);
        match ScheduleStoreSim::demo(tournament_id) {
            Ok(sim) => serve_editor(Arc::new(sim), &config, Some(tournament_id)).await,
            Err(e) => error!("demo schedule store: {e}"),
        }
    } else {
        match HttpScheduleStore::new(&config) {
            Ok(store) => serve_editor(Arc::new(store), &config, config.tournament_id).await,
            Err(e) => error!("{e}"),
        }
    }
}
