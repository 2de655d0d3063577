use axum::{
    debug_handler,
    extract::{Path, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_graceful_shutdown::SubsystemHandle;

use lapgate_core::ReaderConfig;
use lapgate_server::{
    reader::ReaderStatusApi,
    timing::{unix_now, RaceView, TimingError},
    Session,
};

const PROFILES_URI: &str = "/api/profiles";
const PROFILE_URI: &str = "/api/profiles/{profile_id}";
const RACE_URI: &str = "/api/race";
const RACE_START_URI: &str = "/api/race/start";
const RACE_PAUSE_URI: &str = "/api/race/pause";
const RACE_FINISH_URI: &str = "/api/race/finish";
const RACE_RESET_URI: &str = "/api/race/reset";
const RACE_NEW_URI: &str = "/api/race/new";
const RACE_NAME_URI: &str = "/api/race/name";
const LAPS_DELETE_URI: &str = "/api/race/laps/delete";
const READER_URI: &str = "/api/reader";

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Socket operation failed")]
    Io(#[from] io::Error),
}

#[derive(Clone)]
pub struct Web {
    session: Session,
    shutdown_tx: broadcast::Sender<()>,
}

impl Web {
    pub fn new(session: Session) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Web {
            session,
            shutdown_tx,
        }
    }

    fn router(self) -> Router {
        Router::new()
            .route(PROFILES_URI, get(get_profiles))
            .route(PROFILE_URI, put(update_profile).delete(delete_profile))
            .route(RACE_URI, get(get_race))
            .route(RACE_START_URI, post(start_race))
            .route(RACE_PAUSE_URI, post(pause_race))
            .route(RACE_FINISH_URI, post(finish_race))
            .route(RACE_RESET_URI, post(reset_race))
            .route(RACE_NEW_URI, post(new_race))
            .route(RACE_NAME_URI, put(set_session_name))
            .route(LAPS_DELETE_URI, post(delete_laps))
            .route(READER_URI, get(get_reader))
            .layer(middleware::from_fn(no_cache_middleware))
            .with_state(self)
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), WebError> {
        let port = self.session.args().port;
        let listener =
            TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port))
                .await
                .map_err(WebError::Io)?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone(); // Clone as self is moved into router() below

        let app = self.router();

        log::info!("Starting HTTP web server on port {}", port);

        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                let _ = shutdown_tx.send(());
            },
            r = axum::serve(listener, app)
                    .with_graceful_shutdown(
                        async move {
                            _ = shutdown_rx.recv().await;
                        }
                    ) => {
                return r.map_err(WebError::Io);
            }
        }
        Ok(())
    }
}

/// Middleware to add no-cache headers to API responses
async fn no_cache_middleware(request: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

fn success() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Deserialize)]
struct ProfileUpdate {
    player_name: String,
    driver_number: u32,
}

/// GET /api/profiles - All checked-in riders
#[debug_handler]
async fn get_profiles(State(state): State<Web>) -> Response {
    Json(state.session.timing().profiles()).into_response()
}

/// PUT /api/profiles/{profile_id} - Set name and driver number
#[debug_handler]
async fn update_profile(
    State(state): State<Web>,
    Path(profile_id): Path<u32>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<serde_json::Value>, TimingError> {
    debug!("PUT profile {}", profile_id);
    state
        .session
        .timing()
        .update_profile(profile_id, update.player_name.trim(), update.driver_number)?;
    Ok(success())
}

/// DELETE /api/profiles/{profile_id}
#[debug_handler]
async fn delete_profile(
    State(state): State<Web>,
    Path(profile_id): Path<u32>,
) -> Result<Json<serde_json::Value>, TimingError> {
    debug!("DELETE profile {}", profile_id);
    state.session.timing().delete_profile(profile_id)?;
    Ok(success())
}

// =============================================================================
// Race
// =============================================================================

#[derive(Deserialize)]
struct SessionName {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct LapTimestamp {
    timestamp: f64,
}

/// GET /api/race - Session, laps and the live clock
#[debug_handler]
async fn get_race(State(state): State<Web>) -> Json<RaceView> {
    Json(state.session.timing().race_view(unix_now()))
}

async fn start_race(State(state): State<Web>) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().start(unix_now())?;
    Ok(success())
}

async fn pause_race(State(state): State<Web>) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().pause(unix_now())?;
    Ok(success())
}

async fn finish_race(State(state): State<Web>) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().finish(unix_now())?;
    Ok(success())
}

async fn reset_race(State(state): State<Web>) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().reset()?;
    Ok(success())
}

async fn new_race(State(state): State<Web>) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().new_session()?;
    Ok(success())
}

/// PUT /api/race/name - Empty or missing name restores the default
#[debug_handler]
async fn set_session_name(
    State(state): State<Web>,
    Json(body): Json<SessionName>,
) -> Result<Json<serde_json::Value>, TimingError> {
    state.session.timing().set_session_name(body.name.as_deref())?;
    Ok(success())
}

/// POST /api/race/laps/delete - Remove laps recorded at a timestamp
#[debug_handler]
async fn delete_laps(
    State(state): State<Web>,
    Json(body): Json<LapTimestamp>,
) -> Result<Json<serde_json::Value>, TimingError> {
    let removed = state.session.timing().delete_laps(body.timestamp)?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

// =============================================================================
// Reader
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReaderApi {
    source: &'static str,
    status: ReaderStatusApi,
    config: ReaderConfig,
}

/// GET /api/reader - Connection state and antenna setup
#[debug_handler]
async fn get_reader(State(state): State<Web>) -> Json<ReaderApi> {
    let session = &state.session;
    Json(ReaderApi {
        source: if session.args().emulator { "emulator" } else { "bridge" },
        status: session.reader_status().snapshot(),
        config: session.timing().config().clone(),
    })
}
