use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};

use crate::error::Result;
use crate::simulator::Simulator;
use crate::workload::WorkloadType;

/// HTTP/SSE reference adapter over the simulator control surface.
/// Transport failures stay in here; nothing I/O-related ever reaches
/// the core's state.
pub struct Server {
    addr: SocketAddr,
    simulator: Arc<Simulator>,
}

impl Server {
    pub fn new(addr: SocketAddr, simulator: Arc<Simulator>) -> Server {
        Server { addr, simulator }
    }

    pub async fn serve(self, mut done: broadcast::Receiver<()>) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("listening on {}", listener.local_addr()?);
        let app = router(self.simulator);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = done.recv().await;
            })
            .await?;
        Ok(())
    }
}

pub fn router(simulator: Arc<Simulator>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/simulate/start", post(simulate_start))
        .route("/simulate/stop", post(simulate_stop))
        .route("/events/stream", get(events_stream))
        .fallback(not_found)
        .layer(middleware::from_fn(cors))
        .with_state(simulator)
}

/// Counter snapshot returned by `GET /metrics`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub total_accesses: u64,
    pub page_faults: u64,
    pub page_fault_rate: f64,
    pub swap_ins: u64,
    pub swap_outs: u64,
    pub ai_predictions: u64,
    pub ai_hit_rate: f64,
    pub ai_prediction_confidence: f64,
    pub free_frames: u64,
    pub used_frames: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub workload: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    pub workload_type: String,
    pub ai_mode: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

async fn metrics(State(simulator): State<Arc<Simulator>>) -> Json<MetricsResponse> {
    let (snapshot, free_frames, used_frames) = simulator.metrics();
    Json(MetricsResponse {
        total_accesses: snapshot.total_accesses,
        page_faults: snapshot.page_faults,
        page_fault_rate: snapshot.page_fault_rate,
        swap_ins: snapshot.swap_ins,
        swap_outs: snapshot.swap_outs,
        ai_predictions: snapshot.ai_predictions,
        ai_hit_rate: snapshot.ai_hit_rate,
        ai_prediction_confidence: snapshot.ai_prediction_confidence,
        free_frames: free_frames as u64,
        used_frames: used_frames as u64,
    })
}

async fn simulate_start(State(simulator): State<Arc<Simulator>>, body: Bytes) -> Response {
    let request: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(err) => return bad_request(format!("invalid JSON body: {}", err)),
        }
    };
    let mode = request.mode.unwrap_or_else(|| "prefetch_only".to_string());
    let workload = request.workload.unwrap_or_else(|| "random".to_string());
    let workload_type: WorkloadType = match workload.parse() {
        Ok(workload_type) => workload_type,
        Err(err) => return bad_request(err.to_string()),
    };
    // any mode other than ai_off enables predictions
    let enable_ai = mode != "ai_off";
    if let Err(err) = simulator.start(enable_ai, workload_type) {
        error!("failed to start simulation: {}", err);
        return bad_request(err.to_string());
    }
    Json(StartResponse { status: "started".to_string(), workload_type: workload, ai_mode: mode })
        .into_response()
}

async fn simulate_stop(State(simulator): State<Arc<Simulator>>) -> Json<StopResponse> {
    simulator.stop();
    Json(StopResponse { status: "stopped".to_string() })
}

/// Server-sent events: one `data: <json>` frame per simulator event.
async fn events_stream(
    State(simulator): State<Arc<Simulator>>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let rx = simulator.subscribe_events();
    let stream = BroadcastStream::new(rx).filter_map(|event| match event {
        Ok(event) => {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(SseEvent::default().data(payload)))
        }
        // this subscriber lagged and lost its oldest events, keep going
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: "Not Found".to_string() }))
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

/// Browser clients call from another origin: answer preflight directly
/// and stamp the CORS headers on every response.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}
