// src/main.rs
use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod attendance;
mod config;
mod notify;
mod schedule_parser;

use attendance::{AttendanceError, AttendanceSystem, LoginReceipt};
use config::{load_seed_data, Config};
use notify::{PenaltyAlert, PenaltyNotifier, WebhookNotifier};
use schedule_parser::parse_due_moment;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Attendance error")]
    Attendance(#[from] AttendanceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        error!("Error occurred: {:?}", self);
        let (status_code, error_message) = match &self {
            AppError::Attendance(attendance_err) => match attendance_err {
                AttendanceError::EmployeeNotFound { .. }
                | AttendanceError::OrganizationNotFound { .. } => {
                    (StatusCode::NOT_FOUND, attendance_err.to_string())
                }
                AttendanceError::PenaltyLeaveTypeNotDefined { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, attendance_err.to_string())
                }
            },
        };
        (status_code, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub system: AttendanceSystem,
    pub notifier: Option<Arc<WebhookNotifier>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    info!("Tracing subscriber initialized.");

    let app_config = Config::from_env().context("Loading configuration from environment failed")?;
    info!("App configuration loaded.");

    let system = AttendanceSystem::new();
    let seed = load_seed_data(Path::new(&app_config.seed_data_path))?;
    for organization in seed.organizations {
        system.register_organization(organization);
    }
    for employee in seed.employees {
        system.register_employee(employee);
    }
    for leave_type in seed.leave_types {
        system.register_leave_type(leave_type);
    }
    let (organizations, employees, _, _) = system.counts();
    info!(
        "Attendance system seeded: {} organizations, {} employees.",
        organizations, employees
    );

    let notifier = app_config.penalty_webhook_url.clone().map(|url| {
        info!("Penalty webhook notifications enabled.");
        Arc::new(WebhookNotifier::new(url))
    });
    if notifier.is_none() {
        info!("No penalty webhook configured; notices will only be logged.");
    }

    let app_state = AppState { system, notifier };

    let attendance_routes = Router::new()
        .route("/login", post(handle_attendance_login))
        .route("/logout", post(handle_attendance_logout));
    let task_routes = Router::new().route("/schedule", post(handle_task_schedule));
    let api_routes = Router::new()
        .nest("/attendance", attendance_routes)
        .nest("/tasks", task_routes);
    let app = Router::new()
        .nest("/api", api_routes)
        .route("/status", get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    info!("Starting server on http://{}", app_config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", app_config.bind_addr))?;
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

// --- Attendance Handlers ---

#[derive(Debug, Deserialize)]
struct LoginRequest {
    employee_id: String,
}

async fn handle_attendance_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginReceipt>, AppError> {
    info!("Handling /api/attendance/login for {}...", request.employee_id);
    let receipt = state.system.record_login(&request.employee_id, Utc::now())?;

    if receipt.outcome.is_penalty() {
        if let Some(notifier) = state.notifier.clone() {
            let employee_name = state
                .system
                .get_employee(&receipt.employee_id)
                .map(|e| e.name)
                .unwrap_or_default();
            let alert = PenaltyAlert {
                employee_id: receipt.employee_id.clone(),
                employee_name,
                organization_id: receipt.organization_id.clone(),
                outcome: receipt.outcome.clone(),
            };
            // Fire and forget; the login response never waits on the webhook.
            tokio::spawn(async move {
                if let Err(e) = notifier.send_penalty_notice(&alert).await {
                    warn!("Failed to deliver penalty notice: {}", e);
                }
            });
        }
    }

    Ok(Json(receipt))
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    employee_id: String,
    recorded_at: NaiveDateTime,
}

async fn handle_attendance_logout(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LogoutResponse>, AppError> {
    info!("Handling /api/attendance/logout for {}...", request.employee_id);
    let recorded_at = state.system.record_logout(&request.employee_id, Utc::now())?;
    Ok(Json(LogoutResponse {
        employee_id: request.employee_id,
        recorded_at,
    }))
}

// --- Task Schedule Handler ---

#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    prompt: String,
    /// Resolves "today"/"tomorrow" in the employee's organization wall clock;
    /// falls back to UTC when absent or unknown.
    employee_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    date: NaiveDate,
    hour: u32,
    minute: u32,
    due: NaiveDateTime,
}

async fn handle_task_schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Json<ScheduleResponse> {
    let now = request
        .employee_id
        .as_deref()
        .and_then(|employee_id| {
            let employee = state.system.get_employee(employee_id).ok()?;
            let organization = state.system.get_organization(&employee.organization_id).ok()?;
            Some(Utc::now().with_timezone(&organization.timezone).naive_local())
        })
        .unwrap_or_else(|| Utc::now().naive_utc());

    let moment = parse_due_moment(&request.prompt, now);
    let due = moment.as_datetime();
    Json(ScheduleResponse {
        date: moment.date,
        hour: moment.hour,
        minute: moment.minute,
        due,
    })
}

// --- Status Handler ---

async fn handle_status(State(state): State<AppState>) -> Html<String> {
    info!("Handling /status request...");
    let (organizations, employees, login_events, leave_requests) = state.system.counts();

    let html_body = format!(
        "<h1>Server Status</h1><p>Current Time (Server): {}</p><hr>\
         <p>Organizations: {}</p>\
         <p>Employees: {}</p>\
         <p>Recorded Login Events: {}</p>\
         <p>Penalty Leave Requests: {}</p>",
        Utc::now().to_rfc3339(),
        organizations,
        employees,
        login_events,
        leave_requests
    );
    Html(html_body)
}
