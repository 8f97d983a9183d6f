// 🌐 REST API with Axum
//
// Every handler authenticates the caller, parses its input, then runs one
// ledger operation while holding the connection lock (AppState::with_conn).
// The lock is released when the closure returns, on success and on error.

use crate::auth::{self, User};
use crate::budgets;
use crate::config::ServerConfig;
use crate::db;
use crate::error::{ErrorKind, LedgerError, LedgerResult};
use crate::goals::{self, ContributionResult, NewGoal};
use crate::ledger::{self, LedgerStats, NewLedgerEntry};
use crate::models::{
    Budget, BudgetPeriod, Flow, LedgerEntry, Notification, NotificationPreference, Payable, SavingGoal,
};
use crate::notifications::{self, MarkRead, PreferencesUpdate};
use crate::payables::{self, NewPayable, PayableFilter, PaymentSummary};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// ============================================================================
// State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(conn: Connection, config: ServerConfig) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// A panic inside `f` poisons the lock but cannot leave a half-written
    /// transaction behind: the `Transaction` guard rolls back as it unwinds.
    /// The next caller takes the connection over instead of failing.
    pub fn with_conn<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut Connection) -> LedgerResult<T>,
    {
        let mut conn = self.db.lock().unwrap_or_else(|poisoned| {
            tracing::error!("database lock was poisoned by a panicking request; recovering");
            poisoned.into_inner()
        });
        f(&mut conn)
    }
}

// ============================================================================
// Errors
// ============================================================================

pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_amount: Option<Decimal>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if err.kind() == ErrorKind::Internal {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %err, "request rejected");
        }

        let remaining_amount = match &err {
            LedgerError::ExceedsRemaining { remaining } | LedgerError::ExceedsTarget { remaining } => {
                Some(*remaining)
            }
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: err.public_message(),
            remaining_amount,
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_REMINDER_DAYS: u32 = 3;

/// Malformed bodies are the client's fault: report them as 400, not 422.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| LedgerError::invalid(rejection.body_text()).into())
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| LedgerError::invalid(rejection.body_text()).into())
}

fn required<T>(value: Option<T>, field: &str) -> ApiResult<T> {
    value.ok_or_else(|| LedgerError::invalid(format!("{} is required", field)).into())
}

// ============================================================================
// Authentication
// ============================================================================

/// The authenticated caller's user id, from `Authorization: Bearer <token>`.
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(LedgerError::Unauthenticated)?;

        let user_id = state.with_conn(|conn| auth::authenticate(conn, token))?;
        Ok(AuthUser(user_id))
    }
}

// ============================================================================
// Request / Response bodies
// ============================================================================

#[derive(Deserialize)]
struct PaymentRequest {
    amount: Option<Decimal>,
}

#[derive(Serialize)]
struct PaymentResponse {
    message: String,
    payable: Payable,
    payment: PaymentSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayableRequest {
    name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    amount: Option<Decimal>,
    due_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct PayableQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
struct ReminderQuery {
    days: Option<u32>,
}

#[derive(Serialize)]
struct ReminderResponse {
    count: usize,
    notifications: Vec<Notification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGoalRequest {
    name: Option<String>,
    target_amount: Option<Decimal>,
    deadline: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct ContributionRequest {
    amount: Option<Decimal>,
}

#[derive(Serialize)]
struct ContributionResponse {
    message: String,
    #[serde(flatten)]
    result: ContributionResult,
}

#[derive(Deserialize)]
struct CreateExpenseRequest {
    amount: Option<Decimal>,
    #[serde(rename = "type")]
    flow: Option<Flow>,
    category: Option<String>,
    date: Option<DateTime<Utc>>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct ExpenseQuery {
    #[serde(alias = "type")]
    flow: Option<Flow>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
struct BudgetRequest {
    category: Option<String>,
    amount: Option<Decimal>,
    period: Option<BudgetPeriod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    notification_ids: Option<Vec<String>>,
    mark_all: Option<bool>,
}

#[derive(Deserialize)]
struct NotificationQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    unread: Option<bool>,
}

#[derive(Serialize)]
struct NotificationListResponse {
    notifications: Vec<Notification>,
    pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total: i64,
    limit: u32,
    offset: u32,
    has_more: bool,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

#[derive(Serialize)]
struct CountResponse {
    count: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    version: &'static str,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "OK",
        version: crate::VERSION,
    })
}

/// GET /api/me - The authenticated user
async fn current_user(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Json<User>> {
    let user = state.with_conn(|conn| auth::find_user(conn, &user_id))?;
    Ok(Json(user))
}

/// GET /api/payables?status=open|paid|all
async fn list_payables(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<PayableQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Payable>>> {
    let params = query(params)?;
    let filter = match params.status {
        Some(status) => status.parse::<PayableFilter>()?,
        None => PayableFilter::All,
    };

    let list = state.with_conn(|conn| payables::list_payables(conn, &user_id, filter))?;
    Ok(Json(list))
}

/// POST /api/payables
async fn create_payable(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreatePayableRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Payable>)> {
    let request = body(payload)?;
    let new = NewPayable {
        user_id,
        name: required(request.name, "name")?,
        category: required(request.category, "category")?,
        description: request.description,
        amount: required(request.amount, "amount")?,
        due_date: request.due_date,
    };

    let payable = state.with_conn(|conn| payables::create_payable(conn, new))?;
    Ok((StatusCode::CREATED, Json(payable)))
}

/// GET /api/payables/:id
async fn get_payable(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(payable_id): Path<String>,
) -> ApiResult<Json<Payable>> {
    let payable = state.with_conn(|conn| payables::get_payable(conn, &payable_id, &user_id))?;
    Ok(Json(payable))
}

/// POST /api/payables/:id/payment - Apply a payment
async fn pay_payable(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(payable_id): Path<String>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> ApiResult<Json<PaymentResponse>> {
    let amount = required(body(payload)?.amount, "amount")?;

    let result = state.with_conn(|conn| payables::apply_payment(conn, &payable_id, &user_id, amount))?;

    let message = if result.payment.is_fully_paid {
        format!("Payment recorded. {} is now fully paid", result.payable.name)
    } else {
        format!("Payment of {} recorded successfully", result.payment.amount)
    };

    Ok(Json(PaymentResponse {
        message,
        payable: result.payable,
        payment: result.payment,
    }))
}

/// POST /api/payables/reminders?days=3 - Remind about bills due soon
async fn remind_payables(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ReminderQuery>, QueryRejection>,
) -> ApiResult<Json<ReminderResponse>> {
    let days = query(params)?.days.unwrap_or(DEFAULT_REMINDER_DAYS);
    let today = db::now().date_naive();

    let notifications =
        state.with_conn(|conn| payables::remind_due_payables(conn, &user_id, today, days))?;
    Ok(Json(ReminderResponse {
        count: notifications.len(),
        notifications,
    }))
}

/// GET /api/expenses?type=income|expense&limit=&offset=
async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ExpenseQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    let params = query(params)?;
    let limit = state.config().page_limit(params.limit);
    let offset = params.offset.unwrap_or(0);

    let entries = state.with_conn(|conn| ledger::list_entries(conn, &user_id, params.flow, limit, offset))?;
    Ok(Json(entries))
}

/// POST /api/expenses
async fn create_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LedgerEntry>)> {
    let request = body(payload)?;
    let new = NewLedgerEntry {
        user_id,
        amount: required(request.amount, "amount")?,
        flow: request.flow.unwrap_or(Flow::Expense),
        category: required(request.category, "category")?,
        date: request.date,
        notes: request.notes,
    };

    let entry = state.with_conn(|conn| ledger::record_entry(conn, new))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/stats - Income/expense totals
async fn get_stats(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Json<LedgerStats>> {
    let stats = state.with_conn(|conn| ledger::ledger_stats(conn, &user_id))?;
    Ok(Json(stats))
}

/// GET /api/budgets
async fn list_budgets(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Json<Vec<Budget>>> {
    let list = state.with_conn(|conn| budgets::list_budgets(conn, &user_id))?;
    Ok(Json(list))
}

/// POST /api/budgets - 201 when created, 200 when an existing budget was updated
async fn upsert_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<BudgetRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Budget>)> {
    let request = body(payload)?;
    let category = required(request.category, "category")?;
    let amount = required(request.amount, "amount")?;

    let result = state.with_conn(|conn| {
        budgets::upsert_budget(conn, &user_id, &category, amount, request.period)
    })?;

    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result.budget)))
}

/// PUT /api/budgets/:id
async fn update_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(budget_id): Path<String>,
    payload: Result<Json<BudgetRequest>, JsonRejection>,
) -> ApiResult<Json<Budget>> {
    let request = body(payload)?;
    let amount = required(request.amount, "amount")?;

    let budget = state.with_conn(|conn| {
        budgets::update_budget(
            conn,
            &user_id,
            &budget_id,
            request.category.as_deref(),
            amount,
            request.period,
        )
    })?;
    Ok(Json(budget))
}

/// DELETE /api/budgets/:id
async fn delete_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(budget_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.with_conn(|conn| budgets::delete_budget(conn, &user_id, &budget_id))?;
    Ok(Json(MessageResponse {
        message: "Budget deleted".to_string(),
        count: None,
    }))
}

/// GET /api/goals
async fn list_goals(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Json<Vec<SavingGoal>>> {
    let list = state.with_conn(|conn| goals::list_goals(conn, &user_id))?;
    Ok(Json(list))
}

/// POST /api/goals
async fn create_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateGoalRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SavingGoal>)> {
    let request = body(payload)?;
    let new = NewGoal {
        user_id,
        name: required(request.name, "name")?,
        target_amount: required(request.target_amount, "targetAmount")?,
        deadline: request.deadline,
    };

    let goal = state.with_conn(|conn| goals::create_goal(conn, new))?;
    Ok((StatusCode::CREATED, Json(goal)))
}

/// GET /api/goals/:id
async fn get_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(goal_id): Path<String>,
) -> ApiResult<Json<SavingGoal>> {
    let goal = state.with_conn(|conn| goals::get_goal(conn, &goal_id, &user_id))?;
    Ok(Json(goal))
}

/// DELETE /api/goals/:id
async fn delete_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(goal_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.with_conn(|conn| goals::delete_goal(conn, &user_id, &goal_id))?;
    Ok(Json(MessageResponse {
        message: "Saving goal deleted".to_string(),
        count: None,
    }))
}

/// POST /api/goals/:id/contribution
async fn contribute_to_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(goal_id): Path<String>,
    payload: Result<Json<ContributionRequest>, JsonRejection>,
) -> ApiResult<Json<ContributionResponse>> {
    let amount = required(body(payload)?.amount, "amount")?;

    let result = state.with_conn(|conn| goals::contribute(conn, &goal_id, &user_id, amount))?;
    let message = if result.contribution.is_completed {
        format!("Goal reached. {} is fully funded", result.goal.name)
    } else {
        format!("Contribution of {} recorded", result.contribution.amount)
    };

    Ok(Json(ContributionResponse { message, result }))
}

/// GET /api/notifications?limit=&offset=&unread=
async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: Result<Query<NotificationQuery>, QueryRejection>,
) -> ApiResult<Json<NotificationListResponse>> {
    let params = query(params)?;
    let limit = state.config().page_limit(params.limit);
    let offset = params.offset.unwrap_or(0);
    let unread_only = params.unread.unwrap_or(false);

    let page = state.with_conn(|conn| {
        notifications::list_notifications(conn, &user_id, limit, offset, unread_only)
    })?;

    let has_more = page.has_more();
    Ok(Json(NotificationListResponse {
        notifications: page.items,
        pagination: Pagination {
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        },
    }))
}

/// POST /api/notifications/mark-read
async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<MarkReadRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let request = body(payload)?;
    let target = if request.mark_all.unwrap_or(false) {
        MarkRead::All
    } else {
        MarkRead::Ids(request.notification_ids.unwrap_or_default())
    };

    let count = state.with_conn(|conn| notifications::mark_read(conn, &user_id, target))?;
    Ok(Json(MessageResponse {
        message: format!("Marked {} notifications as read", count),
        count: Some(count),
    }))
}

/// GET /api/notifications/unread-count
async fn unread_count(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> ApiResult<Json<CountResponse>> {
    let count = state.with_conn(|conn| notifications::unread_count(conn, &user_id))?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/notifications/preferences
async fn get_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<NotificationPreference>> {
    let prefs = state.with_conn(|conn| notifications::get_or_create_preferences(conn, &user_id))?;
    Ok(Json(prefs))
}

/// PUT /api/notifications/preferences
async fn update_preferences(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<PreferencesUpdate>, JsonRejection>,
) -> ApiResult<Json<NotificationPreference>> {
    let update = body(payload)?;
    let prefs = state.with_conn(|conn| notifications::update_preferences(conn, &user_id, update))?;
    Ok(Json(prefs))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/me", get(current_user))
        .route("/payables", get(list_payables).post(create_payable))
        .route("/payables/reminders", post(remind_payables))
        .route("/payables/:id", get(get_payable))
        .route("/payables/:id/payment", post(pay_payable))
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/stats", get(get_stats))
        .route("/budgets", get(list_budgets).post(upsert_budget))
        .route("/budgets/:id", put(update_budget).delete(delete_budget))
        .route("/goals", get(list_goals).post(create_goal))
        .route("/goals/:id", get(get_goal).delete(delete_goal))
        .route("/goals/:id/contribution", post(contribute_to_goal))
        .route("/notifications", get(list_notifications))
        .route("/notifications/mark-read", post(mark_read))
        .route("/notifications/unread-count", get(unread_count))
        .route(
            "/notifications/preferences",
            get(get_preferences).put(update_preferences),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, setup_database, write_tx};
    use std::thread;

    #[test]
    fn test_with_conn_recovers_after_a_panic() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let state = AppState::new(conn, ServerConfig::default());

        let panicking = state.clone();
        let outcome = thread::spawn(move || {
            panicking.with_conn(|conn| -> LedgerResult<()> {
                let tx = write_tx(conn)?;
                tx.execute(
                    "INSERT INTO users (id, email, created_at) VALUES ('u1', 'a@b.c', 'now')",
                    [],
                )?;
                panic!("handler bug");
            })
        })
        .join();
        assert!(outcome.is_err());

        let users = state.with_conn(|conn| count_rows(conn, "users")).unwrap();
        assert_eq!(users, 0);
    }
}
