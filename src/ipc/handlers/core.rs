use crate::auth::RoleGroup;
use crate::config;
use crate::db;
use crate::ipc::error::{err, ok, record_err, reply};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::records::{self, RecordError, ResourceKind, SaveContext};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let cfg = match config::load_workspace_config(&path) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "config_invalid", format!("{e:#}"), None),
    };
    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.to_string_lossy(), institution = %cfg.institution_name, "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.config = cfg;
            // A session belongs to the users table it was opened against.
            state.session = None;
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// First-run bootstrap: only possible while no user exists.
fn handle_create_superuser(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match db::count_rows(conn, "users") {
        Ok(0) => {}
        Ok(_) => return err(&req.id, "forbidden", "users already exist", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let p = &req.params;
    let input = json!({
        "email": p.get("email"),
        "password": p.get("password"),
        "firstName": p.get("firstName"),
        "lastName": p.get("lastName"),
        "role": "ADMIN",
        "isStaff": true,
        "isSuperuser": true,
    });
    let ctx = SaveContext::new(&state.config, None);
    match records::create(conn, records::resource_of(ResourceKind::Users), &input, &ctx) {
        Ok(user) => {
            tracing::info!(email = ?user.get("email"), "superuser created");
            ok(&req.id, user)
        }
        Err(e) => record_err(&req.id, &e),
    }
}

fn dashboard_summary(
    conn: &rusqlite::Connection,
    currency: &str,
) -> Result<serde_json::Value, RecordError> {
    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollment_requests WHERE status = 'pending'",
        [],
        |r| r.get(0),
    )?;
    let payments_total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_paid), 0) FROM payments",
        [],
        |r| r.get(0),
    )?;
    let expenses_total: f64 =
        conn.query_row("SELECT COALESCE(SUM(amount), 0) FROM expenses", [], |r| r.get(0))?;
    let active_year = conn
        .query_row(
            "SELECT id, name, code FROM academic_years WHERE status = 'active' ORDER BY name DESC LIMIT 1",
            [],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "code": r.get::<_, String>(2)?,
                }))
            },
        )
        .optional()?;
    Ok(json!({
        "students": db::count_rows(conn, "students")?,
        "enrollments": db::count_rows(conn, "enrollments")?,
        "pendingRequests": pending,
        "courses": db::count_rows(conn, "courses")?,
        "paymentsTotal": payments_total,
        "expensesTotal": expenses_total,
        "currency": currency,
        "activeYear": active_year,
    }))
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, RoleGroup::AllStaff) {
        return resp;
    }
    reply(&req.id, dashboard_summary(conn, &state.config.currency))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "setup.createSuperuser" => Some(handle_create_superuser(state, req)),
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
