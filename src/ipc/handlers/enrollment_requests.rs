use crate::auth::RoleGroup;
use crate::intake::{self, IntakePayload};
use crate::ipc::error::{record_err, reply};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::Path;

/// Parses and checks `{student, enrollment}`; then, when `photoSourcePath`
/// is given, copies the photo into the media folder and points
/// `student.photo` at it.
fn checked_payload(state: &AppState, req: &Request) -> Result<IntakePayload, Value> {
    let conn = helpers::db(state, req)?;
    let mut payload = intake::parse_payload(&req.params).map_err(|e| record_err(&req.id, &e))?;
    intake::check(conn, &payload).map_err(|e| record_err(&req.id, &e))?;
    if let Some(source) = helpers::optional_str(req, "photoSourcePath") {
        let workspace = helpers::workspace(state, req)?;
        let media_root = state.config.media_root(workspace);
        let rel = intake::store_photo(&media_root, Path::new(source))
            .map_err(|e| record_err(&req.id, &e))?;
        payload.student.photo = Some(rel);
    }
    Ok(payload)
}

fn handle_submit(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let payload = match checked_payload(state, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let ctx = helpers::save_context(state);
    reply(&req.id, intake::submit(conn, &payload, &ctx))
}

fn handle_status(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match helpers::required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    reply(&req.id, intake::status(conn, id))
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, RoleGroup::Academic) {
        return resp;
    }
    let status = helpers::optional_str(req, "status");
    reply(
        &req.id,
        intake::list(conn, status).map(|rows| json!({ "count": rows.len(), "results": rows })),
    )
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, RoleGroup::Academic) {
        return resp;
    }
    let id = match helpers::required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    reply(&req.id, intake::get(conn, id))
}

fn handle_decide(state: &mut AppState, req: &Request, approve: bool) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, RoleGroup::Academic) {
        return resp;
    }
    let id = match helpers::required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let notes = helpers::optional_str(req, "notes");
    let ctx = helpers::save_context(state);
    if approve {
        reply(&req.id, intake::approve(conn, id, notes, &ctx))
    } else {
        reply(&req.id, intake::reject(conn, id, notes, &ctx))
    }
}

fn handle_direct(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, RoleGroup::Academic) {
        return resp;
    }
    let payload = match checked_payload(state, req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let ctx = helpers::save_context(state);
    reply(&req.id, intake::direct(conn, &payload, &ctx))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "enrollmentRequests.submit" => Some(handle_submit(state, req)),
        "enrollmentRequests.status" => Some(handle_status(state, req)),
        "enrollmentRequests.list" => Some(handle_list(state, req)),
        "enrollmentRequests.get" => Some(handle_get(state, req)),
        "enrollmentRequests.approve" => Some(handle_decide(state, req, true)),
        "enrollmentRequests.reject" => Some(handle_decide(state, req, false)),
        "enrollments.direct" => Some(handle_direct(state, req)),
        _ => None,
    }
}
