use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;

use crate::auth::{has_role_permission, RoleGroup, SessionUser};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::records::SaveContext;

pub fn db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn workspace<'a>(state: &'a AppState, req: &Request) -> Result<&'a Path, Value> {
    state
        .workspace
        .as_deref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn session<'a>(state: &'a AppState, req: &Request) -> Result<&'a SessionUser, Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "unauthenticated", "log in first", None))
}

/// Session user allowed for `group`; superusers pass every gate.
pub fn authorize<'a>(
    state: &'a AppState,
    req: &Request,
    group: RoleGroup,
) -> Result<&'a SessionUser, Value> {
    let user = session(state, req)?;
    if has_role_permission(user, group) {
        Ok(user)
    } else {
        tracing::debug!(method = %req.method, role = user.role.as_str(), "permission denied");
        Err(err(
            &req.id,
            "forbidden",
            format!("{} is not allowed to call {}", user.role.display_name(), req.method),
            None,
        ))
    }
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn save_context(state: &AppState) -> SaveContext<'_> {
    SaveContext::new(&state.config, state.session.as_ref())
}
