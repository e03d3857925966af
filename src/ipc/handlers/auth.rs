use crate::auth::{normalize_email, verify_password, Role, SessionUser};
use crate::ipc::error::{err, ok, record_err};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::records::{self, RecordError, ResourceKind};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};

const PROFILE_FIELDS: &[&str] = &["firstName", "lastName", "email", "avatar"];

struct Credentials {
    user: SessionUser,
    password_hash: String,
    is_active: bool,
}

fn load_credentials(
    conn: &Connection,
    column: &str,
    key: &str,
) -> rusqlite::Result<Option<Credentials>> {
    let sql = format!(
        "SELECT id, email, first_name, last_name, role, is_superuser, password_hash, is_active
         FROM users WHERE {} = ?",
        column
    );
    conn.query_row(&sql, [key], |r| {
        let role: String = r.get(4)?;
        Ok(Credentials {
            user: SessionUser {
                id: r.get(0)?,
                email: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                role: Role::parse(&role).unwrap_or(Role::Student),
                is_superuser: r.get(5)?,
            },
            password_hash: r.get(6)?,
            is_active: r.get(7)?,
        })
    })
    .optional()
}

fn whoami_json(user: &SessionUser) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "fullName": user.full_name(),
        "role": user.role.as_str(),
        "roleDisplay": user.role.display_name(),
        "isSuperuser": user.is_superuser,
    })
}

fn handle_login(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let email = match helpers::required_str(req, "email") {
        Ok(v) => normalize_email(v),
        Err(resp) => return resp,
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    let creds = match load_credentials(conn, "email", &email) {
        Ok(v) => v,
        Err(e) => return record_err(&req.id, &e.into()),
    };
    let user = match creds {
        Some(c) if c.is_active && verify_password(password, &c.password_hash) => c.user,
        _ => {
            tracing::warn!(email = %email, "login failed");
            return err(&req.id, "invalid_credentials", "invalid email or password", None);
        }
    };

    let now = records::SaveContext::new(&state.config, None).timestamp();
    if let Err(e) = conn.execute(
        "UPDATE users SET last_login = ? WHERE id = ?",
        (&now, &user.id),
    ) {
        return record_err(&req.id, &e.into());
    }
    tracing::info!(user = %user.email, role = user.role.as_str(), "login");
    let out = whoami_json(&user);
    state.session = Some(user);
    ok(&req.id, out)
}

fn handle_logout(state: &mut AppState, req: &Request) -> Value {
    if let Some(user) = state.session.take() {
        tracing::info!(user = %user.email, "logout");
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_whoami(state: &mut AppState, req: &Request) -> Value {
    match helpers::session(state, req) {
        Ok(user) => ok(&req.id, whoami_json(user)),
        Err(resp) => resp,
    }
}

fn handle_change_password(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match helpers::session(state, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let Some(old) = req.params.get("oldPassword").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing oldPassword", None);
    };
    let Some(new) = req.params.get("newPassword").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing newPassword", None);
    };

    let stored = match load_credentials(conn, "id", &user.id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return record_err(&req.id, &e.into()),
    };
    if !verify_password(old, &stored.password_hash) {
        let e = RecordError::invalid("oldPassword", "incorrect password");
        return record_err(&req.id, &e);
    }

    let ctx = helpers::save_context(state);
    let res = records::resource_of(ResourceKind::Users);
    match records::update(conn, res, &user.id, &json!({ "password": new }), &ctx) {
        Ok(_) => {
            tracing::info!(user = %user.email, "password changed");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => record_err(&req.id, &e),
    }
}

fn handle_profile_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match helpers::session(state, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let Some(input) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };

    let mut patch = Map::new();
    for (key, value) in input {
        if !PROFILE_FIELDS.contains(&key.as_str()) {
            let e = RecordError::invalid(key, "not editable from the profile");
            return record_err(&req.id, &e);
        }
        patch.insert(key.clone(), value.clone());
    }

    let ctx = helpers::save_context(state);
    let res = records::resource_of(ResourceKind::Users);
    let updated = match records::update(conn, res, &user.id, &Value::Object(patch), &ctx) {
        Ok(v) => v,
        Err(e) => return record_err(&req.id, &e),
    };
    if let Err(e) = refresh_session(state) {
        return record_err(&req.id, &e);
    }
    ok(&req.id, updated)
}

/// Reloads the session user after a write to the users table. A deleted or
/// deactivated account loses its session.
pub fn refresh_session(state: &mut AppState) -> Result<(), RecordError> {
    let (Some(conn), Some(current)) = (state.db.as_ref(), state.session.as_ref()) else {
        return Ok(());
    };
    let stored = load_credentials(conn, "id", &current.id)?;
    state.session = match stored {
        Some(c) if c.is_active => Some(c.user),
        _ => {
            tracing::info!(user = %current.email, "session closed");
            None
        }
    };
    Ok(())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.whoami" => Some(handle_whoami(state, req)),
        "auth.changePassword" => Some(handle_change_password(state, req)),
        "profile.update" => Some(handle_profile_update(state, req)),
        _ => None,
    }
}
