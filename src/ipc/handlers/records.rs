//! `<namespace>.<action>` for every static resource descriptor.

use crate::ipc::error::{err, ok, record_err, reply};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::records::{self, Resource, ResourceKind};

use super::auth::refresh_session;
use serde_json::{json, Value};

#[derive(Clone, Copy)]
enum Action {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "list" => Some(Self::List),
            "get" => Some(Self::Get),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    fn writes(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

fn handle(state: &mut AppState, req: &Request, res: &'static Resource, action: Action) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let group = if action.writes() { res.write } else { res.read };
    if let Err(resp) = helpers::authorize(state, req, group) {
        return resp;
    }

    match action {
        Action::List => reply(
            &req.id,
            records::list(conn, res, req.params.get("filter"))
                .map(|rows| json!({ "count": rows.len(), "results": rows })),
        ),
        Action::Get => {
            let id = match helpers::required_str(req, "id") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            reply(&req.id, records::fetch(conn, res, id).map(Value::Object))
        }
        Action::Create => {
            let ctx = helpers::save_context(state);
            reply(&req.id, records::create(conn, res, &req.params, &ctx))
        }
        Action::Update => {
            let id = match helpers::required_str(req, "id") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            let Some(patch) = req.params.get("patch") else {
                return err(&req.id, "bad_params", "missing patch", None);
            };
            let ctx = helpers::save_context(state);
            let result = records::update(conn, res, id, patch, &ctx);
            if result.is_ok() && res.kind == ResourceKind::Users {
                if let Err(e) = refresh_session(state) {
                    return record_err(&req.id, &e);
                }
            }
            reply(&req.id, result)
        }
        Action::Delete => {
            let id = match helpers::required_str(req, "id") {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            if let Err(e) = records::delete(conn, res, id) {
                return record_err(&req.id, &e);
            }
            if res.kind == ResourceKind::Users {
                if let Err(e) = refresh_session(state) {
                    return record_err(&req.id, &e);
                }
            }
            ok(&req.id, json!({ "deleted": id }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (namespace, action) = req.method.split_once('.')?;
    let res = records::resource(namespace)?;
    let action = Action::parse(action)?;
    Some(handle(state, req, res, action))
}
