use crate::auth::RoleGroup;
use crate::ipc::error::{ok, record_err};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use crate::records::RecordError;
use crate::reports::{self, Report};
use rusqlite::Connection;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Clone, Copy)]
enum Output {
    Model,
    Pdf,
}

/// Replies with the model as JSON, or renders it to disk.
fn emit<R: Report>(
    state: &AppState,
    req: &Request,
    output: Output,
    built: Result<R, RecordError>,
) -> Value {
    let report = match built {
        Ok(r) => r,
        Err(e) => return record_err(&req.id, &e),
    };
    match output {
        Output::Model => match serde_json::to_value(&report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => record_err(&req.id, &RecordError::invalid("report", e.to_string())),
        },
        Output::Pdf => {
            let workspace = match helpers::workspace(state, req) {
                Ok(p) => p,
                Err(resp) => return resp,
            };
            let out_path = helpers::optional_str(req, "outPath").map(PathBuf::from);
            let exports_root = state.config.exports_root(workspace);
            match reports::write_pdf(&report, &state.config, &exports_root, out_path.as_deref()) {
                Ok(v) => ok(&req.id, v),
                Err(e) => record_err(&req.id, &e),
            }
        }
    }
}

fn handle(
    state: &AppState,
    req: &Request,
    group: RoleGroup,
    run: impl FnOnce(&AppState, &Connection) -> Value,
) -> Value {
    let conn = match helpers::db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = helpers::authorize(state, req, group) {
        return resp;
    }
    run(state, conn)
}

fn enrollment_form(state: &AppState, req: &Request, output: Output) -> Value {
    handle(state, req, RoleGroup::Academic, |state, conn| {
        match helpers::required_str(req, "enrollmentId") {
            Ok(id) => emit(state, req, output, reports::enrollment_form(conn, id)),
            Err(resp) => resp,
        }
    })
}

fn bulletin(state: &AppState, req: &Request, output: Output) -> Value {
    handle(state, req, RoleGroup::Academic, |state, conn| {
        match helpers::required_str(req, "enrollmentId") {
            Ok(id) => emit(state, req, output, reports::bulletin(conn, id)),
            Err(resp) => resp,
        }
    })
}

fn payment_receipt(state: &AppState, req: &Request, output: Output) -> Value {
    handle(state, req, RoleGroup::Finance, |state, conn| {
        match helpers::required_str(req, "paymentId") {
            Ok(id) => emit(
                state,
                req,
                output,
                reports::payment_receipt(conn, id, &state.config),
            ),
            Err(resp) => resp,
        }
    })
}

fn exit_certificate(state: &AppState, req: &Request, output: Output) -> Value {
    handle(state, req, RoleGroup::Academic, |state, conn| {
        match helpers::required_str(req, "studentId") {
            Ok(id) => emit(state, req, output, reports::exit_certificate(conn, id)),
            Err(resp) => resp,
        }
    })
}

/// Missing criteria are reported as `not_found`, like an empty result.
fn proclamation(state: &AppState, req: &Request, output: Output) -> Value {
    handle(state, req, RoleGroup::Academic, |state, conn| {
        let built = reports::proclamation(
            conn,
            helpers::optional_str(req, "yearId"),
            helpers::optional_str(req, "promotion"),
            helpers::optional_str(req, "departmentId"),
        );
        emit(state, req, output, built)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (family, output) = match req.method.strip_prefix("reports.")? {
        m if m.ends_with("Model") => (m.trim_end_matches("Model"), Output::Model),
        m if m.ends_with("Pdf") => (m.trim_end_matches("Pdf"), Output::Pdf),
        _ => return None,
    };
    let state: &AppState = state;
    match family {
        "enrollmentForm" => Some(enrollment_form(state, req, output)),
        "bulletin" => Some(bulletin(state, req, output)),
        "paymentReceipt" => Some(payment_receipt(state, req, output)),
        "exitCertificate" => Some(exit_certificate(state, req, output)),
        "proclamation" => Some(proclamation(state, req, output)),
        _ => None,
    }
}
