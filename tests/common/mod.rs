#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN_EMAIL: &str = "admin@ums.test";
pub const ADMIN_PASSWORD: &str = "admin-pass-1";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Workspace with a cheap password hash so tests that create users stay fast.
pub fn workspace(prefix: &str, extra_config: &str) -> PathBuf {
    let dir = temp_dir(prefix);
    let config = format!("password_iterations = 4\n{}", extra_config);
    std::fs::write(dir.join("ums.toml"), config).expect("write ums.toml");
    dir
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_umsd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn umsd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Error code of a call that must fail.
    pub fn fail(&mut self, method: &str, params: Value) -> (String, Value) {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let error = value.get("error").cloned().unwrap_or_else(|| json!({}));
        let code = error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        (code, error)
    }

    pub fn select(&mut self, workspace: &std::path::Path) {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
    }

    pub fn login(&mut self, email: &str, password: &str) -> Value {
        self.ok("auth.login", json!({ "email": email, "password": password }))
    }

    /// Selects `workspace`, bootstraps the superuser and logs in as it.
    pub fn admin(workspace: &std::path::Path) -> Self {
        let mut sc = Self::spawn();
        sc.select(workspace);
        sc.ok(
            "setup.createSuperuser",
            json!({
                "email": ADMIN_EMAIL,
                "password": ADMIN_PASSWORD,
                "firstName": "Admin",
                "lastName": "Ums",
            }),
        );
        sc.login(ADMIN_EMAIL, ADMIN_PASSWORD);
        sc
    }

    pub fn create(&mut self, namespace: &str, params: Value) -> String {
        let created = self.ok(&format!("{}.create", namespace), params);
        created["id"].as_str().expect("created id").to_string()
    }

    pub fn user(&mut self, email: &str, password: &str, role: &str) -> String {
        self.create(
            "users",
            json!({ "email": email, "password": password, "role": role }),
        )
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct Structure {
    pub year_id: String,
    pub semester_id: String,
    pub faculty_id: String,
    pub department_id: String,
}

pub fn seed_structure(sc: &mut Sidecar) -> Structure {
    let year_id = sc.create(
        "academicYears",
        json!({
            "name": "2025-2026",
            "code": "y25",
            "status": "active",
            "startDate": "2025-10-01",
            "endDate": "2026-07-31",
        }),
    );
    let semester_id = sc.create("semesters", json!({ "name": "Semestre 1", "code": "s1" }));
    let faculty_id = sc.create("faculties", json!({ "name": "Sciences", "code": "sci" }));
    let department_id = sc.create(
        "departments",
        json!({ "name": "Informatique", "code": "inf", "facultyId": faculty_id }),
    );
    Structure {
        year_id,
        semester_id,
        faculty_id,
        department_id,
    }
}

fn parent(first: &str) -> Value {
    json!({
        "firstName": first,
        "middleName": "Mwamba",
        "lastName": "Kabila",
        "originCountry": "RDC",
        "province": "Sud-Kivu",
        "address": "Avenue du Lac 12",
        "phoneNumber": "+243990000001",
    })
}

/// A complete intake payload for `email`.
pub fn intake_payload(s: &Structure, email: &str) -> Value {
    json!({
        "student": {
            "firstName": "jean",
            "middleName": "paul",
            "lastName": "MUKENDI",
            "gender": "masculin",
            "maritalStatus": "Célibataire",
            "birthPlace": "Bukavu",
            "birthDate": "2004-05-17",
            "address": { "street": "Avenue Kasongo 4", "quarter": "Ibanda", "cityCommune": "Bukavu" },
            "contact": { "phoneNumber": "+243970000000", "email": email },
            "diploma": {
                "institution": "Institut Alfajiri",
                "obtainingYear": "2023",
                "diplomaNumber": "D-4455",
                "section": "Scientifique",
                "percentage": 68.5,
            },
            "father": parent("Pierre"),
            "mother": parent("Marie"),
        },
        "enrollment": {
            "yearId": s.year_id,
            "semesterId": s.semester_id,
            "facultyId": s.faculty_id,
            "departmentId": s.department_id,
            "promotion": "L1",
            "howKnown": "Radio",
            "whyChosen": "Réputation",
            "commitmentsAccepted": true,
        },
    })
}
