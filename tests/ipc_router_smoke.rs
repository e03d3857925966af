mod common;

use common::{seed_structure, workspace, Sidecar};
use serde_json::json;

#[test]
fn health_and_transport_errors() {
    let mut sc = Sidecar::spawn();

    let health = sc.ok("health", json!({}));
    assert!(health["version"].as_str().is_some());
    assert!(health["workspacePath"].is_null());

    let bad = sc.send_raw("{not json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    let (code, _) = sc.fail("no.such.method", json!({}));
    assert_eq!(code, "not_implemented");

    // Everything below needs a workspace.
    let (code, _) = sc.fail("faculties.list", json!({}));
    assert_eq!(code, "no_workspace");
    let (code, _) = sc.fail("auth.login", json!({ "email": "a@b.cd", "password": "x" }));
    assert_eq!(code, "no_workspace");

    let (code, _) = sc.fail("workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn malformed_config_is_reported() {
    let dir = common::temp_dir("umsd-bad-config");
    std::fs::write(dir.join("ums.toml"), "academic_year_start_month = 13\n").expect("write");
    let mut sc = Sidecar::spawn();
    let (code, _) = sc.fail("workspace.select", json!({ "path": dir.to_string_lossy() }));
    assert_eq!(code, "config_invalid");

    std::fs::write(dir.join("ums.toml"), "colour = \"blue\"\n").expect("write");
    let (code, _) = sc.fail("workspace.select", json!({ "path": dir.to_string_lossy() }));
    assert_eq!(code, "config_invalid");

    std::fs::remove_file(dir.join("ums.toml")).expect("remove");
    sc.select(&dir);
    assert!(dir.join("ums.sqlite3").is_file());
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let dir = workspace("umsd-router-smoke", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let whoami = sc.ok("auth.whoami", json!({}));
    assert_eq!(whoami["role"], json!("ADMIN"));

    let summary = sc.ok("dashboard.summary", json!({}));
    assert_eq!(summary["students"], json!(0));
    assert_eq!(summary["currency"], json!("USD"));
    assert_eq!(summary["activeYear"]["code"], json!("Y25"));

    for ns in [
        "academicYears",
        "semesters",
        "faculties",
        "departments",
        "promotions",
        "courses",
        "courseOfferings",
        "addresses",
        "contacts",
        "diplomas",
        "parents",
        "sponsors",
        "students",
        "studentSponsors",
        "enrollments",
        "secondaryChoices",
        "documents",
        "assessmentTypes",
        "assessmentWeightings",
        "grades",
        "feeCategories",
        "academicFees",
        "payments",
        "expenseCategories",
        "expenses",
        "courseAssignments",
        "users",
    ] {
        let listed = sc.ok(&format!("{}.list", ns), json!({}));
        assert!(listed["results"].is_array(), "{} list: {}", ns, listed);
    }

    let listed = sc.ok("enrollmentRequests.list", json!({}));
    assert_eq!(listed["count"], json!(0));

    let (code, _) = sc.fail(
        "reports.proclamationModel",
        json!({ "yearId": s.year_id, "promotion": "L1" }),
    );
    assert_eq!(code, "not_found");

    let (code, _) = sc.fail("faculties.get", json!({ "id": "missing" }));
    assert_eq!(code, "not_found");
    let (code, _) = sc.fail("faculties.get", json!({}));
    assert_eq!(code, "bad_params");
    let (code, _) = sc.fail("faculties.update", json!({ "id": s.faculty_id }));
    assert_eq!(code, "bad_params");
}
