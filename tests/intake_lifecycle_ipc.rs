mod common;

use common::{intake_payload, seed_structure, workspace, Sidecar};
use serde_json::json;

#[test]
fn public_submission_then_approval_expands_once() {
    let dir = workspace("umsd-intake-approve", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);
    sc.ok("auth.logout", json!({}));

    // Submitting and polling need no session.
    let submitted = sc.ok("enrollmentRequests.submit", intake_payload(&s, "jean@ums.test"));
    let request_id = submitted["id"].as_str().expect("request id").to_string();
    assert_eq!(submitted["status"], json!("pending"));
    let status = sc.ok("enrollmentRequests.status", json!({ "id": request_id }));
    assert_eq!(status["status"], json!("pending"));
    let (code, _) = sc.fail("enrollmentRequests.list", json!({}));
    assert_eq!(code, "unauthenticated");

    sc.login(common::ADMIN_EMAIL, common::ADMIN_PASSWORD);
    let pending = sc.ok("enrollmentRequests.list", json!({ "status": "pending" }));
    assert_eq!(pending["count"], json!(1));
    assert_eq!(pending["results"][0]["studentName"], json!("jean MUKENDI"));
    assert_eq!(pending["results"][0]["email"], json!("jean@ums.test"));
    assert_eq!(sc.ok("students.list", json!({}))["count"], json!(0));

    let approved = sc.ok(
        "enrollmentRequests.approve",
        json!({ "id": request_id, "notes": "Dossier complet" }),
    );
    assert_eq!(approved["status"], json!("approved"));
    assert_eq!(approved["reviewNotes"], json!("Dossier complet"));
    assert!(approved["reviewedBy"].as_str().is_some());
    let enrollment_id = approved["enrollmentId"].as_str().expect("enrollment id");

    let enrollment = sc.ok("enrollments.get", json!({ "id": enrollment_id }));
    let learner = sc.ok("students.get", json!({ "id": enrollment["studentId"] }));
    assert_eq!(learner["firstName"], json!("Jean"));
    assert_eq!(learner["lastName"], json!("Mukendi"));
    assert!(learner["matricule"].as_str().is_some());
    for key in ["addressId", "contactId", "diplomaId", "fatherId", "motherId", "userId"] {
        assert!(learner[key].as_str().is_some(), "{} not linked", key);
    }

    let (code, _) = sc.fail("enrollmentRequests.approve", json!({ "id": request_id }));
    assert_eq!(code, "invalid_transition");
    let (code, _) = sc.fail("enrollmentRequests.reject", json!({ "id": request_id }));
    assert_eq!(code, "invalid_transition");
    assert_eq!(sc.ok("students.list", json!({}))["count"], json!(1));
    assert_eq!(sc.ok("parents.list", json!({}))["count"], json!(2));
}

#[test]
fn rejection_creates_nothing() {
    let dir = workspace("umsd-intake-reject", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let submitted = sc.ok("enrollmentRequests.submit", intake_payload(&s, "rejet@ums.test"));
    let rejected = sc.ok(
        "enrollmentRequests.reject",
        json!({ "id": submitted["id"], "notes": "Pièces manquantes" }),
    );
    assert_eq!(rejected["status"], json!("rejected"));
    assert!(rejected["enrollmentId"].is_null());
    assert_eq!(sc.ok("students.list", json!({}))["count"], json!(0));
    assert_eq!(sc.ok("addresses.list", json!({}))["count"], json!(0));
    let status = sc.ok("enrollmentRequests.status", json!({ "id": submitted["id"] }));
    assert_eq!(status["status"], json!("rejected"));
}

#[test]
fn invalid_submissions_report_nested_fields() {
    let dir = workspace("umsd-intake-invalid", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let mut payload = intake_payload(&s, "not-an-email");
    payload["student"]["diploma"]["obtainingYear"] = json!("23");
    payload["enrollment"]["commitmentsAccepted"] = json!(false);
    payload["enrollment"]["yearId"] = json!("missing-year");
    let (code, error) = sc.fail("enrollmentRequests.submit", payload);
    assert_eq!(code, "validation_failed");
    for field in [
        "student.contact.email",
        "student.diploma.obtainingYear",
        "enrollment.commitmentsAccepted",
        "enrollment.yearId",
    ] {
        assert!(
            error["details"]["fields"].get(field).is_some(),
            "missing {} in {}",
            field,
            error
        );
    }

    let (code, error) = sc.fail("enrollmentRequests.submit", json!({ "student": {} }));
    assert_eq!(code, "validation_failed");
    assert!(error["details"]["fields"].get("enrollment").is_some());
    assert_eq!(sc.ok("enrollmentRequests.list", json!({}))["count"], json!(0));
}

#[test]
fn failed_approval_rolls_back_and_stays_pending() {
    let dir = workspace("umsd-intake-rollback", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let first = sc.ok("enrollmentRequests.submit", intake_payload(&s, "same@ums.test"));
    let second = sc.ok("enrollmentRequests.submit", intake_payload(&s, "same@ums.test"));
    sc.ok("enrollmentRequests.approve", json!({ "id": first["id"] }));

    // The contact email is taken now, so the second expansion fails midway.
    let (code, _) = sc.fail("enrollmentRequests.approve", json!({ "id": second["id"] }));
    assert_eq!(code, "conflict");
    let status = sc.ok("enrollmentRequests.status", json!({ "id": second["id"] }));
    assert_eq!(status["status"], json!("pending"));
    assert_eq!(sc.ok("students.list", json!({}))["count"], json!(1));
    assert_eq!(sc.ok("addresses.list", json!({}))["count"], json!(1));
    assert_eq!(sc.ok("contacts.list", json!({}))["count"], json!(1));
}

#[test]
fn direct_enrollment_and_photo_copy() {
    let dir = workspace("umsd-intake-direct", "media_dir = \"fichiers\"\n");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let photo = dir.join("portrait.PNG");
    std::fs::write(&photo, b"\x89PNG fake").expect("write photo");
    let mut payload = intake_payload(&s, "direct@ums.test");
    payload["photoSourcePath"] = json!(photo.to_string_lossy());

    let created = sc.ok("enrollments.direct", payload);
    assert!(created["matricule"].as_str().is_some());
    let learner = sc.ok("students.get", json!({ "id": created["studentId"] }));
    let rel = learner["photo"].as_str().expect("photo path");
    assert!(rel.starts_with("enrollment_photos/") && rel.ends_with(".png"), "{}", rel);
    assert!(dir.join("fichiers").join(rel).is_file());
    assert_eq!(sc.ok("enrollmentRequests.list", json!({}))["count"], json!(0));

    let mut missing = intake_payload(&s, "other@ums.test");
    missing["photoSourcePath"] = json!(dir.join("absent.jpg").to_string_lossy());
    let (code, error) = sc.fail("enrollments.direct", missing);
    assert_eq!(code, "validation_failed");
    assert!(error["details"]["fields"].get("photoSourcePath").is_some());

    sc.ok("auth.logout", json!({}));
    let (code, _) = sc.fail("enrollments.direct", intake_payload(&s, "anon@ums.test"));
    assert_eq!(code, "unauthenticated");
}
