mod common;

use common::{intake_payload, seed_structure, workspace, Sidecar, Structure};
use serde_json::{json, Value};

struct Seeded {
    s: Structure,
    student_id: String,
    enrollment_id: String,
    matricule: String,
    payment_id: String,
}

fn seed(sc: &mut Sidecar) -> Seeded {
    let s = seed_structure(sc);
    let created = sc.ok("enrollments.direct", intake_payload(&s, "bulletin@ums.test"));
    let enrollment_id = created["enrollmentId"].as_str().expect("enrollment").to_string();

    let exam = sc.create("assessmentTypes", json!({ "name": "Examen", "isMajor": true }));
    let quiz = sc.create("assessmentTypes", json!({ "name": "Interrogation", "isMajor": false }));
    let mut offerings = Vec::new();
    for (name, code, credits) in [("Algorithmique", "INF101", 6), ("Analyse", "MAT101", 4), ("Physique", "PHY101", 3)] {
        let course = sc.create(
            "courses",
            json!({ "courseName": name, "courseCode": code, "credits": credits }),
        );
        offerings.push(sc.create(
            "courseOfferings",
            json!({
                "courseId": course,
                "academicYearId": s.year_id,
                "semesterId": s.semester_id,
                "departmentId": s.department_id,
                "promotionName": "l1",
            }),
        ));
    }
    for (offering, kind, score) in [
        (&offerings[0], &exam, 70.0),
        (&offerings[0], &quiz, 50.0),
        (&offerings[1], &exam, 30.0),
    ] {
        sc.create(
            "grades",
            json!({
                "enrollmentId": enrollment_id,
                "courseOfferingId": offering,
                "assessmentTypeId": kind,
                "score": score,
            }),
        );
    }

    let category = sc.create("feeCategories", json!({ "name": "Minerval" }));
    let fee = sc.create(
        "academicFees",
        json!({ "categoryId": category, "yearId": s.year_id, "semesterId": s.semester_id, "amount": 300 }),
    );
    let payment_id = sc.create(
        "payments",
        json!({
            "enrollmentId": enrollment_id,
            "academicFeeId": fee,
            "amountPaid": 150,
            "paymentMethod": "Mobile Money",
            "receiptNumber": "rec-2026-01",
            "paymentDate": "2026-02-01T09:15:00+01:00",
        }),
    );

    Seeded {
        s,
        student_id: created["studentId"].as_str().expect("student").to_string(),
        enrollment_id,
        matricule: created["matricule"].as_str().expect("matricule").to_string(),
        payment_id,
    }
}

fn assert_pdf(result: &Value, expected_name: &str) {
    assert_eq!(result["filename"], json!(expected_name));
    let path = result["path"].as_str().expect("path");
    let bytes = std::fs::read(path).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF-"), "not a pdf: {}", path);
    assert_eq!(result["byteCount"].as_u64(), Some(bytes.len() as u64));
}

#[test]
fn bulletin_model_and_pdf() {
    let dir = workspace("umsd-bulletin", "");
    let mut sc = Sidecar::admin(&dir);
    let seeded = seed(&mut sc);

    let model = sc.ok(
        "reports.bulletinModel",
        json!({ "enrollmentId": seeded.enrollment_id }),
    );
    let courses = model["courses"].as_array().expect("courses");
    assert_eq!(courses.len(), 3);
    assert_eq!(courses[0]["courseCode"], json!("INF101"));
    assert_eq!(courses[0]["average"].as_f64(), Some(60.0));
    assert_eq!(courses[0]["mention"], json!("Satisfaction"));
    assert_eq!(courses[1]["mention"], json!("Ajourné"));
    assert!(courses[2]["average"].is_null());
    assert_eq!(model["overallAverage"].as_f64(), Some(50.0));
    assert_eq!(model["validatedCredits"], json!(6));
    assert_eq!(model["totalCredits"], json!(13));
    assert_eq!(model["mention"], json!("Passable"));
    assert_eq!(model["decision"], json!("Admis"));

    let pdf = sc.ok(
        "reports.bulletinPdf",
        json!({ "enrollmentId": seeded.enrollment_id }),
    );
    let expected = format!("bulletin-{}-Y25-S1.pdf", seeded.matricule.replace('/', "-"));
    assert_pdf(&pdf, &expected);
    assert!(dir.join("exports").join(&expected).is_file());

    let (code, _) = sc.fail("reports.bulletinModel", json!({ "enrollmentId": "missing" }));
    assert_eq!(code, "not_found");
    let (code, _) = sc.fail("reports.bulletinModel", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn receipt_uses_workspace_currency_and_finance_gate() {
    let dir = workspace("umsd-receipt", "currency = \"CDF\"\nexports_dir = \"sorties\"\n");
    let mut sc = Sidecar::admin(&dir);
    let seeded = seed(&mut sc);

    let model = sc.ok(
        "reports.paymentReceiptModel",
        json!({ "paymentId": seeded.payment_id }),
    );
    assert_eq!(model["receiptNumber"], json!("REC-2026-01"));
    assert_eq!(model["currency"], json!("CDF"));
    assert_eq!(model["amountPaid"].as_f64(), Some(150.0));
    assert_eq!(model["feeCategory"], json!("Minerval"));
    assert_eq!(model["academicYear"], json!("2025-2026"));

    let pdf = sc.ok(
        "reports.paymentReceiptPdf",
        json!({ "paymentId": seeded.payment_id }),
    );
    assert_pdf(&pdf, "recu-REC-2026-01.pdf");
    assert!(dir.join("sorties").join("recu-REC-2026-01.pdf").is_file());

    sc.user("prof@ums.test", "prof-pass-1", "PROFESSOR");
    sc.login("prof@ums.test", "prof-pass-1");
    let (code, _) = sc.fail(
        "reports.paymentReceiptModel",
        json!({ "paymentId": seeded.payment_id }),
    );
    assert_eq!(code, "forbidden");
    sc.ok(
        "reports.bulletinModel",
        json!({ "enrollmentId": seeded.enrollment_id }),
    );
}

#[test]
fn exit_certificate_and_enrollment_form() {
    let dir = workspace("umsd-certificate", "");
    let mut sc = Sidecar::admin(&dir);
    let seeded = seed(&mut sc);

    let model = sc.ok(
        "reports.exitCertificateModel",
        json!({ "studentId": seeded.student_id }),
    );
    assert_eq!(model["fullName"], json!("MUKENDI JEAN"));
    assert_eq!(model["enrollments"].as_array().map(Vec::len), Some(1));
    assert_eq!(model["validatedCredits"], json!(6));
    assert_eq!(model["decision"], json!("Admis"));

    let out = dir.join("custom").join("etat.pdf");
    let pdf = sc.ok(
        "reports.exitCertificatePdf",
        json!({ "studentId": seeded.student_id, "outPath": out.to_string_lossy() }),
    );
    assert_eq!(pdf["path"], json!(out.to_string_lossy()));
    assert!(out.is_file());

    let form = sc.ok(
        "reports.enrollmentFormModel",
        json!({ "enrollmentId": seeded.enrollment_id }),
    );
    assert_eq!(form["header"]["promotion"], json!("L1"));
    assert_eq!(form["contact"]["email"], json!("bulletin@ums.test"));
    assert_eq!(form["diploma"]["percentage"].as_f64(), Some(68.5));
    assert!(form["father"]["fullName"].as_str().is_some());
    assert!(form["secondaryChoice"].is_null());

    let pdf = sc.ok(
        "reports.enrollmentFormPdf",
        json!({ "enrollmentId": seeded.enrollment_id }),
    );
    assert_pdf(
        &pdf,
        &format!("fiche-inscription-{}.pdf", seeded.matricule.replace('/', "-")),
    );
}

#[test]
fn proclamation_lists_matching_enrollments() {
    let dir = workspace("umsd-proclamation", "");
    let mut sc = Sidecar::admin(&dir);
    let seeded = seed(&mut sc);
    let s = &seeded.s;

    let model = sc.ok(
        "reports.proclamationModel",
        json!({ "yearId": s.year_id, "promotion": "L1", "departmentId": s.department_id }),
    );
    assert_eq!(model["department"], json!("Informatique"));
    assert_eq!(model["rows"].as_array().map(Vec::len), Some(1));
    assert_eq!(model["rows"][0]["decision"], json!("Admis"));

    let pdf = sc.ok(
        "reports.proclamationPdf",
        json!({ "yearId": s.year_id, "promotion": "L1" }),
    );
    assert_pdf(&pdf, "proclamation-L1-Y25.pdf");

    for params in [
        json!({ "promotion": "L1" }),
        json!({ "yearId": s.year_id }),
        json!({ "yearId": "missing", "promotion": "L1" }),
        json!({ "yearId": s.year_id, "promotion": "L1", "departmentId": "missing" }),
        json!({ "yearId": s.year_id, "promotion": "M2" }),
    ] {
        let (code, _) = sc.fail("reports.proclamationPdf", params);
        assert_eq!(code, "not_found");
    }
}
