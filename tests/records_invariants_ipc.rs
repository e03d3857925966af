mod common;

use common::{intake_payload, seed_structure, workspace, Sidecar};
use serde_json::{json, Value};

fn student(sc: &mut Sidecar, email: &str) -> Value {
    let contact_id = sc.create(
        "contacts",
        json!({ "phoneNumber": "+243990000000", "email": email }),
    );
    sc.ok(
        "students.create",
        json!({
            "firstName": "  aMANI ",
            "middleName": "kito",
            "lastName": "zawadi",
            "gender": "feminin",
            "maritalStatus": "Célibataire",
            "birthPlace": "Goma",
            "birthDate": "2005-02-11",
            "contactId": contact_id,
        }),
    )
}

fn is_matricule(m: &str) -> bool {
    let b = m.as_bytes();
    m.len() == 10
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'/'
        && b[8..].iter().all(u8::is_ascii_digit)
}

#[test]
fn saving_an_active_year_demotes_the_others() {
    let dir = workspace("umsd-active-year", "");
    let mut sc = Sidecar::admin(&dir);
    let first = seed_structure(&mut sc).year_id;
    let second = sc.create(
        "academicYears",
        json!({
            "name": "2026-2027",
            "code": " y26 ",
            "status": "active",
            "startDate": "2026-10-01",
            "endDate": "2027-07-31",
        }),
    );

    let active = sc.ok("academicYears.list", json!({ "filter": { "status": "active" } }));
    assert_eq!(active["count"], json!(1));
    assert_eq!(active["results"][0]["id"], json!(second));
    assert_eq!(active["results"][0]["code"], json!("Y26"));

    sc.ok(
        "academicYears.update",
        json!({ "id": first, "patch": { "status": "active" } }),
    );
    let active = sc.ok("academicYears.list", json!({ "filter": { "status": "active" } }));
    assert_eq!(active["count"], json!(1));
    assert_eq!(active["results"][0]["id"], json!(first));
}

#[test]
fn validation_reports_every_field() {
    let dir = workspace("umsd-validation", "");
    let mut sc = Sidecar::admin(&dir);

    let (code, error) = sc.fail("departments.create", json!({}));
    assert_eq!(code, "validation_failed");
    for field in ["name", "code", "facultyId"] {
        assert!(
            error.pointer(&format!("/details/fields/{}", field)).is_some(),
            "missing {} in {}",
            field,
            error
        );
    }

    let (code, error) = sc.fail(
        "departments.create",
        json!({ "name": "Chimie", "code": "chm", "facultyId": "nope", "colour": "red" }),
    );
    assert_eq!(code, "validation_failed");
    assert!(error.pointer("/details/fields/facultyId").is_some());
    assert!(error.pointer("/details/fields/colour").is_some());

    let (code, error) = sc.fail(
        "academicYears.create",
        json!({ "name": "X", "code": "X", "startDate": "31/12/2025", "endDate": "2026-07-31" }),
    );
    assert_eq!(code, "validation_failed");
    assert!(error.pointer("/details/fields/startDate").is_some());
}

#[test]
fn unique_keys_reject_duplicates() {
    let dir = workspace("umsd-unique", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let (code, _) = sc.fail("faculties.create", json!({ "name": "Sciences", "code": "SC2" }));
    assert_eq!(code, "conflict");

    let (code, _) = sc.fail(
        "departments.create",
        json!({ "name": "Informatique", "code": "INF2", "facultyId": s.faculty_id }),
    );
    assert_eq!(code, "conflict");
    let other_faculty = sc.create("faculties", json!({ "name": "Economie", "code": "eco" }));
    sc.create(
        "departments",
        json!({ "name": "Informatique", "code": "INF", "facultyId": other_faculty }),
    );

    sc.create("contacts", json!({ "phoneNumber": "1", "email": "dup@ums.test" }));
    let (code, _) = sc.fail(
        "contacts.create",
        json!({ "phoneNumber": "2", "email": "dup@ums.test" }),
    );
    assert_eq!(code, "conflict");

    let departments = sc.ok("departments.list", json!({}));
    assert_eq!(departments["count"], json!(2));
}

#[test]
fn scores_and_amounts_are_normalized() {
    let dir = workspace("umsd-normalize", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);
    let admin_id = sc.ok("auth.whoami", json!({}))["id"].clone();

    let learner = student(&mut sc, "amani@ums.test");
    let enrollment_id = sc.create(
        "enrollments",
        json!({
            "studentId": learner["id"],
            "yearId": s.year_id,
            "semesterId": s.semester_id,
            "facultyId": s.faculty_id,
            "promotion": "L1",
            "howKnown": "Ami",
            "whyChosen": "Proximité",
            "mutualAffiliate": false,
            "mutualDetails": "should vanish",
            "commitmentsAccepted": true,
        }),
    );
    let enrollment = sc.ok("enrollments.get", json!({ "id": enrollment_id }));
    assert!(enrollment["mutualDetails"].is_null());

    let course_id = sc.create(
        "courses",
        json!({ "courseName": "Analyse", "courseCode": " mat101 ", "credits": 4 }),
    );
    let offering_id = sc.create(
        "courseOfferings",
        json!({
            "courseId": course_id,
            "academicYearId": s.year_id,
            "semesterId": s.semester_id,
            "departmentId": s.department_id,
            "promotionName": "licence un",
        }),
    );
    let offering = sc.ok("courseOfferings.get", json!({ "id": offering_id }));
    assert_eq!(offering["promotionName"], json!("Licence Un"));

    let exam = sc.create("assessmentTypes", json!({ "name": "examen final", "isMajor": true }));
    let weighting = sc.ok(
        "assessmentWeightings.create",
        json!({ "courseOfferingId": offering_id, "assessmentTypeId": exam, "weightPercentage": 140 }),
    );
    assert_eq!(weighting["weightPercentage"].as_f64(), Some(100.0));

    let grade = sc.ok(
        "grades.create",
        json!({
            "enrollmentId": enrollment_id,
            "courseOfferingId": offering_id,
            "assessmentTypeId": exam,
            "score": 130,
        }),
    );
    assert_eq!(grade["score"].as_f64(), Some(100.0));
    assert_eq!(grade["recordedBy"], admin_id);
    assert!(grade["gradingDate"].as_str().is_some());
    let grade = sc.ok(
        "grades.update",
        json!({ "id": grade["id"], "patch": { "score": -5 } }),
    );
    assert_eq!(grade["score"].as_f64(), Some(0.0));
    let (code, _) = sc.fail(
        "grades.create",
        json!({
            "enrollmentId": enrollment_id,
            "courseOfferingId": offering_id,
            "assessmentTypeId": exam,
            "score": 50,
        }),
    );
    assert_eq!(code, "conflict");

    let category = sc.create("feeCategories", json!({ "name": "Minerval" }));
    let fee = sc.ok(
        "academicFees.create",
        json!({ "categoryId": category, "yearId": s.year_id, "semesterId": s.semester_id, "amount": -300 }),
    );
    assert_eq!(fee["amount"].as_f64(), Some(300.0));
    let payment = sc.ok(
        "payments.create",
        json!({
            "enrollmentId": enrollment_id,
            "academicFeeId": fee["id"],
            "amountPaid": -150.5,
            "paymentMethod": "Cash",
            "receiptNumber": " rec-001 ",
        }),
    );
    assert_eq!(payment["amountPaid"].as_f64(), Some(150.5));
    assert_eq!(payment["receiptNumber"], json!("REC-001"));
    assert!(payment["paymentDate"].as_str().is_some());

    let expense_category = sc.create("expenseCategories", json!({ "name": "Fournitures" }));
    let expense = sc.ok(
        "expenses.create",
        json!({
            "categoryId": expense_category,
            "amount": -42,
            "description": "Craies",
            "referenceNumber": "dep-1",
            "beneficiaryId": admin_id,
        }),
    );
    assert_eq!(expense["amount"].as_f64(), Some(42.0));
    assert_eq!(expense["paymentStatus"], json!("Payé"));
    assert_eq!(expense["referenceNumber"], json!("DEP-1"));

    let summary = sc.ok("dashboard.summary", json!({}));
    assert_eq!(summary["paymentsTotal"].as_f64(), Some(150.5));
    assert_eq!(summary["expensesTotal"].as_f64(), Some(42.0));
}

#[test]
fn primary_sponsor_is_unique_per_student() {
    let dir = workspace("umsd-sponsors", "");
    let mut sc = Sidecar::admin(&dir);
    let learner = student(&mut sc, "sponsored@ums.test");
    let mut links = Vec::new();
    for org in ["Église", "ONG Espoir"] {
        let sponsor = sc.create(
            "sponsors",
            json!({ "sponsorType": "Organisation", "organization": org, "phoneNumber": "1", "address": "Bukavu" }),
        );
        links.push(sc.create(
            "studentSponsors",
            json!({ "studentId": learner["id"], "sponsorId": sponsor, "isPrimary": true }),
        ));
    }
    let primaries = sc.ok(
        "studentSponsors.list",
        json!({ "filter": { "studentId": learner["id"], "isPrimary": true } }),
    );
    assert_eq!(primaries["count"], json!(1));
    assert_eq!(primaries["results"][0]["id"], json!(links[1]));
    assert_eq!(primaries["results"][0]["contributionType"], json!("Frais Académiques"));
}

#[test]
fn student_creation_generates_matricule_and_login() {
    let dir = workspace("umsd-students", "default_student_password = \"bienvenue-ums\"\n");
    let mut sc = Sidecar::admin(&dir);

    let first = student(&mut sc, "first@ums.test");
    let second = student(&mut sc, "second@ums.test");
    let m1 = first["matricule"].as_str().expect("matricule").to_string();
    let m2 = second["matricule"].as_str().expect("matricule").to_string();
    assert!(is_matricule(&m1), "{}", m1);
    assert!(m1.starts_with("0001-"));
    assert!(m2.starts_with("0002-"));
    assert_eq!(m1[4..], m2[4..]);
    assert_eq!(first["firstName"], json!("Amani"));
    assert_eq!(first["lastName"], json!("Zawadi"));
    assert_eq!(first["nationality"], json!("CONGOLAISE"));
    assert!(first["userId"].as_str().is_some());

    let login = sc.login("first@ums.test", "bienvenue-ums");
    assert_eq!(login["role"], json!("STUDENT"));
}

#[test]
fn delete_cascades_and_reports_missing_rows() {
    let dir = workspace("umsd-delete", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    let deleted = sc.ok("faculties.delete", json!({ "id": s.faculty_id }));
    assert_eq!(deleted["deleted"], json!(s.faculty_id));
    let departments = sc.ok("departments.list", json!({}));
    assert_eq!(departments["count"], json!(0));

    let (code, _) = sc.fail("faculties.delete", json!({ "id": s.faculty_id }));
    assert_eq!(code, "not_found");
}

#[test]
fn course_credits_are_bounded_and_reports_survive_the_maximum() {
    let dir = workspace("umsd-credits", "");
    let mut sc = Sidecar::admin(&dir);
    let s = seed_structure(&mut sc);

    for credits in [json!(0), json!(-4), json!(2147483648i64), json!(i64::MAX)] {
        let (code, error) = sc.fail(
            "courses.create",
            json!({ "courseName": "Analyse", "courseCode": "MAT101", "credits": credits }),
        );
        assert_eq!(code, "validation_failed", "credits {}", credits);
        assert!(error.pointer("/details/fields/credits").is_some());
    }

    let created = sc.ok("enrollments.direct", intake_payload(&s, "credits@ums.test"));
    let exam = sc.create("assessmentTypes", json!({ "name": "Examen", "isMajor": true }));
    let mut courses = Vec::new();
    for (name, code) in [("Analyse", "MAT101"), ("Physique", "PHY101")] {
        let course = sc.create(
            "courses",
            json!({ "courseName": name, "courseCode": code, "credits": 2147483647i64 }),
        );
        let offering = sc.create(
            "courseOfferings",
            json!({
                "courseId": course,
                "academicYearId": s.year_id,
                "semesterId": s.semester_id,
                "departmentId": s.department_id,
                "promotionName": "l1",
            }),
        );
        sc.create(
            "grades",
            json!({
                "enrollmentId": created["enrollmentId"],
                "courseOfferingId": offering,
                "assessmentTypeId": exam,
                "score": 75,
            }),
        );
        courses.push(course);
    }

    let (code, _) = sc.fail(
        "courses.update",
        json!({ "id": courses[0], "patch": { "credits": -1 } }),
    );
    assert_eq!(code, "validation_failed");

    let model = sc.ok(
        "reports.bulletinModel",
        json!({ "enrollmentId": created["enrollmentId"] }),
    );
    assert_eq!(model["totalCredits"], json!(4294967294i64));
    assert_eq!(model["validatedCredits"], json!(4294967294i64));
    let certificate = sc.ok(
        "reports.exitCertificateModel",
        json!({ "studentId": created["studentId"] }),
    );
    assert_eq!(certificate["validatedCredits"], json!(4294967294i64));
}
