use rusqlite::{ffi, Connection};
use std::path::Path;

pub const DB_FILE: &str = "ums.sqlite3";

/// Tables in dependency order; every statement is idempotent.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users(
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        username TEXT UNIQUE,
        role TEXT NOT NULL DEFAULT 'STUDENT',
        is_active INTEGER NOT NULL DEFAULT 1,
        is_staff INTEGER NOT NULL DEFAULT 0,
        is_superuser INTEGER NOT NULL DEFAULT 0,
        avatar TEXT,
        date_joined TEXT NOT NULL,
        last_login TEXT
    )",
    "CREATE TABLE IF NOT EXISTS academic_years(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'active',
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS semesters(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS faculties(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS departments(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        code TEXT NOT NULL,
        faculty_id TEXT NOT NULL,
        FOREIGN KEY(faculty_id) REFERENCES faculties(id) ON DELETE CASCADE,
        UNIQUE(faculty_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS promotions(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        code TEXT NOT NULL UNIQUE,
        department_id TEXT NOT NULL,
        FOREIGN KEY(department_id) REFERENCES departments(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS courses(
        id TEXT PRIMARY KEY,
        course_name TEXT NOT NULL UNIQUE,
        course_code TEXT NOT NULL UNIQUE,
        credits INTEGER NOT NULL,
        cm_hours REAL NOT NULL DEFAULT 0,
        td_hours REAL NOT NULL DEFAULT 0,
        tp_hours REAL NOT NULL DEFAULT 0,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS course_offerings(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        academic_year_id TEXT NOT NULL,
        semester_id TEXT NOT NULL,
        department_id TEXT NOT NULL,
        promotion_name TEXT NOT NULL,
        FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE CASCADE,
        FOREIGN KEY(academic_year_id) REFERENCES academic_years(id) ON DELETE CASCADE,
        FOREIGN KEY(semester_id) REFERENCES semesters(id) ON DELETE CASCADE,
        FOREIGN KEY(department_id) REFERENCES departments(id) ON DELETE CASCADE,
        UNIQUE(course_id, academic_year_id, semester_id, department_id, promotion_name)
    )",
    "CREATE TABLE IF NOT EXISTS addresses(
        id TEXT PRIMARY KEY,
        street TEXT NOT NULL,
        quarter TEXT NOT NULL,
        city_commune TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contacts(
        id TEXT PRIMARY KEY,
        phone_number TEXT NOT NULL,
        whatsapp_number TEXT,
        email TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS diplomas(
        id TEXT PRIMARY KEY,
        institution TEXT NOT NULL,
        obtaining_year TEXT NOT NULL,
        diploma_number TEXT NOT NULL,
        section TEXT NOT NULL,
        percentage REAL NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS parents(
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        middle_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        origin_country TEXT NOT NULL,
        province TEXT NOT NULL,
        address TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        email TEXT
    )",
    "CREATE TABLE IF NOT EXISTS sponsors(
        id TEXT PRIMARY KEY,
        sponsor_type TEXT NOT NULL,
        organization TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        address TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS students(
        id TEXT PRIMARY KEY,
        user_id TEXT UNIQUE,
        matricule TEXT UNIQUE,
        photo TEXT,
        first_name TEXT NOT NULL,
        middle_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        gender TEXT NOT NULL,
        marital_status TEXT NOT NULL,
        birth_place TEXT NOT NULL,
        birth_date TEXT NOT NULL,
        nationality TEXT NOT NULL DEFAULT 'CONGOLAISE',
        address_id TEXT UNIQUE,
        contact_id TEXT UNIQUE,
        diploma_id TEXT UNIQUE,
        father_id TEXT UNIQUE,
        mother_id TEXT UNIQUE,
        FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE SET NULL,
        FOREIGN KEY(address_id) REFERENCES addresses(id) ON DELETE SET NULL,
        FOREIGN KEY(contact_id) REFERENCES contacts(id) ON DELETE SET NULL,
        FOREIGN KEY(diploma_id) REFERENCES diplomas(id) ON DELETE SET NULL,
        FOREIGN KEY(father_id) REFERENCES parents(id) ON DELETE SET NULL,
        FOREIGN KEY(mother_id) REFERENCES parents(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS student_sponsors(
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        sponsor_id TEXT NOT NULL,
        contribution_type TEXT NOT NULL DEFAULT 'Frais Académiques',
        annual_commitment REAL,
        is_primary INTEGER NOT NULL DEFAULT 0,
        notes TEXT NOT NULL DEFAULT '',
        FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
        FOREIGN KEY(sponsor_id) REFERENCES sponsors(id) ON DELETE CASCADE,
        UNIQUE(student_id, sponsor_id)
    )",
    "CREATE TABLE IF NOT EXISTS enrollments(
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        year_id TEXT NOT NULL,
        semester_id TEXT NOT NULL,
        faculty_id TEXT NOT NULL,
        department_id TEXT,
        promotion TEXT NOT NULL,
        admission_exam INTEGER NOT NULL DEFAULT 0,
        how_known TEXT NOT NULL,
        why_chosen TEXT NOT NULL,
        mutual_affiliate INTEGER NOT NULL DEFAULT 0,
        mutual_details TEXT,
        commitments_accepted INTEGER NOT NULL,
        FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
        FOREIGN KEY(year_id) REFERENCES academic_years(id) ON DELETE CASCADE,
        FOREIGN KEY(semester_id) REFERENCES semesters(id) ON DELETE CASCADE,
        FOREIGN KEY(faculty_id) REFERENCES faculties(id) ON DELETE CASCADE,
        FOREIGN KEY(department_id) REFERENCES departments(id) ON DELETE SET NULL,
        UNIQUE(student_id, year_id, semester_id)
    )",
    "CREATE TABLE IF NOT EXISTS secondary_choices(
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL UNIQUE,
        faculty_id TEXT NOT NULL,
        department_id TEXT,
        promotion TEXT NOT NULL,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
        FOREIGN KEY(faculty_id) REFERENCES faculties(id) ON DELETE CASCADE,
        FOREIGN KEY(department_id) REFERENCES departments(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS documents(
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL,
        document_name TEXT NOT NULL,
        is_required INTEGER NOT NULL,
        file_path TEXT,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
        UNIQUE(enrollment_id, document_name)
    )",
    "CREATE TABLE IF NOT EXISTS enrollment_requests(
        id TEXT PRIMARY KEY,
        student_data TEXT NOT NULL,
        enrollment_data TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        submitted_at TEXT NOT NULL,
        reviewed_at TEXT,
        reviewed_by TEXT,
        review_notes TEXT NOT NULL DEFAULT '',
        enrollment_id TEXT UNIQUE,
        FOREIGN KEY(reviewed_by) REFERENCES users(id) ON DELETE SET NULL,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS assessment_types(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        is_major INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS assessment_weightings(
        id TEXT PRIMARY KEY,
        course_offering_id TEXT NOT NULL,
        assessment_type_id TEXT NOT NULL,
        weight_percentage REAL NOT NULL,
        FOREIGN KEY(course_offering_id) REFERENCES course_offerings(id) ON DELETE CASCADE,
        FOREIGN KEY(assessment_type_id) REFERENCES assessment_types(id) ON DELETE CASCADE,
        UNIQUE(course_offering_id, assessment_type_id)
    )",
    "CREATE TABLE IF NOT EXISTS grades(
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL,
        course_offering_id TEXT NOT NULL,
        assessment_type_id TEXT NOT NULL,
        score REAL NOT NULL,
        grading_date TEXT NOT NULL,
        recorded_by TEXT,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
        FOREIGN KEY(course_offering_id) REFERENCES course_offerings(id) ON DELETE CASCADE,
        FOREIGN KEY(assessment_type_id) REFERENCES assessment_types(id) ON DELETE CASCADE,
        FOREIGN KEY(recorded_by) REFERENCES users(id) ON DELETE SET NULL,
        UNIQUE(enrollment_id, course_offering_id, assessment_type_id)
    )",
    "CREATE TABLE IF NOT EXISTS fee_categories(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS academic_fees(
        id TEXT PRIMARY KEY,
        category_id TEXT NOT NULL,
        year_id TEXT NOT NULL,
        semester_id TEXT NOT NULL,
        amount REAL NOT NULL,
        FOREIGN KEY(category_id) REFERENCES fee_categories(id) ON DELETE CASCADE,
        FOREIGN KEY(year_id) REFERENCES academic_years(id) ON DELETE CASCADE,
        FOREIGN KEY(semester_id) REFERENCES semesters(id) ON DELETE CASCADE,
        UNIQUE(category_id, year_id, semester_id)
    )",
    "CREATE TABLE IF NOT EXISTS payments(
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL,
        academic_fee_id TEXT NOT NULL,
        payment_date TEXT NOT NULL,
        amount_paid REAL NOT NULL,
        payment_method TEXT NOT NULL,
        receipt_number TEXT NOT NULL UNIQUE,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE,
        FOREIGN KEY(academic_fee_id) REFERENCES academic_fees(id) ON DELETE CASCADE,
        UNIQUE(enrollment_id, academic_fee_id, receipt_number)
    )",
    "CREATE TABLE IF NOT EXISTS expense_categories(
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS expenses(
        id TEXT PRIMARY KEY,
        category_id TEXT NOT NULL,
        year_id TEXT,
        expense_date TEXT NOT NULL,
        amount REAL NOT NULL,
        description TEXT NOT NULL,
        reference_number TEXT NOT NULL UNIQUE,
        beneficiary_id TEXT NOT NULL,
        payment_status TEXT NOT NULL DEFAULT 'Payé',
        FOREIGN KEY(category_id) REFERENCES expense_categories(id) ON DELETE CASCADE,
        FOREIGN KEY(year_id) REFERENCES academic_years(id) ON DELETE SET NULL,
        FOREIGN KEY(beneficiary_id) REFERENCES users(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS course_assignments(
        id TEXT PRIMARY KEY,
        course_offering_id TEXT NOT NULL,
        teacher_id TEXT NOT NULL,
        assignment_role TEXT NOT NULL,
        FOREIGN KEY(course_offering_id) REFERENCES course_offerings(id) ON DELETE CASCADE,
        FOREIGN KEY(teacher_id) REFERENCES users(id) ON DELETE CASCADE,
        UNIQUE(course_offering_id, teacher_id, assignment_role)
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_departments_faculty ON departments(faculty_id)",
    "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_enrollments_year_promotion ON enrollments(year_id, promotion)",
    "CREATE INDEX IF NOT EXISTS idx_grades_enrollment ON grades(enrollment_id)",
    "CREATE INDEX IF NOT EXISTS idx_grades_offering ON grades(course_offering_id)",
    "CREATE INDEX IF NOT EXISTS idx_payments_enrollment ON payments(enrollment_id)",
    "CREATE INDEX IF NOT EXISTS idx_student_sponsors_student ON student_sponsors(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_enrollment_requests_status ON enrollment_requests(status)",
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    for sql in SCHEMA.iter().chain(INDEXES) {
        conn.execute(sql, [])?;
    }
    Ok(())
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&sql, [], |r| r.get(0))
}

/// UNIQUE / PRIMARY KEY violation (as opposed to NOT NULL or FOREIGN KEY).
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
