//! Public enrollment requests: a nested student + enrollment payload kept
//! as JSON until a reviewer approves it, at which point it is expanded into
//! real records through the regular save path.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::records::{self, RecordError, ResourceKind, SaveContext};

pub const PHOTO_SUBDIR: &str = "enrollment_photos";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddressPayload {
    pub street: String,
    pub quarter: String,
    pub city_commune: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactPayload {
    pub phone_number: String,
    #[serde(default)]
    pub whatsapp_number: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiplomaPayload {
    pub institution: String,
    pub obtaining_year: String,
    pub diploma_number: String,
    pub section: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParentPayload {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub origin_country: String,
    pub province: String,
    pub address: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentPayload {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub gender: String,
    pub marital_status: String,
    pub birth_place: String,
    pub birth_date: String,
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    pub address: AddressPayload,
    pub contact: ContactPayload,
    pub diploma: DiplomaPayload,
    pub father: ParentPayload,
    pub mother: ParentPayload,
}

impl StudentPayload {
    /// The student's own columns, without the one-to-one records.
    fn identity(&self) -> Value {
        json!({
            "firstName": self.first_name,
            "middleName": self.middle_name,
            "lastName": self.last_name,
            "gender": self.gender,
            "maritalStatus": self.marital_status,
            "birthPlace": self.birth_place,
            "birthDate": self.birth_date,
            "nationality": self.nationality,
            "photo": self.photo,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnrollmentPayload {
    pub year_id: String,
    pub semester_id: String,
    pub faculty_id: String,
    #[serde(default)]
    pub department_id: Option<String>,
    pub promotion: String,
    #[serde(default)]
    pub admission_exam: bool,
    pub how_known: String,
    pub why_chosen: String,
    #[serde(default)]
    pub mutual_affiliate: bool,
    #[serde(default)]
    pub mutual_details: Option<String>,
    pub commitments_accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakePayload {
    pub student: StudentPayload,
    pub enrollment: EnrollmentPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RecordError> {
    serde_json::to_value(value).map_err(|e| RecordError::invalid("payload", e.to_string()))
}

fn prefixed(e: RecordError, prefix: &str) -> RecordError {
    match e {
        RecordError::Invalid(fields) => RecordError::Invalid(
            fields
                .into_iter()
                .map(|(k, v)| (format!("{}.{}", prefix, k), v))
                .collect(),
        ),
        other => other,
    }
}

/// Reads `{student, enrollment}` out of request params.
pub fn parse_payload(params: &Value) -> Result<IntakePayload, RecordError> {
    let mut errors = records::FieldErrors::new();
    let student = match params.get("student") {
        Some(v) => serde_json::from_value::<StudentPayload>(v.clone())
            .map_err(|e| errors.insert("student".to_string(), e.to_string()))
            .ok(),
        None => {
            errors.insert("student".to_string(), "this field is required".to_string());
            None
        }
    };
    let enrollment = match params.get("enrollment") {
        Some(v) => serde_json::from_value::<EnrollmentPayload>(v.clone())
            .map_err(|e| errors.insert("enrollment".to_string(), e.to_string()))
            .ok(),
        None => {
            errors.insert("enrollment".to_string(), "this field is required".to_string());
            None
        }
    };
    match (student, enrollment) {
        (Some(student), Some(enrollment)) => Ok(IntakePayload {
            student,
            enrollment,
        }),
        _ => Err(RecordError::Invalid(errors)),
    }
}

/// Runs every part through its resource's validation without writing.
/// Keys filled in during expansion (the student's links, the enrollment's
/// student) are not checked here.
pub fn check(conn: &Connection, payload: &IntakePayload) -> Result<(), RecordError> {
    let s = &payload.student;
    let parts: [(ResourceKind, &str, Value); 7] = [
        (ResourceKind::Addresses, "student.address", to_json(&s.address)?),
        (ResourceKind::Contacts, "student.contact", to_json(&s.contact)?),
        (ResourceKind::Diplomas, "student.diploma", to_json(&s.diploma)?),
        (ResourceKind::Parents, "student.father", to_json(&s.father)?),
        (ResourceKind::Parents, "student.mother", to_json(&s.mother)?),
        (ResourceKind::Students, "student", s.identity()),
        (ResourceKind::Enrollments, "enrollment", to_json(&payload.enrollment)?),
    ];

    let mut errors = records::FieldErrors::new();
    for (kind, prefix, value) in parts {
        let Some(obj) = value.as_object() else {
            continue;
        };
        if let Err(e) = records::validate(conn, records::resource_of(kind), obj, true) {
            match prefixed(e, prefix) {
                RecordError::Invalid(fields) => {
                    errors.extend(
                        fields
                            .into_iter()
                            .filter(|(k, _)| k != "enrollment.studentId"),
                    );
                }
                other => return Err(other),
            }
        }
    }
    if !payload.enrollment.commitments_accepted {
        errors.insert(
            "enrollment.commitmentsAccepted".to_string(),
            "the commitments must be accepted".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RecordError::Invalid(errors))
    }
}

/// Copies an uploaded photo under `<media_root>/enrollment_photos/` and
/// returns the path relative to the media root.
pub fn store_photo(media_root: &Path, source: &Path) -> Result<String, RecordError> {
    if !source.is_file() {
        return Err(RecordError::invalid("photoSourcePath", "file does not exist"));
    }
    let dir = media_root.join(PHOTO_SUBDIR);
    std::fs::create_dir_all(&dir)?;
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "jpg".to_string());
    let file_name = format!("{}.{}", Uuid::new_v4().simple(), ext);
    std::fs::copy(source, dir.join(&file_name))?;
    Ok(format!("{}/{}", PHOTO_SUBDIR, file_name))
}

pub struct Materialized {
    pub student_id: String,
    pub enrollment_id: String,
}

/// Creates address, contact, diploma, father, mother, student and
/// enrollment, in that order, on `conn`. The caller owns the transaction.
pub fn materialize(
    conn: &Connection,
    payload: &IntakePayload,
    ctx: &SaveContext,
) -> Result<Materialized, RecordError> {
    let s = &payload.student;
    let insert = |kind: ResourceKind, value: &Value, prefix: &str| {
        records::insert(conn, records::resource_of(kind), value, ctx).map_err(|e| prefixed(e, prefix))
    };

    let address_id = insert(ResourceKind::Addresses, &to_json(&s.address)?, "student.address")?;
    let contact_id = insert(ResourceKind::Contacts, &to_json(&s.contact)?, "student.contact")?;
    let diploma_id = insert(ResourceKind::Diplomas, &to_json(&s.diploma)?, "student.diploma")?;
    let father_id = insert(ResourceKind::Parents, &to_json(&s.father)?, "student.father")?;
    let mother_id = insert(ResourceKind::Parents, &to_json(&s.mother)?, "student.mother")?;

    let mut student = s.identity();
    student["addressId"] = json!(address_id);
    student["contactId"] = json!(contact_id);
    student["diplomaId"] = json!(diploma_id);
    student["fatherId"] = json!(father_id);
    student["motherId"] = json!(mother_id);
    let student_id = insert(ResourceKind::Students, &student, "student")?;

    let mut enrollment = to_json(&payload.enrollment)?;
    enrollment["studentId"] = json!(student_id);
    let enrollment_id = insert(ResourceKind::Enrollments, &enrollment, "enrollment")?;

    Ok(Materialized {
        student_id,
        enrollment_id,
    })
}

pub fn submit(
    conn: &Connection,
    payload: &IntakePayload,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    check(conn, payload)?;
    let id = Uuid::new_v4().to_string();
    let submitted_at = ctx.timestamp();
    conn.execute(
        "INSERT INTO enrollment_requests(id, student_data, enrollment_data, status, submitted_at)
         VALUES(?, ?, ?, 'pending', ?)",
        (
            &id,
            to_json(&payload.student)?.to_string(),
            to_json(&payload.enrollment)?.to_string(),
            &submitted_at,
        ),
    )?;
    tracing::info!(request_id = %id, student = %payload.student.full_name(), "enrollment request submitted");
    Ok(json!({
        "id": id,
        "status": RequestStatus::Pending.as_str(),
        "submittedAt": submitted_at,
    }))
}

pub fn status(conn: &Connection, id: &str) -> Result<Value, RecordError> {
    conn.query_row(
        "SELECT id, status, submitted_at FROM enrollment_requests WHERE id = ?",
        [id],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
                "submittedAt": r.get::<_, String>(2)?,
            }))
        },
    )
    .optional()?
    .ok_or_else(|| RecordError::NotFound("enrollment request".to_string()))
}

pub fn list(conn: &Connection, status: Option<&str>) -> Result<Vec<Value>, RecordError> {
    let status = match status {
        Some(s) => Some(
            RequestStatus::parse(s)
                .ok_or_else(|| RecordError::invalid("status", "select a valid choice"))?,
        ),
        None => None,
    };
    let mut stmt = conn.prepare(
        "SELECT id, status, submitted_at, student_data
         FROM enrollment_requests
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY submitted_at DESC",
    )?;
    let rows = stmt
        .query_map([status.map(RequestStatus::as_str)], |r| {
            let student_data: String = r.get(3)?;
            let student: Value = serde_json::from_str(&student_data).unwrap_or(Value::Null);
            let name = format!(
                "{} {}",
                student["firstName"].as_str().unwrap_or_default(),
                student["lastName"].as_str().unwrap_or_default()
            );
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
                "submittedAt": r.get::<_, String>(2)?,
                "studentName": name.trim(),
                "email": student["contact"]["email"],
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

struct StoredRequest {
    status: String,
    student_data: String,
    enrollment_data: String,
}

fn load(conn: &Connection, id: &str) -> Result<StoredRequest, RecordError> {
    conn.query_row(
        "SELECT status, student_data, enrollment_data FROM enrollment_requests WHERE id = ?",
        [id],
        |r| {
            Ok(StoredRequest {
                status: r.get(0)?,
                student_data: r.get(1)?,
                enrollment_data: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| RecordError::NotFound("enrollment request".to_string()))
}

pub fn get(conn: &Connection, id: &str) -> Result<Value, RecordError> {
    let stored = load(conn, id)?;
    let (submitted_at, reviewed_at, reviewed_by, review_notes, enrollment_id): (
        String,
        Option<String>,
        Option<String>,
        String,
        Option<String>,
    ) = conn.query_row(
        "SELECT submitted_at, reviewed_at, reviewed_by, review_notes, enrollment_id
         FROM enrollment_requests WHERE id = ?",
        [id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
    )?;
    Ok(json!({
        "id": id,
        "status": stored.status,
        "submittedAt": submitted_at,
        "reviewedAt": reviewed_at,
        "reviewedBy": reviewed_by,
        "reviewNotes": review_notes,
        "enrollmentId": enrollment_id,
        "student": serde_json::from_str::<Value>(&stored.student_data).unwrap_or(Value::Null),
        "enrollment": serde_json::from_str::<Value>(&stored.enrollment_data).unwrap_or(Value::Null),
    }))
}

fn ensure_pending(stored: &StoredRequest) -> Result<(), RecordError> {
    if stored.status == RequestStatus::Pending.as_str() {
        Ok(())
    } else {
        Err(RecordError::InvalidTransition(format!(
            "request is already {}",
            stored.status
        )))
    }
}

/// Expands a pending request into records and marks it approved. Either
/// everything is written or nothing is.
pub fn approve(
    conn: &Connection,
    id: &str,
    notes: Option<&str>,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    let tx = conn.unchecked_transaction()?;
    let stored = load(&tx, id)?;
    ensure_pending(&stored)?;

    let payload = IntakePayload {
        student: serde_json::from_str(&stored.student_data)
            .map_err(|e| RecordError::invalid("student", e.to_string()))?,
        enrollment: serde_json::from_str(&stored.enrollment_data)
            .map_err(|e| RecordError::invalid("enrollment", e.to_string()))?,
    };
    let created = materialize(&tx, &payload, ctx)?;

    tx.execute(
        "UPDATE enrollment_requests
         SET status = 'approved', reviewed_at = ?, reviewed_by = ?, review_notes = ?, enrollment_id = ?
         WHERE id = ?",
        (
            ctx.timestamp(),
            ctx.actor.map(|a| a.id.as_str()),
            notes.unwrap_or_default(),
            &created.enrollment_id,
            id,
        ),
    )?;
    let out = get(&tx, id)?;
    tx.commit()?;
    tracing::info!(
        request_id = id,
        enrollment_id = %created.enrollment_id,
        reviewer = ?ctx.actor.map(|a| a.full_name()),
        "enrollment request approved"
    );
    Ok(out)
}

pub fn reject(
    conn: &Connection,
    id: &str,
    notes: Option<&str>,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    let stored = load(conn, id)?;
    ensure_pending(&stored)?;
    conn.execute(
        "UPDATE enrollment_requests
         SET status = 'rejected', reviewed_at = ?, reviewed_by = ?, review_notes = ?
         WHERE id = ? AND status = 'pending'",
        (
            ctx.timestamp(),
            ctx.actor.map(|a| a.id.as_str()),
            notes.unwrap_or_default(),
            id,
        ),
    )?;
    tracing::info!(request_id = id, "enrollment request rejected");
    get(conn, id)
}

/// Staff-side enrollment: the same expansion with no pending stage.
pub fn direct(
    conn: &Connection,
    payload: &IntakePayload,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    check(conn, payload)?;
    let tx = conn.unchecked_transaction()?;
    let created = materialize(&tx, payload, ctx)?;
    let matricule: Option<String> = tx.query_row(
        "SELECT matricule FROM students WHERE id = ?",
        [&created.student_id],
        |r| r.get(0),
    )?;
    tx.commit()?;
    Ok(json!({
        "studentId": created.student_id,
        "enrollmentId": created.enrollment_id,
        "matricule": matricule,
    }))
}
