//! Descriptor-driven CRUD over the university tables.
//!
//! Every resource is a static [`Resource`]: its namespace on the wire, its
//! table, its fields and the role groups allowed to read and write it.
//! Writes go through `validate -> pre_save -> SQL -> post_save`, all on the
//! caller's connection so that a surrounding transaction covers the hooks.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::{self, Role, RoleGroup, SessionUser};
use crate::config::WorkspaceConfig;
use crate::db;
use crate::matricule;
use crate::normalize::{abs_amount, clamp_percent, title_case, upper_trim};

pub type FieldErrors = BTreeMap<String, String>;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed")]
    Invalid(FieldErrors),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("database error: {0}")]
    Db(rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Render(#[from] crate::pdf::PdfError),
}

impl RecordError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        Self::Invalid(errors)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Invalid(_) => "validation_failed",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Db(_) => "db_query_failed",
            Self::Io(_) => "io_failed",
            Self::Render(_) => "render_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Invalid(errors) => Some(json!({ "fields": errors })),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RecordError {
    fn from(e: rusqlite::Error) -> Self {
        if db::is_unique_violation(&e) {
            return Self::Conflict(e.to_string());
        }
        if db::is_foreign_key_violation(&e) {
            return Self::invalid("reference", "referenced record does not exist");
        }
        Self::Db(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text(usize),
    LongText,
    Email,
    /// Inclusive bounds.
    Int(i64, i64),
    Decimal,
    Bool,
    Date,
    DateTime,
    /// Four ASCII digits.
    Year,
    Choice(&'static [&'static str]),
    Ref(&'static str),
    /// Write-only; stored hashed in the column, never read back.
    Password,
}

/// Value substituted when an optional field arrives empty.
#[derive(Debug, Clone, Copy)]
pub enum Fallback {
    Text(&'static str),
    Bool(bool),
    Zero,
}

impl Fallback {
    fn value(self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.to_string()),
            Self::Bool(b) => Value::Bool(b),
            Self::Zero => json!(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub param: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub fallback: Option<Fallback>,
}

impl Field {
    const fn or(self, fallback: Fallback) -> Self {
        Self {
            fallback: Some(fallback),
            ..self
        }
    }
}

const fn req(param: &'static str, column: &'static str, kind: FieldKind) -> Field {
    Field {
        param,
        column,
        kind,
        required: true,
        fallback: None,
    }
}

const fn opt(param: &'static str, column: &'static str, kind: FieldKind) -> Field {
    Field {
        param,
        column,
        kind,
        required: false,
        fallback: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    AcademicYears,
    Semesters,
    Faculties,
    Departments,
    Promotions,
    Courses,
    CourseOfferings,
    Addresses,
    Contacts,
    Diplomas,
    Parents,
    Sponsors,
    Students,
    StudentSponsors,
    Enrollments,
    SecondaryChoices,
    Documents,
    AssessmentTypes,
    AssessmentWeightings,
    Grades,
    FeeCategories,
    AcademicFees,
    Payments,
    ExpenseCategories,
    Expenses,
    CourseAssignments,
    Users,
}

#[derive(Debug)]
pub struct Resource {
    pub kind: ResourceKind,
    pub namespace: &'static str,
    pub table: &'static str,
    pub label: &'static str,
    pub fields: &'static [Field],
    pub order_by: &'static str,
    pub read: RoleGroup,
    pub write: RoleGroup,
}

impl Resource {
    pub fn field(&self, param: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.param == param)
    }

    fn readable_fields(&self) -> impl Iterator<Item = &'static Field> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.kind, FieldKind::Password))
    }
}

use self::FieldKind::{
    Bool, Choice, Date, DateTime as Stamp, Decimal, Email, Int, LongText, Password, Ref, Text,
    Year,
};

const MAX_CREDITS: i64 = i32::MAX as i64;
const YEAR_STATUSES: &[&str] = &["active", "inactive"];
const GENDERS: &[&str] = &["masculin", "feminin"];

pub static RESOURCES: &[Resource] = &[
    Resource {
        kind: ResourceKind::AcademicYears,
        namespace: "academicYears",
        table: "academic_years",
        label: "academic year",
        fields: &[
            req("name", "name", Text(100)),
            req("code", "code", Text(5)),
            opt("status", "status", Choice(YEAR_STATUSES)).or(Fallback::Text("active")),
            req("startDate", "start_date", Date),
            req("endDate", "end_date", Date),
        ],
        order_by: "start_date DESC, name",
        read: RoleGroup::AllStaff,
        write: RoleGroup::Management,
    },
    Resource {
        kind: ResourceKind::Semesters,
        namespace: "semesters",
        table: "semesters",
        label: "semester",
        fields: &[req("name", "name", Text(100)), req("code", "code", Text(5))],
        order_by: "name",
        read: RoleGroup::AllStaff,
        write: RoleGroup::Management,
    },
    Resource {
        kind: ResourceKind::Faculties,
        namespace: "faculties",
        table: "faculties",
        label: "faculty",
        fields: &[req("name", "name", Text(100)), req("code", "code", Text(5))],
        order_by: "name",
        read: RoleGroup::AllStaff,
        write: RoleGroup::Management,
    },
    Resource {
        kind: ResourceKind::Departments,
        namespace: "departments",
        table: "departments",
        label: "department",
        fields: &[
            req("name", "name", Text(100)),
            req("code", "code", Text(5)),
            req("facultyId", "faculty_id", Ref("faculties")),
        ],
        order_by: "name",
        read: RoleGroup::AllStaff,
        write: RoleGroup::Management,
    },
    Resource {
        kind: ResourceKind::Promotions,
        namespace: "promotions",
        table: "promotions",
        label: "promotion",
        fields: &[
            req("name", "name", Text(100)),
            req("code", "code", Text(5)),
            req("departmentId", "department_id", Ref("departments")),
        ],
        order_by: "name",
        read: RoleGroup::AllStaff,
        write: RoleGroup::Management,
    },
    Resource {
        kind: ResourceKind::Courses,
        namespace: "courses",
        table: "courses",
        label: "course",
        fields: &[
            req("courseName", "course_name", Text(150)),
            req("courseCode", "course_code", Text(10)),
            req("credits", "credits", Int(1, MAX_CREDITS)),
            opt("cmHours", "cm_hours", Decimal).or(Fallback::Zero),
            opt("tdHours", "td_hours", Decimal).or(Fallback::Zero),
            opt("tpHours", "tp_hours", Decimal).or(Fallback::Zero),
            opt("description", "description", LongText),
        ],
        order_by: "course_code",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::CourseOfferings,
        namespace: "courseOfferings",
        table: "course_offerings",
        label: "course offering",
        fields: &[
            req("courseId", "course_id", Ref("courses")),
            req("academicYearId", "academic_year_id", Ref("academic_years")),
            req("semesterId", "semester_id", Ref("semesters")),
            req("departmentId", "department_id", Ref("departments")),
            req("promotionName", "promotion_name", Text(100)),
        ],
        order_by: "promotion_name",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Addresses,
        namespace: "addresses",
        table: "addresses",
        label: "address",
        fields: &[
            req("street", "street", Text(100)),
            req("quarter", "quarter", Text(50)),
            req("cityCommune", "city_commune", Text(50)),
        ],
        order_by: "city_commune, street",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Contacts,
        namespace: "contacts",
        table: "contacts",
        label: "contact",
        fields: &[
            req("phoneNumber", "phone_number", Text(20)),
            opt("whatsappNumber", "whatsapp_number", Text(20)),
            req("email", "email", Email),
        ],
        order_by: "email",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Diplomas,
        namespace: "diplomas",
        table: "diplomas",
        label: "diploma",
        fields: &[
            req("institution", "institution", Text(100)),
            req("obtainingYear", "obtaining_year", Year),
            req("diplomaNumber", "diploma_number", Text(50)),
            req("section", "section", Text(50)),
            req("percentage", "percentage", Decimal),
        ],
        order_by: "diploma_number",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Parents,
        namespace: "parents",
        table: "parents",
        label: "parent",
        fields: &[
            req("firstName", "first_name", Text(50)),
            req("middleName", "middle_name", Text(50)),
            req("lastName", "last_name", Text(50)),
            req("originCountry", "origin_country", Text(50)),
            req("province", "province", Text(50)),
            req("address", "address", Text(150)),
            req("phoneNumber", "phone_number", Text(20)),
            opt("email", "email", Email),
        ],
        order_by: "last_name, first_name",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Sponsors,
        namespace: "sponsors",
        table: "sponsors",
        label: "sponsor",
        fields: &[
            req("sponsorType", "sponsor_type", Text(50)),
            req("organization", "organization", Text(100)),
            req("phoneNumber", "phone_number", Text(20)),
            req("address", "address", Text(150)),
        ],
        order_by: "organization",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Students,
        namespace: "students",
        table: "students",
        label: "student",
        fields: &[
            opt("userId", "user_id", Ref("users")),
            opt("matricule", "matricule", Text(20)),
            opt("photo", "photo", Text(255)),
            req("firstName", "first_name", Text(50)),
            req("middleName", "middle_name", Text(50)),
            req("lastName", "last_name", Text(50)),
            req("gender", "gender", Choice(GENDERS)),
            req("maritalStatus", "marital_status", Text(50)),
            req("birthPlace", "birth_place", Text(50)),
            req("birthDate", "birth_date", Date),
            opt("nationality", "nationality", Text(50)).or(Fallback::Text("CONGOLAISE")),
            opt("addressId", "address_id", Ref("addresses")),
            opt("contactId", "contact_id", Ref("contacts")),
            opt("diplomaId", "diploma_id", Ref("diplomas")),
            opt("fatherId", "father_id", Ref("parents")),
            opt("motherId", "mother_id", Ref("parents")),
        ],
        order_by: "last_name, first_name",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::StudentSponsors,
        namespace: "studentSponsors",
        table: "student_sponsors",
        label: "sponsorship",
        fields: &[
            req("studentId", "student_id", Ref("students")),
            req("sponsorId", "sponsor_id", Ref("sponsors")),
            opt("contributionType", "contribution_type", Text(100))
                .or(Fallback::Text("Frais Académiques")),
            opt("annualCommitment", "annual_commitment", Decimal),
            opt("isPrimary", "is_primary", Bool).or(Fallback::Bool(false)),
            opt("notes", "notes", LongText).or(Fallback::Text("")),
        ],
        order_by: "student_id, is_primary DESC",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Enrollments,
        namespace: "enrollments",
        table: "enrollments",
        label: "enrollment",
        fields: &[
            req("studentId", "student_id", Ref("students")),
            req("yearId", "year_id", Ref("academic_years")),
            req("semesterId", "semester_id", Ref("semesters")),
            req("facultyId", "faculty_id", Ref("faculties")),
            opt("departmentId", "department_id", Ref("departments")),
            req("promotion", "promotion", Text(100)),
            opt("admissionExam", "admission_exam", Bool).or(Fallback::Bool(false)),
            req("howKnown", "how_known", LongText),
            req("whyChosen", "why_chosen", LongText),
            opt("mutualAffiliate", "mutual_affiliate", Bool).or(Fallback::Bool(false)),
            opt("mutualDetails", "mutual_details", LongText),
            req("commitmentsAccepted", "commitments_accepted", Bool),
        ],
        order_by: "year_id, semester_id, promotion",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::SecondaryChoices,
        namespace: "secondaryChoices",
        table: "secondary_choices",
        label: "secondary choice",
        fields: &[
            req("enrollmentId", "enrollment_id", Ref("enrollments")),
            req("facultyId", "faculty_id", Ref("faculties")),
            opt("departmentId", "department_id", Ref("departments")),
            req("promotion", "promotion", Text(100)),
        ],
        order_by: "enrollment_id",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Documents,
        namespace: "documents",
        table: "documents",
        label: "document",
        fields: &[
            req("enrollmentId", "enrollment_id", Ref("enrollments")),
            req("documentName", "document_name", Text(100)),
            req("isRequired", "is_required", Bool),
            opt("filePath", "file_path", Text(255)),
        ],
        order_by: "enrollment_id, document_name",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::AssessmentTypes,
        namespace: "assessmentTypes",
        table: "assessment_types",
        label: "assessment type",
        fields: &[req("name", "name", Text(50)), req("isMajor", "is_major", Bool)],
        order_by: "name",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::AssessmentWeightings,
        namespace: "assessmentWeightings",
        table: "assessment_weightings",
        label: "assessment weighting",
        fields: &[
            req("courseOfferingId", "course_offering_id", Ref("course_offerings")),
            req("assessmentTypeId", "assessment_type_id", Ref("assessment_types")),
            req("weightPercentage", "weight_percentage", Decimal),
        ],
        order_by: "course_offering_id",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Grades,
        namespace: "grades",
        table: "grades",
        label: "grade",
        fields: &[
            req("enrollmentId", "enrollment_id", Ref("enrollments")),
            req("courseOfferingId", "course_offering_id", Ref("course_offerings")),
            req("assessmentTypeId", "assessment_type_id", Ref("assessment_types")),
            req("score", "score", Decimal),
            opt("gradingDate", "grading_date", Date),
            opt("recordedBy", "recorded_by", Ref("users")),
        ],
        order_by: "grading_date DESC",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::FeeCategories,
        namespace: "feeCategories",
        table: "fee_categories",
        label: "fee category",
        fields: &[
            req("name", "name", Text(100)),
            opt("description", "description", LongText),
        ],
        order_by: "name",
        read: RoleGroup::Finance,
        write: RoleGroup::Finance,
    },
    Resource {
        kind: ResourceKind::AcademicFees,
        namespace: "academicFees",
        table: "academic_fees",
        label: "academic fee",
        fields: &[
            req("categoryId", "category_id", Ref("fee_categories")),
            req("yearId", "year_id", Ref("academic_years")),
            req("semesterId", "semester_id", Ref("semesters")),
            req("amount", "amount", Decimal),
        ],
        order_by: "year_id, semester_id",
        read: RoleGroup::Finance,
        write: RoleGroup::Finance,
    },
    Resource {
        kind: ResourceKind::Payments,
        namespace: "payments",
        table: "payments",
        label: "payment",
        fields: &[
            req("enrollmentId", "enrollment_id", Ref("enrollments")),
            req("academicFeeId", "academic_fee_id", Ref("academic_fees")),
            opt("paymentDate", "payment_date", Stamp),
            req("amountPaid", "amount_paid", Decimal),
            req("paymentMethod", "payment_method", Text(50)),
            req("receiptNumber", "receipt_number", Text(100)),
        ],
        order_by: "payment_date DESC",
        read: RoleGroup::Finance,
        write: RoleGroup::Finance,
    },
    Resource {
        kind: ResourceKind::ExpenseCategories,
        namespace: "expenseCategories",
        table: "expense_categories",
        label: "expense category",
        fields: &[
            req("name", "name", Text(100)),
            opt("description", "description", LongText),
        ],
        order_by: "name",
        read: RoleGroup::Finance,
        write: RoleGroup::Finance,
    },
    Resource {
        kind: ResourceKind::Expenses,
        namespace: "expenses",
        table: "expenses",
        label: "expense",
        fields: &[
            req("categoryId", "category_id", Ref("expense_categories")),
            opt("yearId", "year_id", Ref("academic_years")),
            opt("expenseDate", "expense_date", Date),
            req("amount", "amount", Decimal),
            req("description", "description", LongText),
            req("referenceNumber", "reference_number", Text(100)),
            req("beneficiaryId", "beneficiary_id", Ref("users")),
            opt("paymentStatus", "payment_status", Text(50)).or(Fallback::Text("Payé")),
        ],
        order_by: "expense_date DESC",
        read: RoleGroup::Finance,
        write: RoleGroup::Finance,
    },
    Resource {
        kind: ResourceKind::CourseAssignments,
        namespace: "courseAssignments",
        table: "course_assignments",
        label: "course assignment",
        fields: &[
            req("courseOfferingId", "course_offering_id", Ref("course_offerings")),
            req("teacherId", "teacher_id", Ref("users")),
            req("assignmentRole", "assignment_role", Text(50)),
        ],
        order_by: "course_offering_id",
        read: RoleGroup::Academic,
        write: RoleGroup::Academic,
    },
    Resource {
        kind: ResourceKind::Users,
        namespace: "users",
        table: "users",
        label: "user",
        fields: &[
            req("email", "email", Email),
            req("password", "password_hash", Password),
            opt("firstName", "first_name", Text(150)).or(Fallback::Text("")),
            opt("lastName", "last_name", Text(150)).or(Fallback::Text("")),
            opt("username", "username", Text(150)),
            opt("role", "role", Choice(&Role::ALL)).or(Fallback::Text("STUDENT")),
            opt("isActive", "is_active", Bool).or(Fallback::Bool(true)),
            opt("isStaff", "is_staff", Bool).or(Fallback::Bool(false)),
            opt("isSuperuser", "is_superuser", Bool).or(Fallback::Bool(false)),
            opt("avatar", "avatar", Text(255)),
            opt("dateJoined", "date_joined", Stamp),
            opt("lastLogin", "last_login", Stamp),
        ],
        order_by: "email",
        read: RoleGroup::Management,
        write: RoleGroup::Management,
    },
];

pub fn resource(namespace: &str) -> Option<&'static Resource> {
    RESOURCES.iter().find(|r| r.namespace == namespace)
}

pub fn resource_of(kind: ResourceKind) -> &'static Resource {
    RESOURCES
        .iter()
        .find(|r| r.kind == kind)
        .unwrap_or_else(|| unreachable!("every resource kind has a descriptor"))
}

/// Who is writing and when; hooks read defaults from here.
pub struct SaveContext<'a> {
    pub config: &'a WorkspaceConfig,
    pub actor: Option<&'a SessionUser>,
    pub now: DateTime<Local>,
}

impl<'a> SaveContext<'a> {
    pub fn new(config: &'a WorkspaceConfig, actor: Option<&'a SessionUser>) -> Self {
        Self {
            config,
            actor,
            now: Local::now(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn timestamp(&self) -> String {
        self.now.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
}

fn parse_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerces one raw input value into its stored JSON shape.
fn coerce(field: &Field, raw: &Value, is_create: bool) -> Result<Value, String> {
    if let FieldKind::Password = field.kind {
        return match raw {
            Value::Null => {
                if is_create && field.required {
                    Err("this field is required".to_string())
                } else {
                    Ok(Value::Null)
                }
            }
            Value::String(s) if s.chars().count() >= MIN_PASSWORD_LEN => Ok(raw.clone()),
            Value::String(_) => Err(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )),
            _ => Err("must be a string".to_string()),
        };
    }

    let raw = match raw {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    };
    if raw.is_null() {
        if field.required {
            return Err("this field is required".to_string());
        }
        return Ok(field.fallback.map(Fallback::value).unwrap_or(Value::Null));
    }

    match field.kind {
        FieldKind::Text(max_len) => {
            let s = raw.as_str().ok_or("must be a string")?;
            if s.chars().count() > max_len {
                return Err(format!("ensure this value has at most {} characters", max_len));
            }
            Ok(raw)
        }
        FieldKind::LongText => {
            raw.as_str().ok_or("must be a string")?;
            Ok(raw)
        }
        FieldKind::Email => {
            let s = raw.as_str().ok_or("must be a string")?;
            let email = auth::normalize_email(s);
            if !looks_like_email(&email) {
                return Err("enter a valid email address".to_string());
            }
            Ok(Value::String(email))
        }
        FieldKind::Int(min, max) => {
            let n = match &raw {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if (min..=max).contains(&n) => Ok(Value::from(n)),
                Some(_) => Err(format!("ensure this value is between {} and {}", min, max)),
                None => Err("must be an integer".to_string()),
            }
        }
        FieldKind::Decimal => match parse_number(&raw) {
            Some(v) if v.is_finite() => Ok(json!(v)),
            _ => Err("must be a number".to_string()),
        },
        FieldKind::Bool => match &raw {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
            Value::String(s) if s == "true" || s == "on" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" || s == "off" => Ok(Value::Bool(false)),
            _ => Err("must be a boolean".to_string()),
        },
        FieldKind::Date => {
            let s = raw.as_str().ok_or("must be a date string")?;
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| "enter a valid date (YYYY-MM-DD)".to_string())
        }
        FieldKind::DateTime => {
            let s = raw.as_str().ok_or("must be a datetime string")?;
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Secs, false)))
                .map_err(|_| "enter a valid RFC 3339 datetime".to_string())
        }
        FieldKind::Year => {
            let s = match &raw {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => String::new(),
            };
            if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
                Ok(Value::String(s))
            } else {
                Err("must be a 4-digit year".to_string())
            }
        }
        FieldKind::Choice(choices) => {
            let s = raw.as_str().ok_or("must be a string")?;
            if choices.contains(&s) {
                Ok(raw)
            } else {
                Err(format!("select a valid choice: {}", choices.join(", ")))
            }
        }
        FieldKind::Ref(_) => {
            raw.as_str().ok_or("must be a record id")?;
            Ok(raw)
        }
        FieldKind::Password => Ok(raw),
    }
}

fn row_exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

/// Checks every field of `input` and returns the normalized record, or the
/// full per-field error map.
pub fn validate(
    conn: &Connection,
    res: &Resource,
    input: &Map<String, Value>,
    is_create: bool,
) -> Result<Map<String, Value>, RecordError> {
    let mut errors = FieldErrors::new();
    for key in input.keys() {
        if res.field(key).is_none() {
            errors.insert(key.clone(), "unknown field".to_string());
        }
    }

    let mut out = Map::new();
    for field in res.fields {
        let raw = input.get(field.param).unwrap_or(&Value::Null);
        match coerce(field, raw, is_create) {
            Ok(value) => {
                if let (FieldKind::Ref(table), Some(id)) = (field.kind, value.as_str()) {
                    if !row_exists(conn, table, id)? {
                        errors.insert(
                            field.param.to_string(),
                            "referenced record does not exist".to_string(),
                        );
                        continue;
                    }
                }
                out.insert(field.param.to_string(), value);
            }
            Err(message) => {
                errors.insert(field.param.to_string(), message);
            }
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(RecordError::Invalid(errors))
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

fn map_str(record: &mut Map<String, Value>, key: &str, f: impl Fn(&str) -> String) {
    if let Some(Value::String(s)) = record.get_mut(key) {
        *s = f(s);
    }
}

fn map_f64(record: &mut Map<String, Value>, key: &str, f: impl Fn(f64) -> f64) {
    if let Some(v) = record.get(key).and_then(Value::as_f64) {
        record.insert(key.to_string(), json!(f(v)));
    }
}

fn fill_if_null(record: &mut Map<String, Value>, key: &str, value: impl FnOnce() -> Value) {
    if record.get(key).map_or(true, Value::is_null) {
        record.insert(key.to_string(), value());
    }
}

fn pre_save(
    conn: &Connection,
    res: &Resource,
    record: &mut Map<String, Value>,
    ctx: &SaveContext,
    is_create: bool,
) -> Result<(), RecordError> {
    match res.kind {
        ResourceKind::AcademicYears
        | ResourceKind::Semesters
        | ResourceKind::Faculties
        | ResourceKind::Departments => map_str(record, "code", upper_trim),
        ResourceKind::Courses => map_str(record, "courseCode", upper_trim),
        ResourceKind::CourseOfferings => map_str(record, "promotionName", title_case),
        ResourceKind::Diplomas => map_f64(record, "percentage", clamp_percent),
        ResourceKind::Students => {
            for key in ["firstName", "middleName", "lastName"] {
                map_str(record, key, title_case);
            }
            if is_create && record.get("matricule").map_or(true, Value::is_null) {
                let next = matricule::next_matricule(
                    conn,
                    ctx.today(),
                    ctx.config.academic_year_start_month,
                )?;
                record.insert("matricule".to_string(), Value::String(next));
            }
        }
        ResourceKind::Enrollments => {
            map_str(record, "promotion", title_case);
            if record.get("mutualAffiliate") != Some(&Value::Bool(true)) {
                record.insert("mutualDetails".to_string(), Value::Null);
            }
        }
        ResourceKind::SecondaryChoices => map_str(record, "promotion", title_case),
        ResourceKind::Documents => map_str(record, "documentName", title_case),
        ResourceKind::AssessmentTypes => map_str(record, "name", title_case),
        ResourceKind::AssessmentWeightings => map_f64(record, "weightPercentage", clamp_percent),
        ResourceKind::Grades => {
            map_f64(record, "score", clamp_percent);
            if let Some(actor) = ctx.actor {
                fill_if_null(record, "recordedBy", || Value::String(actor.id.clone()));
            }
            fill_if_null(record, "gradingDate", || {
                Value::String(ctx.today().format("%Y-%m-%d").to_string())
            });
        }
        ResourceKind::AcademicFees => map_f64(record, "amount", abs_amount),
        ResourceKind::Payments => {
            map_str(record, "receiptNumber", upper_trim);
            map_f64(record, "amountPaid", abs_amount);
            fill_if_null(record, "paymentDate", || Value::String(ctx.timestamp()));
        }
        ResourceKind::Expenses => {
            map_str(record, "referenceNumber", upper_trim);
            map_f64(record, "amount", abs_amount);
            fill_if_null(record, "expenseDate", || {
                Value::String(ctx.today().format("%Y-%m-%d").to_string())
            });
        }
        ResourceKind::CourseAssignments => map_str(record, "assignmentRole", title_case),
        ResourceKind::Users => {
            let local_part = record
                .get("email")
                .and_then(Value::as_str)
                .and_then(|e| e.split('@').next())
                .unwrap_or_default()
                .to_string();
            fill_if_null(record, "username", || Value::String(local_part));
            map_str(record, "username", |u| u.to_lowercase());
            if let Some(Value::String(pw)) = record.get("password") {
                let hashed = auth::hash_password(pw, ctx.config.password_iterations);
                record.insert("password".to_string(), Value::String(hashed));
            }
            fill_if_null(record, "dateJoined", || Value::String(ctx.timestamp()));
        }
        ResourceKind::Promotions
        | ResourceKind::Addresses
        | ResourceKind::Contacts
        | ResourceKind::Parents
        | ResourceKind::Sponsors
        | ResourceKind::StudentSponsors
        | ResourceKind::FeeCategories
        | ResourceKind::ExpenseCategories => {}
    }
    Ok(())
}

fn post_save(
    conn: &Connection,
    res: &Resource,
    id: &str,
    record: &Map<String, Value>,
    ctx: &SaveContext,
    is_create: bool,
) -> Result<(), RecordError> {
    match res.kind {
        ResourceKind::AcademicYears => {
            if record.get("status").and_then(Value::as_str) == Some("active") {
                conn.execute(
                    "UPDATE academic_years SET status = 'inactive'
                     WHERE status = 'active' AND id <> ?",
                    [id],
                )?;
            }
        }
        ResourceKind::StudentSponsors => {
            if record.get("isPrimary") == Some(&Value::Bool(true)) {
                let student_id = record
                    .get("studentId")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                conn.execute(
                    "UPDATE student_sponsors SET is_primary = 0
                     WHERE student_id = ? AND id <> ? AND is_primary = 1",
                    (student_id, id),
                )?;
            }
        }
        ResourceKind::Students if is_create => ensure_student_user(conn, id, record, ctx)?,
        _ => {}
    }
    Ok(())
}

/// Creates the STUDENT login for a new student from its contact email.
/// A failure (typically the email already belongs to a user) is logged and
/// leaves the student without a linked account.
fn ensure_student_user(
    conn: &Connection,
    student_id: &str,
    record: &Map<String, Value>,
    ctx: &SaveContext,
) -> Result<(), RecordError> {
    if record.get("userId").is_some_and(|v| !v.is_null()) {
        return Ok(());
    }
    let Some(contact_id) = record.get("contactId").and_then(Value::as_str) else {
        return Ok(());
    };
    let email: Option<String> = conn
        .query_row("SELECT email FROM contacts WHERE id = ?", [contact_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(email) = email else {
        return Ok(());
    };

    let matricule = record.get("matricule").cloned().unwrap_or(Value::Null);
    let user = json!({
        "email": email,
        "password": ctx.config.default_student_password,
        "firstName": record.get("firstName").cloned().unwrap_or(Value::Null),
        "lastName": record.get("lastName").cloned().unwrap_or(Value::Null),
        "role": Role::Student.as_str(),
        "username": matricule,
    });
    match insert(conn, resource_of(ResourceKind::Users), &user, ctx) {
        Ok(user_id) => {
            conn.execute(
                "UPDATE students SET user_id = ? WHERE id = ?",
                (&user_id, student_id),
            )?;
        }
        Err(e) => {
            tracing::warn!(
                student_id,
                matricule = ?record.get("matricule"),
                error = %e,
                "could not create the student's user account"
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SQL plumbing
// ---------------------------------------------------------------------------

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(kind: FieldKind, value: SqlValue) -> Value {
    match (kind, value) {
        (_, SqlValue::Null) => Value::Null,
        (FieldKind::Bool, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldKind::Decimal, SqlValue::Integer(i)) => json!(i as f64),
        (_, SqlValue::Integer(i)) => json!(i),
        (_, SqlValue::Real(f)) => json!(f),
        (_, SqlValue::Text(s)) => Value::String(s),
        (_, SqlValue::Blob(_)) => Value::Null,
    }
}

fn select_sql(res: &Resource) -> String {
    let columns: Vec<&str> = res.readable_fields().map(|f| f.column).collect();
    format!("SELECT id, {} FROM {}", columns.join(", "), res.table)
}

fn row_to_record(res: &Resource, row: &rusqlite::Row<'_>) -> rusqlite::Result<Map<String, Value>> {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::String(row.get(0)?));
    for (i, field) in res.readable_fields().enumerate() {
        let raw: SqlValue = row.get(i + 1)?;
        out.insert(field.param.to_string(), sql_to_json(field.kind, raw));
    }
    if res.kind == ResourceKind::Users {
        let display = out
            .get("role")
            .and_then(Value::as_str)
            .and_then(Role::parse)
            .map(Role::display_name);
        out.insert("roleDisplay".to_string(), json!(display));
    }
    Ok(out)
}

/// Columns and values written for `record`; an empty password keeps the
/// stored hash.
fn writable(res: &Resource, record: &Map<String, Value>) -> Vec<(&'static str, SqlValue)> {
    res.fields
        .iter()
        .filter_map(|f| {
            let value = record.get(f.param).unwrap_or(&Value::Null);
            if matches!(f.kind, FieldKind::Password) && value.is_null() {
                return None;
            }
            Some((f.column, json_to_sql(value)))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn fetch(conn: &Connection, res: &Resource, id: &str) -> Result<Map<String, Value>, RecordError> {
    let sql = format!("{} WHERE id = ?", select_sql(res));
    conn.query_row(&sql, [id], |row| row_to_record(res, row))
        .optional()?
        .ok_or_else(|| RecordError::NotFound(res.label.to_string()))
}

pub fn list(
    conn: &Connection,
    res: &Resource,
    filter: Option<&Value>,
) -> Result<Vec<Value>, RecordError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    if let Some(filter) = filter.filter(|f| !f.is_null()) {
        let Some(obj) = filter.as_object() else {
            return Err(RecordError::invalid("filter", "must be an object"));
        };
        for (key, value) in obj {
            let column = if key == "id" {
                "id"
            } else {
                match res.field(key) {
                    Some(f) if !matches!(f.kind, FieldKind::Password) => f.column,
                    _ => return Err(RecordError::invalid(key, "unknown filter field")),
                }
            };
            if value.is_null() {
                clauses.push(format!("{} IS NULL", column));
            } else {
                clauses.push(format!("{} = ?", column));
                args.push(json_to_sql(value));
            }
        }
    }

    let mut sql = select_sql(res);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(res.order_by);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| row_to_record(res, row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(Value::Object).collect())
}

/// Validates and inserts one record on `conn` without opening a
/// transaction; the caller owns atomicity.
pub fn insert(
    conn: &Connection,
    res: &Resource,
    input: &Value,
    ctx: &SaveContext,
) -> Result<String, RecordError> {
    let Some(obj) = input.as_object() else {
        return Err(RecordError::invalid(res.namespace, "must be an object"));
    };
    let mut record = validate(conn, res, obj, true)?;
    pre_save(conn, res, &mut record, ctx, true)?;

    let id = Uuid::new_v4().to_string();
    let cols = writable(res, &record);
    let names: Vec<&str> = cols.iter().map(|(c, _)| *c).collect();
    let sql = format!(
        "INSERT INTO {}(id, {}) VALUES(?{})",
        res.table,
        names.join(", "),
        ", ?".repeat(names.len())
    );
    let mut args = vec![SqlValue::Text(id.clone())];
    args.extend(cols.into_iter().map(|(_, v)| v));
    conn.execute(&sql, params_from_iter(args.iter()))?;

    post_save(conn, res, &id, &record, ctx, true)?;
    tracing::info!(resource = res.namespace, id = %id, "record created");
    Ok(id)
}

pub fn create(
    conn: &Connection,
    res: &Resource,
    input: &Value,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    let tx = conn.unchecked_transaction()?;
    let id = insert(&tx, res, input, ctx)?;
    let out = fetch(&tx, res, &id)?;
    tx.commit()?;
    Ok(Value::Object(out))
}

/// Applies `patch` over the stored record and re-runs the full save path.
pub fn update(
    conn: &Connection,
    res: &Resource,
    id: &str,
    patch: &Value,
    ctx: &SaveContext,
) -> Result<Value, RecordError> {
    let Some(patch) = patch.as_object() else {
        return Err(RecordError::invalid("patch", "must be an object"));
    };
    let tx = conn.unchecked_transaction()?;
    let existing = fetch(&tx, res, id)?;

    let mut merged = Map::new();
    for field in res.fields {
        if let Some(v) = existing.get(field.param) {
            merged.insert(field.param.to_string(), v.clone());
        }
    }
    for (k, v) in patch {
        merged.insert(k.clone(), v.clone());
    }

    let mut record = validate(&tx, res, &merged, false)?;
    pre_save(&tx, res, &mut record, ctx, false)?;

    let cols = writable(res, &record);
    let sets: Vec<String> = cols.iter().map(|(c, _)| format!("{} = ?", c)).collect();
    let sql = format!("UPDATE {} SET {} WHERE id = ?", res.table, sets.join(", "));
    let mut args: Vec<SqlValue> = cols.into_iter().map(|(_, v)| v).collect();
    args.push(SqlValue::Text(id.to_string()));
    tx.execute(&sql, params_from_iter(args.iter()))?;

    post_save(&tx, res, id, &record, ctx, false)?;
    let out = fetch(&tx, res, id)?;
    tx.commit()?;
    Ok(Value::Object(out))
}

pub fn delete(conn: &Connection, res: &Resource, id: &str) -> Result<(), RecordError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", res.table);
    let changed = conn.execute(&sql, [id])?;
    if changed == 0 {
        return Err(RecordError::NotFound(res.label.to_string()));
    }
    tracing::info!(resource = res.namespace, id, "record deleted");
    Ok(())
}
