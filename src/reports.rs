//! Official documents: a serializable model per report, built from the
//! database, plus its PDF layout.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::WorkspaceConfig;
use crate::lmd::{self, format_average, lmd_decision, lmd_mention};
use crate::normalize::title_case;
use crate::pdf::{Align, PdfDoc, Style};
use crate::records::RecordError;

pub trait Report: Serialize {
    fn filename(&self) -> String;
    fn document(&self, config: &WorkspaceConfig) -> PdfDoc;
}

fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect()
}

/// Renders `report` to `out_path`, or to `<exports_root>/<filename>`.
pub fn write_pdf<R: Report>(
    report: &R,
    config: &WorkspaceConfig,
    exports_root: &Path,
    out_path: Option<&Path>,
) -> Result<Value, RecordError> {
    let filename = safe_file_name(&report.filename());
    let path: PathBuf = match out_path {
        Some(p) => p.to_path_buf(),
        None => exports_root.join(&filename),
    };
    let bytes = report.document(config).render()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &bytes)?;
    tracing::info!(file = %path.to_string_lossy(), bytes = bytes.len(), "report written");
    Ok(json!({
        "filename": filename,
        "path": path.to_string_lossy(),
        "byteCount": bytes.len(),
    }))
}

fn letterhead(doc: &mut PdfDoc, config: &WorkspaceConfig) {
    doc.small(config.country_line.clone());
    doc.text(Style::Heading, Align::Center, config.institution_name.clone());
    doc.spacer(6.0);
}

fn student_label(first: &str, last: &str, matricule: Option<&str>) -> String {
    format!("{} {} ({})", first, last, matricule.unwrap_or("-"))
}

fn dash(v: Option<&str>) -> String {
    v.filter(|s| !s.is_empty()).unwrap_or("-").to_string()
}

/// `YYYY-MM-DD` shown as `DD/MM/YYYY`; anything else unchanged.
fn fmt_date(iso: &str) -> String {
    chrono::NaiveDate::parse_from_str(iso, "%Y-%m-%d")
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| iso.to_string())
}

fn fmt_timestamp(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|d| d.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}

fn gender_display(g: &str) -> &str {
    match g {
        "masculin" => "Masculin",
        "feminin" => "Féminin",
        other => other,
    }
}

fn yes_no(b: bool) -> String {
    let label = if b { "Oui" } else { "Non" };
    label.to_string()
}

/// Credit totals saturate instead of overflowing on rows written outside validation.
fn sum_credits(credits: impl IntoIterator<Item = i64>) -> i64 {
    credits.into_iter().fold(0i64, i64::saturating_add)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentHeader {
    pub enrollment_id: String,
    pub student_id: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub matricule: Option<String>,
    pub faculty: String,
    pub department: Option<String>,
    pub department_id: Option<String>,
    pub promotion: String,
    pub academic_year: String,
    pub year_code: String,
    pub year_id: String,
    pub semester: String,
    pub semester_code: String,
    pub semester_id: String,
}

impl EnrollmentHeader {
    fn label(&self) -> String {
        student_label(&self.first_name, &self.last_name, self.matricule.as_deref())
    }

    fn matricule_or_id(&self) -> &str {
        self.matricule.as_deref().unwrap_or(&self.student_id)
    }
}

fn load_header(conn: &Connection, enrollment_id: &str) -> Result<EnrollmentHeader, RecordError> {
    conn.query_row(
        "SELECT e.id, s.id, s.first_name, s.middle_name, s.last_name, s.matricule,
                f.name, d.name, e.department_id, e.promotion,
                y.name, y.code, y.id, sm.name, sm.code, sm.id
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         JOIN faculties f ON f.id = e.faculty_id
         LEFT JOIN departments d ON d.id = e.department_id
         JOIN academic_years y ON y.id = e.year_id
         JOIN semesters sm ON sm.id = e.semester_id
         WHERE e.id = ?",
        [enrollment_id],
        |r| {
            Ok(EnrollmentHeader {
                enrollment_id: r.get(0)?,
                student_id: r.get(1)?,
                first_name: r.get(2)?,
                middle_name: r.get(3)?,
                last_name: r.get(4)?,
                matricule: r.get(5)?,
                faculty: r.get(6)?,
                department: r.get(7)?,
                department_id: r.get(8)?,
                promotion: r.get(9)?,
                academic_year: r.get(10)?,
                year_code: r.get(11)?,
                year_id: r.get(12)?,
                semester: r.get(13)?,
                semester_code: r.get(14)?,
                semester_id: r.get(15)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| RecordError::NotFound("enrollment".to_string()))
}

// ---------------------------------------------------------------------------
// Enrollment form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressLine {
    pub street: String,
    pub quarter: String,
    pub city_commune: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLine {
    pub phone_number: String,
    pub whatsapp_number: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiplomaLine {
    pub institution: String,
    pub obtaining_year: String,
    pub diploma_number: String,
    pub section: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLine {
    pub full_name: String,
    pub origin_country: String,
    pub province: String,
    pub address: String,
    pub phone_number: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceLine {
    pub faculty: String,
    pub department: Option<String>,
    pub promotion: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLine {
    pub document_name: String,
    pub is_required: bool,
    pub provided: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFormModel {
    pub header: EnrollmentHeader,
    pub gender: String,
    pub marital_status: String,
    pub birth_place: String,
    pub birth_date: String,
    pub nationality: String,
    pub photo: Option<String>,
    pub address: Option<AddressLine>,
    pub contact: Option<ContactLine>,
    pub diploma: Option<DiplomaLine>,
    pub father: Option<ParentLine>,
    pub mother: Option<ParentLine>,
    pub admission_exam: bool,
    pub how_known: String,
    pub why_chosen: String,
    pub mutual_affiliate: bool,
    pub mutual_details: Option<String>,
    pub commitments_accepted: bool,
    pub secondary_choice: Option<ChoiceLine>,
    pub documents: Vec<DocumentLine>,
}

fn load_parent(conn: &Connection, id: Option<String>) -> rusqlite::Result<Option<ParentLine>> {
    let Some(id) = id else {
        return Ok(None);
    };
    conn.query_row(
        "SELECT first_name, middle_name, last_name, origin_country, province, address,
                phone_number, email
         FROM parents WHERE id = ?",
        [&id],
        |r| {
            let first: String = r.get(0)?;
            let middle: String = r.get(1)?;
            let last: String = r.get(2)?;
            Ok(ParentLine {
                full_name: format!("{} {} {}", first, middle, last),
                origin_country: r.get(3)?,
                province: r.get(4)?,
                address: r.get(5)?,
                phone_number: r.get(6)?,
                email: r.get(7)?,
            })
        },
    )
    .optional()
}

pub fn enrollment_form(conn: &Connection, enrollment_id: &str) -> Result<EnrollmentFormModel, RecordError> {
    let header = load_header(conn, enrollment_id)?;

    struct Row {
        gender: String,
        marital_status: String,
        birth_place: String,
        birth_date: String,
        nationality: String,
        photo: Option<String>,
        address_id: Option<String>,
        contact_id: Option<String>,
        diploma_id: Option<String>,
        father_id: Option<String>,
        mother_id: Option<String>,
        admission_exam: bool,
        how_known: String,
        why_chosen: String,
        mutual_affiliate: bool,
        mutual_details: Option<String>,
        commitments_accepted: bool,
    }
    let row = conn.query_row(
        "SELECT s.gender, s.marital_status, s.birth_place, s.birth_date, s.nationality, s.photo,
                s.address_id, s.contact_id, s.diploma_id, s.father_id, s.mother_id,
                e.admission_exam, e.how_known, e.why_chosen, e.mutual_affiliate,
                e.mutual_details, e.commitments_accepted
         FROM enrollments e JOIN students s ON s.id = e.student_id
         WHERE e.id = ?",
        [enrollment_id],
        |r| {
            Ok(Row {
                gender: r.get(0)?,
                marital_status: r.get(1)?,
                birth_place: r.get(2)?,
                birth_date: r.get(3)?,
                nationality: r.get(4)?,
                photo: r.get(5)?,
                address_id: r.get(6)?,
                contact_id: r.get(7)?,
                diploma_id: r.get(8)?,
                father_id: r.get(9)?,
                mother_id: r.get(10)?,
                admission_exam: r.get(11)?,
                how_known: r.get(12)?,
                why_chosen: r.get(13)?,
                mutual_affiliate: r.get(14)?,
                mutual_details: r.get(15)?,
                commitments_accepted: r.get(16)?,
            })
        },
    )?;

    let address = conn
        .query_row(
            "SELECT street, quarter, city_commune FROM addresses WHERE id = ?",
            [&row.address_id],
            |r| {
                Ok(AddressLine {
                    street: r.get(0)?,
                    quarter: r.get(1)?,
                    city_commune: r.get(2)?,
                })
            },
        )
        .optional()?;
    let contact = conn
        .query_row(
            "SELECT phone_number, whatsapp_number, email FROM contacts WHERE id = ?",
            [&row.contact_id],
            |r| {
                Ok(ContactLine {
                    phone_number: r.get(0)?,
                    whatsapp_number: r.get(1)?,
                    email: r.get(2)?,
                })
            },
        )
        .optional()?;
    let diploma = conn
        .query_row(
            "SELECT institution, obtaining_year, diploma_number, section, percentage
             FROM diplomas WHERE id = ?",
            [&row.diploma_id],
            |r| {
                Ok(DiplomaLine {
                    institution: r.get(0)?,
                    obtaining_year: r.get(1)?,
                    diploma_number: r.get(2)?,
                    section: r.get(3)?,
                    percentage: r.get(4)?,
                })
            },
        )
        .optional()?;
    let father = load_parent(conn, row.father_id)?;
    let mother = load_parent(conn, row.mother_id)?;

    let secondary_choice = conn
        .query_row(
            "SELECT f.name, d.name, sc.promotion
             FROM secondary_choices sc
             JOIN faculties f ON f.id = sc.faculty_id
             LEFT JOIN departments d ON d.id = sc.department_id
             WHERE sc.enrollment_id = ?",
            [enrollment_id],
            |r| {
                Ok(ChoiceLine {
                    faculty: r.get(0)?,
                    department: r.get(1)?,
                    promotion: r.get(2)?,
                })
            },
        )
        .optional()?;

    let mut stmt = conn.prepare(
        "SELECT document_name, is_required, file_path IS NOT NULL
         FROM documents WHERE enrollment_id = ? ORDER BY document_name",
    )?;
    let documents = stmt
        .query_map([enrollment_id], |r| {
            Ok(DocumentLine {
                document_name: r.get(0)?,
                is_required: r.get(1)?,
                provided: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EnrollmentFormModel {
        header,
        gender: row.gender,
        marital_status: row.marital_status,
        birth_place: row.birth_place,
        birth_date: row.birth_date,
        nationality: row.nationality,
        photo: row.photo,
        address,
        contact,
        diploma,
        father,
        mother,
        admission_exam: row.admission_exam,
        how_known: row.how_known,
        why_chosen: row.why_chosen,
        mutual_affiliate: row.mutual_affiliate,
        mutual_details: row.mutual_details,
        commitments_accepted: row.commitments_accepted,
        secondary_choice,
        documents,
    })
}

fn parent_rows(parent: &Option<ParentLine>) -> Vec<(&'static str, String)> {
    match parent {
        Some(p) => vec![
            ("Nom complet", p.full_name.clone()),
            ("Origine", format!("{} ({})", p.origin_country, p.province)),
            ("Adresse", p.address.clone()),
            ("Téléphone", p.phone_number.clone()),
            ("Email", dash(p.email.as_deref())),
        ],
        None => vec![("Nom complet", "-".to_string())],
    }
}

impl Report for EnrollmentFormModel {
    fn filename(&self) -> String {
        format!("fiche-inscription-{}.pdf", self.header.matricule_or_id())
    }

    fn document(&self, config: &WorkspaceConfig) -> PdfDoc {
        let h = &self.header;
        let mut doc = PdfDoc::new("Fiche d'inscription");
        letterhead(&mut doc, config);
        doc.title("FICHE D'INSCRIPTION");
        doc.text(
            Style::Body,
            Align::Center,
            format!("Année académique {} - {}", h.academic_year, h.semester),
        );
        doc.spacer(12.0);

        doc.heading("Identité de l'étudiant");
        doc.key_values(&[
            ("Matricule", dash(h.matricule.as_deref())),
            (
                "Nom complet",
                format!("{} {} {}", h.last_name, h.middle_name, h.first_name).to_uppercase(),
            ),
            ("Genre", gender_display(&self.gender).to_string()),
            ("État civil", self.marital_status.clone()),
            (
                "Date / Lieu de naissance",
                format!("{} - {}", fmt_date(&self.birth_date), self.birth_place),
            ),
            ("Nationalité", self.nationality.clone()),
        ]);

        doc.heading("Adresse et contact");
        let mut contact_rows = Vec::new();
        if let Some(a) = &self.address {
            contact_rows.push((
                "Adresse",
                format!("{}, {}, {}", a.street, a.quarter, a.city_commune),
            ));
        }
        if let Some(c) = &self.contact {
            contact_rows.push(("Téléphone", c.phone_number.clone()));
            contact_rows.push(("WhatsApp", dash(c.whatsapp_number.as_deref())));
            contact_rows.push(("Email", c.email.clone()));
        }
        if contact_rows.is_empty() {
            contact_rows.push(("Adresse", "-".to_string()));
        }
        doc.key_values(&contact_rows);

        if let Some(d) = &self.diploma {
            doc.heading("Diplôme d'État");
            doc.key_values(&[
                ("Établissement", d.institution.clone()),
                ("Année d'obtention", d.obtaining_year.clone()),
                ("Numéro", d.diploma_number.clone()),
                ("Section", d.section.clone()),
                ("Pourcentage", format!("{:.2} %", d.percentage)),
            ]);
        }

        doc.heading("Père");
        doc.key_values(&parent_rows(&self.father));
        doc.heading("Mère");
        doc.key_values(&parent_rows(&self.mother));

        doc.heading("Choix d'orientation");
        doc.key_values(&[
            ("Faculté", h.faculty.clone()),
            ("Département", dash(h.department.as_deref())),
            ("Promotion", h.promotion.clone()),
            ("Examen d'admission", yes_no(self.admission_exam)),
        ]);
        if let Some(choice) = &self.secondary_choice {
            doc.small("Second choix");
            doc.key_values(&[
                ("Faculté", choice.faculty.clone()),
                ("Département", dash(choice.department.as_deref())),
                ("Promotion", choice.promotion.clone()),
            ]);
        }

        doc.heading("Motivation");
        doc.key_values(&[
            ("Comment avez-vous connu l'université ?", self.how_known.clone()),
            ("Pourquoi ce choix ?", self.why_chosen.clone()),
            ("Affilié à une mutuelle", yes_no(self.mutual_affiliate)),
            ("Détails mutuelle", dash(self.mutual_details.as_deref())),
        ]);

        if !self.documents.is_empty() {
            doc.heading("Pièces du dossier");
            doc.table(
                &[4.0, 1.5, 1.5],
                &["Document", "Obligatoire", "Fourni"],
                self.documents
                    .iter()
                    .map(|d| {
                        vec![d.document_name.clone(), yes_no(d.is_required), yes_no(d.provided)]
                    })
                    .collect(),
            );
        }

        doc.spacer(12.0);
        doc.paragraph(if self.commitments_accepted {
            "L'étudiant déclare avoir pris connaissance du règlement académique et s'engage à le respecter."
        } else {
            "Les engagements de l'étudiant n'ont pas été acceptés."
        });
        doc.spacer(18.0);
        doc.paragraph("Signature de l'étudiant : ______________________");
        doc
    }
}

// ---------------------------------------------------------------------------
// Bulletin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentScore {
    pub assessment_type: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinCourse {
    pub course_offering_id: String,
    pub course_code: String,
    pub course_name: String,
    pub credits: i64,
    pub scores: Vec<AssessmentScore>,
    pub average: Option<f64>,
    pub mention: &'static str,
    pub validated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinModel {
    pub header: EnrollmentHeader,
    pub courses: Vec<BulletinCourse>,
    pub overall_average: Option<f64>,
    pub total_credits: i64,
    pub validated_credits: i64,
    pub mention: &'static str,
    pub decision: &'static str,
}

pub fn bulletin(conn: &Connection, enrollment_id: &str) -> Result<BulletinModel, RecordError> {
    let header = load_header(conn, enrollment_id)?;
    let mut courses: Vec<BulletinCourse> = Vec::new();

    // Offerings scheduled for the enrollment's promotion, graded or not.
    let mut stmt = conn.prepare(
        "SELECT co.id, c.course_code, c.course_name, c.credits
         FROM course_offerings co
         JOIN courses c ON c.id = co.course_id
         WHERE co.academic_year_id = ?1
           AND co.semester_id = ?2
           AND co.promotion_name = ?3
           AND (?4 IS NULL OR co.department_id = ?4)
         ORDER BY c.course_code",
    )?;
    let offered = stmt
        .query_map(
            (
                &header.year_id,
                &header.semester_id,
                &header.promotion,
                &header.department_id,
            ),
            |r| Ok((r.get::<_, String>(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?
        .collect::<Result<Vec<(String, String, String, i64)>, _>>()?;
    for (id, code, name, credits) in offered {
        courses.push(BulletinCourse {
            course_offering_id: id,
            course_code: code,
            course_name: name,
            credits,
            scores: Vec::new(),
            average: None,
            mention: lmd_mention(None),
            validated: false,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT co.id, c.course_code, c.course_name, c.credits, t.name, g.score
         FROM grades g
         JOIN course_offerings co ON co.id = g.course_offering_id
         JOIN courses c ON c.id = co.course_id
         JOIN assessment_types t ON t.id = g.assessment_type_id
         WHERE g.enrollment_id = ?
         ORDER BY c.course_code, t.name",
    )?;
    let graded = stmt
        .query_map([enrollment_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, f64>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut all_scores = Vec::with_capacity(graded.len());
    for (offering_id, code, name, credits, assessment_type, score) in graded {
        all_scores.push(score);
        let idx = match courses.iter().position(|c| c.course_offering_id == offering_id) {
            Some(i) => i,
            None => {
                courses.push(BulletinCourse {
                    course_offering_id: offering_id,
                    course_code: code,
                    course_name: name,
                    credits,
                    scores: Vec::new(),
                    average: None,
                    mention: lmd_mention(None),
                    validated: false,
                });
                courses.len() - 1
            }
        };
        courses[idx].scores.push(AssessmentScore {
            assessment_type,
            score,
        });
    }
    courses.sort_by(|a, b| a.course_code.cmp(&b.course_code));

    for course in &mut courses {
        course.average = lmd::mean(course.scores.iter().map(|s| s.score));
        course.mention = lmd_mention(course.average);
        course.validated = course.average.is_some_and(|a| a >= lmd::PASS_THRESHOLD);
    }

    let overall_average = lmd::mean(all_scores);
    Ok(BulletinModel {
        header,
        total_credits: sum_credits(courses.iter().map(|c| c.credits)),
        validated_credits: sum_credits(courses.iter().filter(|c| c.validated).map(|c| c.credits)),
        courses,
        overall_average,
        mention: lmd_mention(overall_average),
        decision: lmd_decision(overall_average),
    })
}

impl Report for BulletinModel {
    fn filename(&self) -> String {
        format!(
            "bulletin-{}-{}-{}.pdf",
            self.header.matricule_or_id(),
            self.header.year_code,
            self.header.semester_code
        )
    }

    fn document(&self, config: &WorkspaceConfig) -> PdfDoc {
        let h = &self.header;
        let mut doc = PdfDoc::new("Bulletin LMD");
        letterhead(&mut doc, config);
        doc.title("BULLETIN DE NOTES - SYSTÈME LMD");
        doc.spacer(10.0);
        doc.key_values(&[
            ("Étudiant", h.label()),
            ("Faculté", h.faculty.clone()),
            ("Département", dash(h.department.as_deref())),
            ("Promotion", h.promotion.clone()),
            ("Année académique", h.academic_year.clone()),
            ("Semestre", h.semester.clone()),
        ]);
        doc.spacer(10.0);

        doc.heading("Résultats par unité d'enseignement");
        let rows = self
            .courses
            .iter()
            .map(|c| {
                let detail = c
                    .scores
                    .iter()
                    .map(|s| format!("{}: {:.2}", s.assessment_type, s.score))
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![
                    c.course_code.clone(),
                    c.course_name.clone(),
                    c.credits.to_string(),
                    if detail.is_empty() { "-".to_string() } else { detail },
                    format_average(c.average),
                    c.mention.to_string(),
                ]
            })
            .collect();
        doc.table(
            &[1.2, 3.0, 0.9, 3.0, 1.2, 1.8],
            &["Code", "Cours", "Crédits", "Évaluations", "Moyenne", "Mention"],
            rows,
        );

        doc.spacer(10.0);
        doc.heading("Synthèse");
        doc.key_values(&[
            (
                "Crédits validés",
                format!("{} / {}", self.validated_credits, self.total_credits),
            ),
            ("Moyenne générale", format_average(self.overall_average)),
            ("Mention", self.mention.to_string()),
            ("Décision", self.decision.to_string()),
        ]);
        doc.spacer(18.0);
        doc.paragraph("Le Secrétaire Académique : ______________________");
        doc
    }
}

// ---------------------------------------------------------------------------
// Payment receipt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceiptModel {
    pub payment_id: String,
    pub receipt_number: String,
    pub student: String,
    pub matricule: Option<String>,
    pub faculty: String,
    pub academic_year: String,
    pub fee_category: String,
    pub amount_paid: f64,
    pub currency: String,
    pub payment_method: String,
    pub payment_date: String,
}

pub fn payment_receipt(
    conn: &Connection,
    payment_id: &str,
    config: &WorkspaceConfig,
) -> Result<PaymentReceiptModel, RecordError> {
    conn.query_row(
        "SELECT p.id, p.receipt_number, s.first_name, s.last_name, s.matricule, f.name,
                y.name, fc.name, p.amount_paid, p.payment_method, p.payment_date
         FROM payments p
         JOIN enrollments e ON e.id = p.enrollment_id
         JOIN students s ON s.id = e.student_id
         JOIN faculties f ON f.id = e.faculty_id
         JOIN academic_fees af ON af.id = p.academic_fee_id
         JOIN academic_years y ON y.id = af.year_id
         JOIN fee_categories fc ON fc.id = af.category_id
         WHERE p.id = ?",
        [payment_id],
        |r| {
            let first: String = r.get(2)?;
            let last: String = r.get(3)?;
            let matricule: Option<String> = r.get(4)?;
            Ok(PaymentReceiptModel {
                payment_id: r.get(0)?,
                receipt_number: r.get(1)?,
                student: student_label(&first, &last, matricule.as_deref()),
                matricule,
                faculty: r.get(5)?,
                academic_year: r.get(6)?,
                fee_category: r.get(7)?,
                amount_paid: r.get(8)?,
                currency: config.currency.clone(),
                payment_method: r.get(9)?,
                payment_date: r.get(10)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| RecordError::NotFound("payment".to_string()))
}

impl Report for PaymentReceiptModel {
    fn filename(&self) -> String {
        format!("recu-{}.pdf", self.receipt_number)
    }

    fn document(&self, config: &WorkspaceConfig) -> PdfDoc {
        let mut doc = PdfDoc::new(format!("Reçu {}", self.receipt_number));
        letterhead(&mut doc, config);
        doc.title("REÇU OFFICIEL - SERVICE FINANCIER");
        doc.spacer(6.0);
        doc.text(Style::Heading, Align::Center, format!("N° {}", self.receipt_number));
        doc.spacer(12.0);
        doc.key_values(&[
            ("Étudiant", self.student.clone()),
            ("Matricule", dash(self.matricule.as_deref())),
            ("Filière", self.faculty.clone()),
            ("Année académique", self.academic_year.clone()),
        ]);
        doc.spacer(12.0);
        doc.key_values(&[
            ("Catégorie de frais", self.fee_category.clone()),
            ("Montant réglé", format!("{:.2} {}", self.amount_paid, self.currency)),
            ("Méthode", self.payment_method.clone()),
            ("Date", fmt_timestamp(&self.payment_date)),
        ]);
        doc.spacer(18.0);
        doc.paragraph(
            "Reçu délivré par le service financier conformément aux directives LMD. \
             Signature du caissier : ______________________",
        );
        doc
    }
}

// ---------------------------------------------------------------------------
// Exit certificate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentLine {
    pub academic_year: String,
    pub semester: String,
    pub faculty: String,
    pub department: Option<String>,
    pub promotion: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitCertificateModel {
    pub student_id: String,
    pub full_name: String,
    pub matricule: Option<String>,
    pub gender: String,
    pub nationality: String,
    pub birth_date: String,
    pub birth_place: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub enrollments: Vec<EnrollmentLine>,
    pub validated_credits: i64,
    pub overall_average: Option<f64>,
    pub mention: &'static str,
    pub decision: &'static str,
}

pub fn exit_certificate(conn: &Connection, student_id: &str) -> Result<ExitCertificateModel, RecordError> {
    struct Identity {
        first: String,
        last: String,
        matricule: Option<String>,
        gender: String,
        nationality: String,
        birth_date: String,
        birth_place: String,
        email: Option<String>,
        phone: Option<String>,
    }
    let identity = conn
        .query_row(
            "SELECT s.first_name, s.last_name, s.matricule, s.gender, s.nationality,
                    s.birth_date, s.birth_place, c.email, c.phone_number
             FROM students s LEFT JOIN contacts c ON c.id = s.contact_id
             WHERE s.id = ?",
            [student_id],
            |r| {
                Ok(Identity {
                    first: r.get(0)?,
                    last: r.get(1)?,
                    matricule: r.get(2)?,
                    gender: r.get(3)?,
                    nationality: r.get(4)?,
                    birth_date: r.get(5)?,
                    birth_place: r.get(6)?,
                    email: r.get(7)?,
                    phone: r.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| RecordError::NotFound("student".to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT y.name, sm.name, f.name, d.name, e.promotion
         FROM enrollments e
         JOIN academic_years y ON y.id = e.year_id
         JOIN semesters sm ON sm.id = e.semester_id
         JOIN faculties f ON f.id = e.faculty_id
         LEFT JOIN departments d ON d.id = e.department_id
         WHERE e.student_id = ?
         ORDER BY y.name, sm.name",
    )?;
    let enrollments = stmt
        .query_map([student_id], |r| {
            Ok(EnrollmentLine {
                academic_year: r.get(0)?,
                semester: r.get(1)?,
                faculty: r.get(2)?,
                department: r.get(3)?,
                promotion: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let overall_average: Option<f64> = conn.query_row(
        "SELECT AVG(g.score) FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.student_id = ?",
        [student_id],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(
        "SELECT c.credits
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         JOIN course_offerings co ON co.id = g.course_offering_id
         JOIN courses c ON c.id = co.course_id
         WHERE e.student_id = ?
         GROUP BY g.enrollment_id, g.course_offering_id
         HAVING AVG(g.score) >= ?",
    )?;
    let validated = stmt
        .query_map((student_id, lmd::PASS_THRESHOLD), |r| r.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let validated_credits = sum_credits(validated);

    Ok(ExitCertificateModel {
        student_id: student_id.to_string(),
        full_name: format!("{} {}", identity.last, identity.first).to_uppercase(),
        matricule: identity.matricule,
        gender: identity.gender,
        nationality: identity.nationality,
        birth_date: identity.birth_date,
        birth_place: identity.birth_place,
        email: identity.email,
        phone_number: identity.phone,
        enrollments,
        validated_credits,
        overall_average,
        mention: lmd_mention(overall_average),
        decision: lmd_decision(overall_average),
    })
}

impl Report for ExitCertificateModel {
    fn filename(&self) -> String {
        format!(
            "etat-sortie-{}.pdf",
            self.matricule.as_deref().unwrap_or(&self.student_id)
        )
    }

    fn document(&self, config: &WorkspaceConfig) -> PdfDoc {
        let mut doc = PdfDoc::new("État de sortie");
        letterhead(&mut doc, config);
        doc.title("ÉTAT DE SORTIE - SYSTÈME LMD");
        doc.spacer(12.0);

        doc.heading("Informations personnelles");
        let mut identity = vec![
            ("Nom complet", self.full_name.clone()),
            ("Matricule", dash(self.matricule.as_deref())),
            ("Genre", gender_display(&self.gender).to_string()),
            ("Nationalité", self.nationality.clone()),
            (
                "Date / Lieu de naissance",
                format!("{} - {}", fmt_date(&self.birth_date), self.birth_place),
            ),
        ];
        if let Some(email) = &self.email {
            identity.push(("Email", email.clone()));
        }
        if let Some(phone) = &self.phone_number {
            identity.push(("Téléphone", phone.clone()));
        }
        doc.key_values(&identity);

        if !self.enrollments.is_empty() {
            doc.spacer(12.0);
            doc.heading("Parcours académique");
            doc.table(
                &[2.0, 1.5, 2.0, 2.0, 1.5],
                &["Année académique", "Semestre", "Faculté", "Département", "Promotion"],
                self.enrollments
                    .iter()
                    .map(|e| {
                        vec![
                            e.academic_year.clone(),
                            e.semester.clone(),
                            e.faculty.clone(),
                            dash(e.department.as_deref()),
                            e.promotion.clone(),
                        ]
                    })
                    .collect(),
            );
        }

        doc.spacer(12.0);
        doc.heading("Synthèse académique LMD");
        doc.key_values(&[
            ("Crédits validés", self.validated_credits.to_string()),
            ("Moyenne générale", format_average(self.overall_average)),
            ("Mention", self.mention.to_string()),
            ("Décision", self.decision.to_string()),
        ]);
        doc.spacer(18.0);
        doc.paragraph(
            "Conformément aux exigences du système LMD en RDC, cet état de sortie atteste du parcours \
             académique de l'étudiant, de la validation des unités d'enseignement et de la décision finale \
             de la faculté.",
        );
        doc
    }
}

// ---------------------------------------------------------------------------
// Proclamation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProclamationRow {
    pub enrollment_id: String,
    pub student: String,
    pub last_name: String,
    pub department: Option<String>,
    pub average: Option<f64>,
    pub mention: &'static str,
    pub decision: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProclamationModel {
    pub academic_year: String,
    pub year_code: String,
    pub promotion: String,
    pub department: Option<String>,
    pub rows: Vec<ProclamationRow>,
}

pub fn proclamation(
    conn: &Connection,
    year_id: Option<&str>,
    promotion: Option<&str>,
    department_id: Option<&str>,
) -> Result<ProclamationModel, RecordError> {
    let (Some(year_id), Some(promotion)) = (
        year_id.filter(|s| !s.trim().is_empty()),
        promotion.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(RecordError::NotFound(
            "proclamation (yearId and promotion are required)".to_string(),
        ));
    };
    let (academic_year, year_code): (String, String) = conn
        .query_row(
            "SELECT name, code FROM academic_years WHERE id = ?",
            [year_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| RecordError::NotFound("academic year".to_string()))?;
    let promotion = title_case(promotion);
    let department_id = department_id.filter(|s| !s.trim().is_empty());
    let department = match department_id {
        Some(id) => Some(
            conn.query_row("SELECT name FROM departments WHERE id = ?", [id], |r| {
                r.get::<_, String>(0)
            })
            .optional()?
            .ok_or_else(|| RecordError::NotFound("department".to_string()))?,
        ),
        None => None,
    };

    let mut stmt = conn.prepare(
        "SELECT e.id, s.first_name, s.last_name, s.matricule, d.name,
                (SELECT AVG(g.score) FROM grades g WHERE g.enrollment_id = e.id)
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         LEFT JOIN departments d ON d.id = e.department_id
         WHERE e.year_id = ?1
           AND e.promotion = ?2
           AND (?3 IS NULL OR e.department_id = ?3)
         ORDER BY d.name, s.last_name",
    )?;
    let rows = stmt
        .query_map((year_id, &promotion, department_id), |r| {
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            let matricule: Option<String> = r.get(3)?;
            let average: Option<f64> = r.get(5)?;
            Ok(ProclamationRow {
                enrollment_id: r.get(0)?,
                student: student_label(&first, &last, matricule.as_deref()),
                last_name: last,
                department: r.get(4)?,
                average,
                mention: lmd_mention(average),
                decision: lmd_decision(average),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Err(RecordError::NotFound(
            "enrollments matching the proclamation criteria".to_string(),
        ));
    }

    Ok(ProclamationModel {
        academic_year,
        year_code,
        promotion,
        department,
        rows,
    })
}

impl Report for ProclamationModel {
    fn filename(&self) -> String {
        format!("proclamation-{}-{}.pdf", self.promotion, self.year_code)
    }

    fn document(&self, config: &WorkspaceConfig) -> PdfDoc {
        let mut doc = PdfDoc::new("Liste de proclamation");
        letterhead(&mut doc, config);
        doc.title("LISTE DE PROCLAMATION");
        let mut subtitle = format!("Promotion: {} | Année: {}", self.promotion, self.academic_year);
        if let Some(d) = &self.department {
            subtitle.push_str(&format!(" | Département: {}", d));
        }
        doc.text(Style::Heading, Align::Center, subtitle);
        doc.spacer(12.0);
        doc.table(
            &[3.5, 2.0, 1.2, 1.8, 1.3],
            &["Étudiant", "Département", "Moyenne", "Mention", "Décision"],
            self.rows
                .iter()
                .map(|r| {
                    vec![
                        r.student.clone(),
                        dash(r.department.as_deref()),
                        format_average(r.average),
                        r.mention.to_string(),
                        r.decision.to_string(),
                    ]
                })
                .collect(),
        );
        doc.spacer(18.0);
        doc.paragraph(
            "La présente liste fait office de procès-verbal de proclamation conformément aux exigences LMD.",
        );
        doc
    }
}
