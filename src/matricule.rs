use chrono::Datelike;
use rusqlite::Connection;

/// `YY/ZZ` label of the academic year containing `today`.
pub fn academic_year_suffix(today: chrono::NaiveDate, start_month: u32) -> String {
    let year = today.year();
    let start = if today.month() >= start_month {
        year
    } else {
        year - 1
    };
    format!("{:02}/{:02}", start.rem_euclid(100), (start + 1).rem_euclid(100))
}

pub fn format_matricule(sequence: u32, suffix: &str) -> String {
    format!("{:04}-{}", sequence, suffix)
}

fn parse_sequence(matricule: &str) -> Option<u32> {
    matricule.split('-').next()?.parse::<u32>().ok()
}

/// Next matricule `NNNN-YY/ZZ` for the academic year containing `today`.
pub fn next_matricule(
    conn: &Connection,
    today: chrono::NaiveDate,
    start_month: u32,
) -> rusqlite::Result<String> {
    let suffix = academic_year_suffix(today, start_month);
    let mut stmt = conn.prepare("SELECT matricule FROM students WHERE matricule LIKE ?")?;
    let existing = stmt
        .query_map([format!("%-{}", suffix)], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let last = existing
        .iter()
        .filter_map(|m| parse_sequence(m))
        .max()
        .unwrap_or(0);
    Ok(format_matricule(last + 1, &suffix))
}
