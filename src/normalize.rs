//! Field normalizers applied to records before they are written.

/// Uppercases the first letter of every alphabetic run and lowercases the
/// rest: `"jean-pierre o'neil"` becomes `"Jean-Pierre O'Neil"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn upper_trim(s: &str) -> String {
    s.trim().to_uppercase()
}

pub fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 100.0)
}

pub fn abs_amount(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.abs()
}
