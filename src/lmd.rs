//! LMD (Licence-Master-Doctorat) mention and decision derived from an
//! average score on the 0..=100 scale.

pub const PASS_THRESHOLD: f64 = 50.0;

pub fn lmd_mention(average: Option<f64>) -> &'static str {
    let Some(avg) = average else {
        return "Non évalué";
    };
    if avg >= 80.0 {
        "Grande Distinction"
    } else if avg >= 70.0 {
        "Distinction"
    } else if avg >= 60.0 {
        "Satisfaction"
    } else if avg >= PASS_THRESHOLD {
        "Passable"
    } else {
        "Ajourné"
    }
}

pub fn lmd_decision(average: Option<f64>) -> &'static str {
    match average {
        None => "En attente",
        Some(avg) if avg >= PASS_THRESHOLD => "Admis",
        Some(_) => "Ajourné",
    }
}

pub fn mean<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut n: usize = 0;
    let mut sum = 0.0;
    for s in scores {
        n += 1;
        sum += s;
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Two decimals, or `N/A` when nothing was graded.
pub fn format_average(average: Option<f64>) -> String {
    match average {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_and_decision_table() {
        assert_eq!((lmd_mention(None), lmd_decision(None)), ("Non évalué", "En attente"));
        assert_eq!((lmd_mention(Some(55.0)), lmd_decision(Some(55.0))), ("Passable", "Admis"));
        assert_eq!((lmd_mention(Some(45.0)), lmd_decision(Some(45.0))), ("Ajourné", "Ajourné"));
        assert_eq!(
            (lmd_mention(Some(85.0)), lmd_decision(Some(85.0))),
            ("Grande Distinction", "Admis")
        );
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(lmd_mention(Some(80.0)), "Grande Distinction");
        assert_eq!(lmd_mention(Some(79.99)), "Distinction");
        assert_eq!(lmd_mention(Some(70.0)), "Distinction");
        assert_eq!(lmd_mention(Some(60.0)), "Satisfaction");
        assert_eq!(lmd_mention(Some(50.0)), "Passable");
        assert_eq!(lmd_decision(Some(50.0)), "Admis");
        assert_eq!(lmd_decision(Some(49.99)), "Ajourné");
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(mean(vec![40.0, 60.0, 80.0]), Some(60.0));
        assert_eq!(format_average(Some(62.456)), "62.46");
        assert_eq!(format_average(None), "N/A");
    }
}
