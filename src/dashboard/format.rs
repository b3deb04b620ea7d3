//! Display formatting for dates and observation values

use chrono::{DateTime, NaiveDate};

use crate::api::types::{Observation, Quantity};

/// `DD.MM.YYYY` for a server date (`YYYY-MM-DD` or RFC 3339). Unparseable
/// input is shown as received.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%d.%m.%Y").to_string();
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return datetime.date_naive().format("%d.%m.%Y").to_string();
    }
    // FHIR dateTime without offset, e.g. 2024-01-01T09:30:00
    if let Some(date) = raw
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    {
        return date.format("%d.%m.%Y").to_string();
    }
    raw.to_string()
}

fn format_quantity(q: &Quantity) -> String {
    if q.unit.is_empty() {
        format!("{}", q.value)
    } else {
        format!("{} {}", q.value, q.unit)
    }
}

/// `value unit`, the string value, or `-`
pub fn format_value(obs: &Observation) -> String {
    match (&obs.value_quantity, &obs.value_string) {
        (Some(q), _) => format_quantity(q),
        (None, Some(s)) => s.clone(),
        (None, None) => "-".to_string(),
    }
}

/// `low - high unit` from the first reference range, else its text
pub fn format_reference_range(obs: &Observation) -> Option<String> {
    let range = obs.reference_range.first()?;
    match (&range.low, &range.high) {
        (Some(low), Some(high)) => {
            let unit = if high.unit.is_empty() { &low.unit } else { &high.unit };
            let text = format!("{} - {} {}", low.value, high.value, unit);
            Some(text.trim_end().to_string())
        }
        (Some(low), None) => Some(format!(">= {}", format_quantity(low))),
        (None, Some(high)) => Some(format!("<= {}", format_quantity(high))),
        (None, None) => range.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{CodeableConcept, ReferenceRange};

    fn obs(value: Option<f64>, low: Option<f64>, high: Option<f64>) -> Observation {
        let q = |v: f64| Quantity {
            value: v,
            unit: "mg/dL".to_string(),
        };
        Observation {
            id: "o1".to_string(),
            code: CodeableConcept {
                text: "Glucose".to_string(),
            },
            value_quantity: value.map(q),
            value_string: None,
            reference_range: vec![ReferenceRange {
                low: low.map(q),
                high: high.map(q),
                text: None,
            }],
        }
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-01-01"), "01.01.2024");
        assert_eq!(format_date("1990-12-31T00:00:00+00:00"), "31.12.1990");
        assert_eq!(format_date("2024-03-05T10:00:00"), "05.03.2024");
        assert_eq!(format_date("someday"), "someday");
    }

    #[test]
    fn test_format_value_and_range() {
        let o = obs(Some(95.0), Some(70.0), Some(100.0));
        assert_eq!(format_value(&o), "95 mg/dL");
        assert_eq!(format_reference_range(&o).as_deref(), Some("70 - 100 mg/dL"));

        let o = obs(None, None, Some(200.0));
        assert_eq!(format_value(&o), "-");
        assert_eq!(format_reference_range(&o).as_deref(), Some("<= 200 mg/dL"));
    }

    #[test]
    fn test_text_only_range() {
        let mut o = obs(None, None, None);
        o.value_string = Some("negative".to_string());
        o.reference_range[0].text = Some("negative".to_string());
        assert_eq!(format_value(&o), "negative");
        assert_eq!(format_reference_range(&o).as_deref(), Some("negative"));
    }
}
