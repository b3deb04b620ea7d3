//! Field rules for the wizard steps and the password reset form

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use super::state::LabFile;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub const PASSWORD_SPECIALS: &str = "@$!%*?&";
pub const MIN_PASSWORD_LEN: usize = 8;

/// `(value, label)` pairs offered on the demographics step
pub const GENDER_OPTIONS: [(&str, &str); 3] =
    [("male", "Male"), ("female", "Female"), ("other", "Other")];

pub const PRIVACY_REQUIRED: &str = "You must accept the Privacy Policy to continue";

/// A message attached to one form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(email.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRequirement {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl PasswordRequirement {
    pub const ALL: [PasswordRequirement; 5] = [
        PasswordRequirement::MinLength,
        PasswordRequirement::Uppercase,
        PasswordRequirement::Lowercase,
        PasswordRequirement::Digit,
        PasswordRequirement::Special,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PasswordRequirement::MinLength => "At least 8 characters",
            PasswordRequirement::Uppercase => "At least one uppercase letter",
            PasswordRequirement::Lowercase => "At least one lowercase letter",
            PasswordRequirement::Digit => "At least one number",
            PasswordRequirement::Special => "At least one special character (@$!%*?&)",
        }
    }

    pub fn is_met(self, password: &str) -> bool {
        match self {
            PasswordRequirement::MinLength => password.chars().count() >= MIN_PASSWORD_LEN,
            PasswordRequirement::Uppercase => password.chars().any(|c| c.is_ascii_uppercase()),
            PasswordRequirement::Lowercase => password.chars().any(|c| c.is_ascii_lowercase()),
            PasswordRequirement::Digit => password.chars().any(|c| c.is_ascii_digit()),
            PasswordRequirement::Special => password.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
        }
    }
}

/// Each requirement with whether `password` meets it
pub fn password_checklist(password: &str) -> Vec<(PasswordRequirement, bool)> {
    PasswordRequirement::ALL
        .into_iter()
        .map(|req| (req, req.is_met(password)))
        .collect()
}

/// All requirements met and no characters outside letters, digits and
/// the allowed specials.
pub fn is_valid_password(password: &str) -> bool {
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    allowed && PasswordRequirement::ALL.iter().all(|req| req.is_met(password))
}

/// Parse a `YYYY-MM-DD` date that must not lie after `today`
pub fn parse_past_date(label: &str, raw: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(format!("{label} is required"));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("{label} must be a date in the form YYYY-MM-DD"))?;
    if date > today {
        return Err(format!("{label} cannot be in the future"));
    }
    Ok(date)
}

pub fn is_known_gender(gender: &str) -> bool {
    GENDER_OPTIONS.iter().any(|(value, _)| *value == gender)
}

pub fn is_accepted_content_type(content_type: &str) -> bool {
    content_type == "application/pdf" || content_type.starts_with("image/")
}

/// "File size must be less than 1MB" for the default 1 MiB limit
pub fn size_limit_message(max_bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if max_bytes >= MIB && max_bytes % MIB == 0 {
        format!("File size must be less than {}MB", max_bytes / MIB)
    } else {
        format!("File size must be less than {}KB", max_bytes.div_ceil(1024))
    }
}

pub fn validate_lab_file(file: Option<&LabFile>, max_bytes: u64) -> Result<(), String> {
    let file = file.ok_or_else(|| "Please select a lab results file".to_string())?;
    if !is_accepted_content_type(&file.content_type) {
        return Err("Only PDF or image files can be uploaded".to_string());
    }
    if file.size > max_bytes {
        return Err(size_limit_message(max_bytes));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn file(content_type: &str, size: u64) -> LabFile {
        LabFile {
            path: PathBuf::from("/tmp/x"),
            name: "x".to_string(),
            size,
            content_type: content_type.to_string(),
        }
    }

    #[test]
    fn test_email_rule() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("  jane.doe@labs.example.org "));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_password_rule() {
        assert!(is_valid_password("Abcd123!"));
        assert!(!is_valid_password("abcd123!"));
        assert!(!is_valid_password("ABCD123!"));
        assert!(!is_valid_password("Abcdefg!"));
        assert!(!is_valid_password("Abcd1234"));
        assert!(!is_valid_password("Ab1!"));
        // '#' is not in the allowed set
        assert!(!is_valid_password("Abcd123!#"));
    }

    #[test]
    fn test_password_checklist_reports_each_rule() {
        let checklist = password_checklist("abc");
        assert_eq!(checklist.len(), 5);
        let met: Vec<_> = checklist
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(req, _)| *req)
            .collect();
        assert_eq!(met, vec![PasswordRequirement::Lowercase]);
    }

    #[test]
    fn test_past_date_rule() {
        assert_eq!(
            parse_past_date("Date of birth", "1990-01-01", today()).unwrap(),
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
        );
        assert_eq!(
            parse_past_date("Date of birth", "", today()).unwrap_err(),
            "Date of birth is required"
        );
        assert!(parse_past_date("Test date", "01.01.2024", today()).is_err());
        assert_eq!(
            parse_past_date("Test date", "2030-01-01", today()).unwrap_err(),
            "Test date cannot be in the future"
        );
    }

    #[test]
    fn test_gender_options() {
        assert!(is_known_gender("female"));
        assert!(is_known_gender("other"));
        assert!(!is_known_gender("Female"));
        assert!(!is_known_gender(""));
    }

    #[test]
    fn test_lab_file_rules() {
        let max = 1024 * 1024;
        assert!(validate_lab_file(Some(&file("application/pdf", 200 * 1024)), max).is_ok());
        assert!(validate_lab_file(Some(&file("image/png", 10)), max).is_ok());
        assert_eq!(
            validate_lab_file(Some(&file("application/pdf", max + 1)), max).unwrap_err(),
            "File size must be less than 1MB"
        );
        assert!(validate_lab_file(Some(&file("text/plain", 10)), max).is_err());
        assert!(validate_lab_file(None, max).is_err());
    }

    #[test]
    fn test_size_limit_message_units() {
        assert_eq!(size_limit_message(2 * 1024 * 1024), "File size must be less than 2MB");
        assert_eq!(size_limit_message(512 * 1024), "File size must be less than 512KB");
    }
}
