//! Post-login screens: the patient's own results, the admin patient list,
//! and the password reset flow.

pub mod admin;
pub mod format;
pub mod password;
pub mod patient;

pub use admin::AdminDashboard;
pub use format::{format_date, format_reference_range, format_value};
pub use password::{request_reset, PasswordResetForm};
pub use patient::PatientDashboard;
