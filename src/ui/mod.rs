pub mod auth_view;
pub mod dashboard_view;
pub mod dialogs;
pub mod form_field;
pub mod terminal_guard;
pub mod wizard_view;

pub use auth_view::{LoginView, ResetPasswordView};
pub use dashboard_view::Selection;
pub use dialogs::{ConfirmAction, ConfirmDialog};
pub use terminal_guard::TerminalGuard;
pub use wizard_view::WizardView;
