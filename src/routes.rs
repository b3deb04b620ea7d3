//! Application routes.
//!
//! A route is the only record of where the user is. The wizard step is read
//! from the route, never stored beside it.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::wizard::WizardStep;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route matches '{0}'")]
    NotFound(String),
    #[error("missing identifier in '{0}'")]
    MissingId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/wizard[/<step>[/<fhirId>]]`. Only the name, demographics and upload
    /// steps carry an identifier.
    Wizard {
        step: WizardStep,
        fhir_id: Option<String>,
    },
    Patient {
        fhir_id: String,
    },
    AdminPatients,
    AdminPatient {
        fhir_id: String,
    },
    Login,
    ResetPassword {
        token: Option<String>,
    },
}

impl Route {
    pub fn wizard(step: WizardStep, fhir_id: Option<String>) -> Self {
        let fhir_id = match step {
            WizardStep::Welcome | WizardStep::Account => None,
            _ => fhir_id.filter(|id| !id.is_empty()),
        };
        Route::Wizard { step, fhir_id }
    }

    pub fn wizard_start() -> Self {
        Route::wizard(WizardStep::Welcome, None)
    }

    pub fn patient(fhir_id: impl Into<String>) -> Self {
        Route::Patient {
            fhir_id: fhir_id.into(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Wizard {
                step: WizardStep::Welcome,
                ..
            } => "/wizard".to_string(),
            Route::Wizard {
                step,
                fhir_id: Some(id),
            } => format!("/wizard/{}/{}", step.slug(), id),
            Route::Wizard {
                step,
                fhir_id: None,
            } => format!("/wizard/{}", step.slug()),
            Route::Patient { fhir_id } => format!("/patient/{fhir_id}"),
            Route::AdminPatients => "/admin/patients".to_string(),
            Route::AdminPatient { fhir_id } => format!("/admin/patients/{fhir_id}"),
            Route::Login => "/login".to_string(),
            Route::ResetPassword { token: Some(token) } => {
                format!("/reset-password?token={token}")
            }
            Route::ResetPassword { token: None } => "/reset-password".to_string(),
        }
    }

    /// The patient identifier embedded in the route, if any
    pub fn fhir_id(&self) -> Option<&str> {
        match self {
            Route::Wizard { fhir_id, .. } => fhir_id.as_deref(),
            Route::Patient { fhir_id } | Route::AdminPatient { fhir_id } => Some(fhir_id),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (path, query) = match raw.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (raw, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|seg| !seg.is_empty()).collect();
        let not_found = || RouteError::NotFound(raw.to_string());

        match segments.as_slice() {
            [] | ["wizard"] | ["wizard", "welcome"] => Ok(Route::wizard_start()),
            ["wizard", "account"] => Ok(Route::wizard(WizardStep::Account, None)),
            ["wizard", step] => {
                let step = scoped_step(step).ok_or_else(not_found)?;
                Ok(Route::wizard(step, None))
            }
            ["wizard", step, id] => {
                let step = scoped_step(step).ok_or_else(not_found)?;
                Ok(Route::wizard(step, Some(id.to_string())))
            }
            ["patient"] => Err(RouteError::MissingId(raw.to_string())),
            ["patient", id] => Ok(Route::patient(*id)),
            ["admin", "patients"] => Ok(Route::AdminPatients),
            ["admin", "patients", id] => Ok(Route::AdminPatient {
                fhir_id: id.to_string(),
            }),
            ["login"] => Ok(Route::Login),
            ["reset-password"] => Ok(Route::ResetPassword {
                token: query.and_then(token_param),
            }),
            _ => Err(not_found()),
        }
    }
}

fn scoped_step(slug: &str) -> Option<WizardStep> {
    match slug.parse().ok()? {
        step @ (WizardStep::Name | WizardStep::Demographics | WizardStep::Upload) => Some(step),
        _ => None,
    }
}

fn token_param(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_wizard_are_welcome() {
        assert_eq!("/".parse::<Route>().unwrap(), Route::wizard_start());
        assert_eq!("/wizard".parse::<Route>().unwrap(), Route::wizard_start());
        assert_eq!("/wizard/".parse::<Route>().unwrap(), Route::wizard_start());
    }

    #[test]
    fn test_all_route_paths_roundtrip() {
        let paths = [
            "/wizard",
            "/wizard/account",
            "/wizard/name",
            "/wizard/name/123",
            "/wizard/demographics/123",
            "/wizard/upload",
            "/wizard/upload/123",
            "/patient/123",
            "/admin/patients",
            "/admin/patients/123",
            "/login",
            "/reset-password",
            "/reset-password?token=abc",
        ];
        for path in paths {
            let route: Route = path.parse().unwrap();
            assert_eq!(route.path(), path);
        }
    }

    #[test]
    fn test_wizard_upload_with_id() {
        let route: Route = "/wizard/upload/123".parse().unwrap();
        assert_eq!(
            route,
            Route::Wizard {
                step: WizardStep::Upload,
                fhir_id: Some("123".to_string())
            }
        );
        assert_eq!(route.fhir_id(), Some("123"));
    }

    #[test]
    fn test_account_does_not_take_id() {
        assert!("/wizard/account/123".parse::<Route>().is_err());
        assert_eq!(
            Route::wizard(WizardStep::Account, Some("123".to_string())).path(),
            "/wizard/account"
        );
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(
            "/nowhere".parse::<Route>(),
            Err(RouteError::NotFound("/nowhere".to_string()))
        );
        assert!(matches!(
            "/patient".parse::<Route>(),
            Err(RouteError::MissingId(_))
        ));
        assert!("/wizard/bogus".parse::<Route>().is_err());
    }

    #[test]
    fn test_reset_password_token_query() {
        let route: Route = "/reset-password?foo=1&token=t0k".parse().unwrap();
        assert_eq!(
            route,
            Route::ResetPassword {
                token: Some("t0k".to_string())
            }
        );
        let route: Route = "/reset-password?token=".parse().unwrap();
        assert_eq!(route, Route::ResetPassword { token: None });
    }
}
