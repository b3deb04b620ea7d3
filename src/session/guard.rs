//! Route protection by authentication, role and patient identity.
//!
//! The patient-identity check is a convenience for the client only; the
//! server enforces the same rule on every patient-scoped endpoint.

use super::{AuthState, Role};
use crate::routes::Route;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(Route),
}

/// Where a user lands after login or a role-mismatch redirect
pub fn home_route(auth: &AuthState) -> Route {
    match (auth.is_authenticated, auth.role, auth.fhir_id.as_deref()) {
        (false, _, _) => Route::Login,
        (true, Some(Role::Admin), _) => Route::AdminPatients,
        (true, _, Some(fhir_id)) => Route::patient(fhir_id),
        (true, _, None) => Route::wizard_start(),
    }
}

pub fn authorize(route: &Route, auth: &AuthState) -> Access {
    match route {
        Route::Login | Route::ResetPassword { .. } => Access::Allow,
        Route::Wizard { fhir_id: None, .. } => Access::Allow,
        Route::Wizard {
            fhir_id: Some(id), ..
        }
        | Route::Patient { fhir_id: id } => patient_scoped(id, auth),
        Route::AdminPatients | Route::AdminPatient { .. } => require_role(Role::Admin, auth),
    }
}

/// Follow redirects until an allowed route is reached
pub fn resolve(route: Route, auth: &AuthState) -> Route {
    let mut current = route;
    // Every redirect target is allowed for the state that produced it, so
    // one hop is enough; the bound only guards against future edits.
    for _ in 0..4 {
        match authorize(&current, auth) {
            Access::Allow => return current,
            Access::Redirect(next) => current = next,
        }
    }
    Route::Login
}

fn require_role(role: Role, auth: &AuthState) -> Access {
    if !auth.is_authenticated {
        return Access::Redirect(Route::Login);
    }
    if auth.role != Some(role) {
        return Access::Redirect(home_route(auth));
    }
    Access::Allow
}

fn patient_scoped(fhir_id: &str, auth: &AuthState) -> Access {
    match require_role(Role::Patient, auth) {
        Access::Allow => {}
        redirect => return redirect,
    }
    match auth.fhir_id.as_deref() {
        Some(own) if own == fhir_id => Access::Allow,
        _ => Access::Redirect(home_route(auth)),
    }
}
