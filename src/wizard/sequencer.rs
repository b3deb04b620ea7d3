//! Step transitions.
//!
//! `(step, event, bound patient)` maps to the next route. Steps only move one
//! at a time; the single exception is entering directly at `upload` when a
//! patient identifier is already bound.

use super::state::WizardStep;
use crate::routes::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Next,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to another wizard step
    Step(WizardStep, Route),
    /// Leave the wizard
    Exit(Route),
}

impl Transition {
    pub fn route(&self) -> &Route {
        match self {
            Transition::Step(_, route) | Transition::Exit(route) => route,
        }
    }
}

/// `None` when the event has no effect at this step: `back` from welcome, or
/// `next` from upload (which submits instead).
pub fn transition(step: WizardStep, event: Event, fhir_id: Option<&str>) -> Option<Transition> {
    match (event, fhir_id) {
        (Event::Next, _) => step
            .next()
            .map(|next| Transition::Step(next, Route::wizard(next, fhir_id.map(String::from)))),
        // An existing patient never revisits account creation
        (Event::Back, Some(id)) => match step.prev() {
            Some(prev @ (WizardStep::Name | WizardStep::Demographics))
                if step != WizardStep::Upload =>
            {
                Some(Transition::Step(prev, Route::wizard(prev, Some(id.to_string()))))
            }
            _ => Some(Transition::Exit(Route::patient(id))),
        },
        (Event::Back, None) => step
            .prev()
            .map(|prev| Transition::Step(prev, Route::wizard(prev, None))),
    }
}

/// Step to open for a wizard route. Without a bound patient the route may
/// not jump past `reachable`, the first step whose fields are incomplete.
/// A bound patient opens the requested step directly.
pub fn initial_step(
    route_step: WizardStep,
    fhir_id: Option<&str>,
    reachable: WizardStep,
) -> WizardStep {
    if fhir_id.is_some() || route_step.index() <= reachable.index() {
        route_step
    } else {
        reachable
    }
}
