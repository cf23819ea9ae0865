use crate::CoreError;
use slotkeeper_schema::{ReservationId, ReservationState};

pub fn validate_transition(from: ReservationState, to: ReservationState) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

/// Hard delete is only allowed once a reservation is retired.
pub fn validate_delete(id: &ReservationId, state: ReservationState) -> Result<(), CoreError> {
    if state.is_retired() {
        Ok(())
    } else {
        Err(CoreError::InvalidState {
            reservation: id.clone(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationState::{Cancelled, Completed, Confirmed, Pending};

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Pending, Confirmed).is_ok());
        assert!(validate_transition(Pending, Cancelled).is_ok());
        assert!(validate_transition(Confirmed, Completed).is_ok());
        assert!(validate_transition(Confirmed, Cancelled).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Pending, Completed).is_err());
        assert!(validate_transition(Pending, Pending).is_err());
        assert!(validate_transition(Confirmed, Confirmed).is_err());
        assert!(validate_transition(Confirmed, Pending).is_err());
        assert!(validate_transition(Cancelled, Cancelled).is_err());
        assert!(validate_transition(Cancelled, Confirmed).is_err());
        assert!(validate_transition(Completed, Cancelled).is_err());
        assert!(validate_transition(Completed, Pending).is_err());
    }

    #[test]
    fn delete_only_when_retired() {
        let id = ReservationId::new("r1");
        assert!(validate_delete(&id, Completed).is_ok());
        assert!(validate_delete(&id, Cancelled).is_ok());
        assert!(matches!(
            validate_delete(&id, Pending),
            Err(CoreError::InvalidState { state: Pending, .. })
        ));
        assert!(validate_delete(&id, Confirmed).is_err());
    }
}
