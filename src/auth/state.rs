//! Session auth lifecycle, tracked as an explicit state object.

use crate::api::UserIdentity;

/// Where the session stands in its auth lifecycle. `Uninitialized` means no
/// identity check has completed yet and is distinct from a check that came
/// back negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Uninitialized,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    phase: AuthPhase,
    user: Option<UserIdentity>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            phase: AuthPhase::Uninitialized,
            user: None,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Record the outcome of an identity check. `Some` moves the session to
    /// `Authenticated`, `None` to `Unauthenticated`.
    pub fn apply_check(&mut self, identity: Option<UserIdentity>) {
        match identity {
            Some(user) => {
                self.phase = AuthPhase::Authenticated;
                self.user = Some(user);
            }
            None => {
                self.phase = AuthPhase::Unauthenticated;
                self.user = None;
            }
        }
    }

    /// Drop back to `Unauthenticated` after a sign-out.
    pub fn reset(&mut self) {
        self.phase = AuthPhase::Unauthenticated;
        self.user = None;
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(username: &str) -> UserIdentity {
        UserIdentity {
            username: username.to_string(),
            email: None,
        }
    }

    #[test]
    fn starts_uninitialized_without_a_user() {
        let state = AuthState::new();
        assert_eq!(state.phase(), AuthPhase::Uninitialized);
        assert!(!state.is_authenticated());
        assert!(state.user().is_none());
    }

    #[test]
    fn positive_check_authenticates_and_stores_the_user() {
        let mut state = AuthState::new();
        state.apply_check(Some(identity("ada")));

        assert_eq!(state.phase(), AuthPhase::Authenticated);
        assert!(state.is_authenticated());
        assert_eq!(state.user().map(|u| u.username.as_str()), Some("ada"));
    }

    #[test]
    fn negative_check_is_unauthenticated_not_uninitialized() {
        let mut state = AuthState::new();
        state.apply_check(None);

        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn failed_recheck_clears_a_previous_user() {
        let mut state = AuthState::new();
        state.apply_check(Some(identity("ada")));
        state.apply_check(None);

        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
        assert!(state.user().is_none());
    }

    #[test]
    fn reset_signs_the_session_out() {
        let mut state = AuthState::new();
        state.apply_check(Some(identity("ada")));
        state.reset();

        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
        assert!(state.user().is_none());
    }
}
