use crate::errors::AppError;
use crate::models::user::Principal;

/// Capability rules for one resource type.
///
/// Each implementation owns a closed action enum and dispatches on it with
/// an explicit `match`; anything the match does not allow is denied. There
/// is no dynamic rule lookup: adding an action means adding a variant and
/// the compiler walks every dispatch site.
pub trait Policy: Send + Sync {
    type Resource;
    type Action: Copy + std::fmt::Debug + Send + Sync;
    /// Requested change, for rules that depend on what the caller is
    /// trying to write (not all do).
    type Patch;

    fn allows(
        &self,
        who: &Principal,
        action: Self::Action,
        resource: Option<&Self::Resource>,
        patch: Option<&Self::Patch>,
    ) -> bool;
}

/// Fail-closed gate in front of a policy.
///
/// Denials are logged server-side with the subject and action; the caller
/// only ever learns "forbidden". Which rule matched, whether the resource
/// exists in some other scope, which field tripped the check: none of that
/// leaves this function.
pub fn authorize<P: Policy>(
    policy: &P,
    who: &Principal,
    action: P::Action,
    resource: Option<&P::Resource>,
    patch: Option<&P::Patch>,
) -> Result<(), AppError> {
    if policy.allows(who, action, resource, patch) {
        Ok(())
    } else {
        tracing::warn!(subject = %who.id, action = ?action, "capability denied");
        Err(AppError::Forbidden)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{AccountStatus, Role};
    use uuid::Uuid;

    struct Note {
        owner: Uuid,
    }

    #[derive(Debug, Clone, Copy)]
    enum NoteAction {
        Read,
        Purge,
    }

    /// Minimal policy: owners read their notes, nobody purges.
    struct NotePolicy;

    impl Policy for NotePolicy {
        type Resource = Note;
        type Action = NoteAction;
        type Patch = ();

        fn allows(
            &self,
            who: &Principal,
            action: Self::Action,
            resource: Option<&Self::Resource>,
            _patch: Option<&Self::Patch>,
        ) -> bool {
            match (action, resource) {
                (NoteAction::Read, Some(note)) => note.owner == who.id,
                _ => false,
            }
        }
    }

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: "p@example.com".into(),
            role: Role::User,
            status: AccountStatus::Active,
        }
    }

    #[test]
    fn test_allowed_action_passes() {
        let who = principal();
        let note = Note { owner: who.id };
        assert!(authorize(&NotePolicy, &who, NoteAction::Read, Some(&note), None).is_ok());
    }

    #[test]
    fn test_unmatched_action_denies() {
        let who = principal();
        let note = Note { owner: who.id };
        let err = authorize(&NotePolicy, &who, NoteAction::Purge, Some(&note), None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn test_missing_resource_denies() {
        let who = principal();
        assert!(authorize(&NotePolicy, &who, NoteAction::Read, None, None).is_err());
    }

    #[test]
    fn test_denial_is_opaque() {
        let who = principal();
        let other = Note { owner: Uuid::new_v4() };
        let err = authorize(&NotePolicy, &who, NoteAction::Read, Some(&other), None).unwrap_err();
        // same error shape as every other denial
        assert_eq!(format!("{}", err), "forbidden");
    }
}
