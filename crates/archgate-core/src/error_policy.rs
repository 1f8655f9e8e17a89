//! Error category to action mapping

use crate::decision::Action;
use archgate_artifact::ErrorCategory;
use archgate_policy::PolicyMode;

/// Action for an upstream error category
///
/// Total over [`ErrorCategory`]. Only a policy violation depends on the mode:
/// it rolls back under `enforce` and is retried otherwise.
#[must_use]
pub fn action_for_error(category: ErrorCategory, mode: PolicyMode) -> Action {
    match category {
        ErrorCategory::Syntax | ErrorCategory::ModuleIncoherence | ErrorCategory::Unknown => {
            Action::Retry
        }
        ErrorCategory::PolicyViolation if mode == PolicyMode::Enforce => Action::Rollback,
        ErrorCategory::PolicyViolation => Action::Retry,
        ErrorCategory::Fatal => Action::Rollback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mapping_table() {
        let table = [
            (ErrorCategory::Syntax, PolicyMode::Enforce, Action::Retry),
            (ErrorCategory::ModuleIncoherence, PolicyMode::Enforce, Action::Retry),
            (ErrorCategory::PolicyViolation, PolicyMode::Enforce, Action::Rollback),
            (ErrorCategory::PolicyViolation, PolicyMode::Warn, Action::Retry),
            (ErrorCategory::PolicyViolation, PolicyMode::Off, Action::Retry),
            (ErrorCategory::Fatal, PolicyMode::Warn, Action::Rollback),
            (ErrorCategory::Unknown, PolicyMode::Enforce, Action::Retry),
        ];
        for (category, mode, expected) in table {
            assert_eq!(action_for_error(category, mode), expected, "{category} under {mode}");
        }
    }

    #[test]
    fn never_applies() {
        for category in ErrorCategory::ALL {
            for mode in [PolicyMode::Enforce, PolicyMode::Warn, PolicyMode::Off] {
                assert_ne!(action_for_error(category, mode), Action::Apply);
            }
        }
    }
}
