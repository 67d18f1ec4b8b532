use crate::CoreError;
use stackyard_schema::InstallStatus;

/// Check that an install may move from `from` to `to`.
///
/// A failed install can be brought up again; nothing goes back to
/// `Installing` and a running install is never brought up twice.
pub fn validate_transition(from: InstallStatus, to: InstallStatus) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            InstallStatus::Installing | InstallStatus::Error,
            InstallStatus::Running | InstallStatus::Error
        ) | (InstallStatus::Running, InstallStatus::Error)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
