use thiserror::Error;

/// Why provisioning stopped before every action converged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("`{service}`: action `{action}` failed: {reason}")]
    ActionFailed {
        service: String,
        action: String,
        reason: String,
    },

    /// A stop signal arrived before action `at` began.
    #[error("`{service}`: provisioning abandoned before `{at}`")]
    Abandoned { service: String, at: String },
}

impl ProvisionError {
    /// Name of the action provisioning stopped at.
    pub fn action(&self) -> &str {
        match self {
            ProvisionError::ActionFailed { action, .. } => action,
            ProvisionError::Abandoned { at, .. } => at,
        }
    }
}
