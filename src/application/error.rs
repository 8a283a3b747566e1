use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::WhitelistMatcher;

    #[test]
    fn infra_errors_pass_through_display() {
        let err = AppError::from(InfraError::configuration("invalid cache store url"));
        assert_eq!(
            err.to_string(),
            "configuration error: invalid cache store url"
        );
    }

    #[test]
    fn whitelist_errors_become_infra_errors() {
        let pattern_err = WhitelistMatcher::new(["ads"]).unwrap_err();
        let err = AppError::from(InfraError::from(pattern_err));
        assert!(matches!(err, AppError::Infra(InfraError::Whitelist(_))));
    }
}
