use thiserror::Error;

use crate::{config::ConfigError, lookup::LookupError};

/// The two failure behaviors the bot distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal: the process must not keep running.
    StartupFailure,
    /// Recovered inside the conversation with a single apology reply.
    LookupFailure,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("startup failure: {0}")]
    Startup(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl BotError {
    pub fn startup(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Startup(error.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Startup(_) => ErrorKind::StartupFailure,
            Self::Lookup(_) => ErrorKind::LookupFailure,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::StartupFailure
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("reply delivery rejected by chat platform: {0}")]
    Rejected(String),
    #[error("reply delivery transport failure: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigError;
    use crate::errors::{BotError, ErrorKind};
    use crate::lookup::LookupError;

    #[test]
    fn config_errors_are_startup_failures() {
        let error = BotError::from(ConfigError::Validation("slack.bot_token is required".into()));

        assert_eq!(error.kind(), ErrorKind::StartupFailure);
        assert!(error.is_fatal());
    }

    #[test]
    fn explicit_startup_errors_are_fatal() {
        let error = BotError::startup("auth.test rejected bot token");
        assert!(error.is_fatal());
        assert!(error.to_string().contains("auth.test"));
    }

    #[test]
    fn lookup_errors_are_recoverable() {
        let error = BotError::from(LookupError::Transport("connection reset".to_owned()));

        assert_eq!(error.kind(), ErrorKind::LookupFailure);
        assert!(!error.is_fatal());
    }
}
