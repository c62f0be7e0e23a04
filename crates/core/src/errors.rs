use thiserror::Error;

use crate::{enrichment::EnrichmentError, target::TargetError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Chat-safe text; internal details never reach the thread.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } | Self::ServiceUnavailable { message, .. } => {
                message.clone()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_owned(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Target(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Enrichment(
                error @ (EnrichmentError::NotFound | EnrichmentError::EmptyResponse),
            ) => Self::BadRequest { message: error.user_message(), correlation_id },
            ApplicationError::Enrichment(error) => {
                Self::ServiceUnavailable { message: error.user_message(), correlation_id }
            }
            ApplicationError::Integration(_) => Self::ServiceUnavailable {
                message: "Slack could not complete the request. Please try again.".to_owned(),
                correlation_id,
            },
            ApplicationError::Serialization(message) => Self::Internal { message, correlation_id },
        }
    }
}
