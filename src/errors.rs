use thiserror::Error;

/// Dr Pilot client errors.
///
/// Variants that come from the backend display the backend's own message, so
/// forms can show `err.to_string()` inline without extra formatting.
#[derive(Debug, Error)]
pub enum DrPilotError {
    /// The configured backend URL could not be parsed.
    #[error("Invalid backend URL: {0}")]
    InvalidBaseUrl(String),

    /// The request could not be completed (connection refused, DNS, TLS...).
    #[error("Erro ao conectar com o servidor: {0}")]
    RequestFailed(String),

    /// The backend answered with a body this client does not understand.
    #[error("Failed to decode backend response: {0}")]
    FailedToDecode(String),

    /// The backend answered with a non-2xx status.
    /// `message` is the backend's `error`/`message` field or a per-call fallback.
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// The backend returned a 401: Unauthorized status code.
    #[error("{0}")]
    Unauthorized(String),

    /// A profile call found the token rejected. The session has been logged out.
    #[error("Sessão expirada. Faça login novamente.")]
    SessionExpired,

    /// No token is stored, so an authenticated call was not attempted.
    #[error("Usuário não autenticado")]
    NotAuthenticated,

    /// A chat request is still waiting for its answer.
    #[error("A request is already in flight.")]
    RequestInFlight,

    /// The session was changed (login, register or logout) while this call was in flight.
    /// Its result has been discarded.
    #[error("Session changed while the request was in flight.")]
    Superseded,

    /// The call was rejected locally before reaching the backend.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The persisted session store failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DrPilotError {
    /// HTTP status of a backend failure, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DrPilotError::Backend { status, .. } => Some(*status),
            DrPilotError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DrPilotError::Unauthorized(_))
    }
}

impl From<config::ConfigError> for DrPilotError {
    fn from(err: config::ConfigError) -> Self {
        DrPilotError::Config(err.to_string())
    }
}

impl From<std::io::Error> for DrPilotError {
    fn from(err: std::io::Error) -> Self {
        DrPilotError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for DrPilotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DrPilotError::FailedToDecode(err.to_string())
        } else {
            DrPilotError::RequestFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_backend_message() {
        let err = DrPilotError::Backend {
            status: 409,
            message: "Email já cadastrado".to_string(),
        };
        assert_eq!(err.to_string(), "Email já cadastrado");
        assert_eq!(err.status(), Some(409));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn unauthorized_reports_401() {
        let err = DrPilotError::Unauthorized("Token inválido".to_string());
        assert_eq!(err.status(), Some(401));
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Token inválido");
    }

    #[test]
    fn io_and_config_errors_convert() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DrPilotError = io_err.into();
        assert!(matches!(err, DrPilotError::Storage(_)));

        let config_err = config::ConfigError::NotFound("api.url".to_string());
        let err: DrPilotError = config_err.into();
        assert!(matches!(err, DrPilotError::Config(_)));
    }
}
