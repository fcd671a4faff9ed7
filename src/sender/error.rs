use super::credentials::CredentialsError;
use super::signing::SigningError;
use serde::Deserialize;
use thiserror::Error;

pub const INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";
pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
pub const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";
pub const DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";

#[derive(Error, Debug)]
pub enum LogServiceError {
    #[error("InvalidSequenceTokenException: {message}")]
    InvalidSequenceToken {
        message: String,
        expected_token: Option<String>,
    },
    #[error("ResourceNotFoundException: {0}")]
    ResourceNotFound(String),
    #[error("ResourceAlreadyExistsException: {0}")]
    ResourceAlreadyExists(String),
    #[error("DataAlreadyAcceptedException: {message}")]
    DataAlreadyAccepted {
        message: String,
        expected_token: Option<String>,
    },
    #[error("HTTP {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Request signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("No usable credentials: {0}")]
    Credentials(#[from] CredentialsError),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
    #[serde(rename = "expectedSequenceToken", default)]
    expected_sequence_token: Option<String>,
}

impl LogServiceError {
    /// Classifies a non-2xx Logs API response.
    ///
    /// The error code comes from the `__type` body field, falling back to the
    /// `x-amzn-ErrorType` header. Both may carry a namespace prefix
    /// (`com.amazonaws.logs#Code`) or a suffix (`Code:http://...`).
    pub fn from_response(status: u16, error_type_header: Option<&str>, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = parsed
            .error_type
            .as_deref()
            .or(error_type_header)
            .map(normalize_code)
            .unwrap_or_default();
        let message = parsed.message.unwrap_or_else(|| body.trim().to_string());

        match code.as_str() {
            INVALID_SEQUENCE_TOKEN => Self::InvalidSequenceToken {
                message,
                expected_token: parsed.expected_sequence_token,
            },
            RESOURCE_NOT_FOUND => Self::ResourceNotFound(message),
            RESOURCE_ALREADY_EXISTS => Self::ResourceAlreadyExists(message),
            DATA_ALREADY_ACCEPTED => Self::DataAlreadyAccepted {
                message,
                expected_token: parsed.expected_sequence_token,
            },
            _ => Self::Api {
                status,
                code: if code.is_empty() {
                    "UnknownError".to_string()
                } else {
                    code
                },
                message,
            },
        }
    }

    /// Short error code for log lines.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidSequenceToken { .. } => INVALID_SEQUENCE_TOKEN,
            Self::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            Self::ResourceAlreadyExists(_) => RESOURCE_ALREADY_EXISTS,
            Self::DataAlreadyAccepted { .. } => DATA_ALREADY_ACCEPTED,
            Self::Api { code, .. } => code,
            Self::Network(_) => "NetworkError",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Signing(_) => "SigningError",
            Self::Credentials(_) => "CredentialsError",
        }
    }
}

fn normalize_code(raw: &str) -> String {
    let without_namespace = raw.rsplit('#').next().unwrap_or(raw);
    without_namespace
        .split(':')
        .next()
        .unwrap_or(without_namespace)
        .trim()
        .to_string()
}
