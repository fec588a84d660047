use reqwest::StatusCode;
use serde::Deserialize;

/// Failures surfaced by the API client and the feed/interaction controllers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("session expired, sign in again")]
    Auth,
    #[error("{0}")]
    Validation(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("sign in required")]
    NotSignedIn,
    #[error("not permitted: {0}")]
    Forbidden(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// Builds the error for a non-success response from its status and raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return ClientError::Auth;
        }
        ClientError::Server {
            status: status.as_u16(),
            message: server_message(body),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth | ClientError::NotSignedIn)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Network(format!("invalid url: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn server_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            if !message.trim().is_empty() {
                return message;
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = ClientError::from_status(StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, ClientError::Auth));
        assert!(err.is_auth());
    }

    #[test]
    fn server_message_prefers_json_field() {
        let err = ClientError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"message":"Post not found"}"#,
        );
        match err {
            ClientError::Server { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Post not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_message_falls_back_to_body() {
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "  upstream down \n");
        assert_eq!(err.to_string(), "server error 502: upstream down");

        let empty = ClientError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(empty.to_string(), "server error 500: no details");
    }
}
