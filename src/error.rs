use thiserror::Error;

/// Errors from the send pipeline and the persistence layer.
///
/// None of these end the process. Completion errors surface as the inline
/// error string on the chat screen; storage errors are logged and recovered.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please set your OpenAI API key first")]
    MissingCredential,
    #[error("API request failed: {status}")]
    ApiRequestFailed { status: u16 },
    #[error("Invalid response from OpenAI API")]
    InvalidResponseShape,
    #[error("Network error: {0}")]
    Transport(String),
    #[error("A message is already being sent")]
    SendInFlight,
    #[error("Could not parse stored recent questions: {0}")]
    StorageParse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_failure_display_includes_status() {
        let err = ChatError::ApiRequestFailed { status: 401 };
        assert!(format!("{err}").contains("401"));
    }

    #[test]
    fn missing_credential_display_mentions_api_key() {
        let err = ChatError::MissingCredential;
        assert!(format!("{err}").contains("API key"));
    }
}
