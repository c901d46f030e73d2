use thiserror::Error;

/// Reply sent when a text frame cannot be turned into an image.
pub const EMPTY_FRAME_REPLY: &str = "Received empty frame";

/// Reply sent when inference or serialization fails.
pub const PROCESSING_ERROR_REPLY: &str = "Error processing frame";

/// Reply sent for binary websocket frames.
pub const BINARY_FRAME_REPLY: &str = "Please send base64 encoded image data";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame payload is empty")]
    EmptyFrame,

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: expected at least {expected} values, got {actual}")]
    OutputShape { expected: usize, actual: usize },

    #[error("unsupported model input: {0}")]
    UnsupportedInput(String),

    #[error("model lock poisoned")]
    Poisoned,

    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// The plain-text reply a websocket client gets for this failure.
    pub fn client_message(&self) -> &'static str {
        match self {
            BridgeError::Base64(_) | BridgeError::Image(_) | BridgeError::EmptyFrame => {
                EMPTY_FRAME_REPLY
            }
            _ => PROCESSING_ERROR_REPLY,
        }
    }
}

// ort errors are not guaranteed Send + Sync, keep the text only.
impl From<ort::OrtError> for BridgeError {
    fn from(err: ort::OrtError) -> Self {
        BridgeError::Inference(err.to_string())
    }
}

impl From<ndarray::ShapeError> for BridgeError {
    fn from(err: ndarray::ShapeError) -> Self {
        BridgeError::Inference(format!("tensor shape: {}", err))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failures_map_to_empty_frame() {
        assert_eq!(BridgeError::EmptyFrame.client_message(), EMPTY_FRAME_REPLY);

        let b64 = base64::DecodeError::InvalidLength;
        assert_eq!(BridgeError::from(b64).client_message(), EMPTY_FRAME_REPLY);
    }

    #[test]
    fn test_inference_failures_map_to_processing_error() {
        let err = BridgeError::OutputShape {
            expected: 51,
            actual: 3,
        };
        assert_eq!(err.client_message(), PROCESSING_ERROR_REPLY);
        assert_eq!(BridgeError::Poisoned.client_message(), PROCESSING_ERROR_REPLY);
        assert_eq!(
            BridgeError::Inference("boom".into()).client_message(),
            PROCESSING_ERROR_REPLY
        );
    }
}
