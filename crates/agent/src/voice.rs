use async_trait::async_trait;

use atlas_core::errors::ApplicationError;

/// Turns response text into a playable audio URL.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<String, ApplicationError>;
}

/// Used when no speech service is wired in; every call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledSpeech;

#[async_trait]
impl SpeechSynthesizer for DisabledSpeech {
    async fn synthesize(&self, _text: &str) -> Result<String, ApplicationError> {
        Err(ApplicationError::Integration("speech synthesis is not configured".to_string()))
    }
}
