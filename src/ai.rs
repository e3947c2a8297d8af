//! External language-model capabilities: vision captioning and text
//! generation, backed by OpenAI's chat completions API.
//!
//! Both capabilities are traits so the pipeline can be driven against
//! mocks in tests. The OpenAI implementation enforces a per-call timeout
//! and a fixed post-call throttle; it never retries.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::error::{CaptionError, GenerationError};

/// Rate-limit courtesy delay applied after every successful API call.
pub const CALL_THROTTLE: Duration = Duration::from_millis(500);

const VISION_MODEL: &str = "gpt-4o";
const TEXT_MODEL: &str = "gpt-4o";

const DESCRIBE_MAX_TOKENS: u32 = 300;
const DESCRIBE_TIMEOUT_SECS: u64 = 300;
const GENERATE_TIMEOUT_SECS: u64 = 120;
const GENERATE_TEMPERATURE: f32 = 0.7;

/// Describe one image following an instruction.
#[async_trait]
pub trait VisionDescribe: Send + Sync {
    async fn describe(&self, instruction: &str, image_jpeg: &[u8])
        -> Result<String, CaptionError>;
}

/// Produce text from a system instruction and user content.
#[async_trait]
pub trait TextGenerate: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

/// OpenAI-backed implementation of both capabilities. Reads
/// `OPENAI_API_KEY` from the environment.
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    vision_model: String,
    text_model: String,
}

impl OpenAiEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            vision_model: VISION_MODEL.to_owned(),
            text_model: TEXT_MODEL.to_owned(),
        }
    }
}

impl Default for OpenAiEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionDescribe for OpenAiEngine {
    async fn describe(
        &self,
        instruction: &str,
        image_jpeg: &[u8],
    ) -> Result<String, CaptionError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.vision_model)
            .max_tokens(DESCRIBE_MAX_TOKENS)
            .messages([
                ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(instruction)
                        .build()
                        .map_err(caption_error)?,
                ),
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(ChatCompletionRequestUserMessageContent::Array(vec![
                            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                                ChatCompletionRequestMessageContentPartImageArgs::default()
                                    .image_url(
                                        ImageUrlArgs::default()
                                            .url(image_data_url(image_jpeg))
                                            .build()
                                            .map_err(caption_error)?,
                                    )
                                    .build()
                                    .map_err(caption_error)?,
                            ),
                        ]))
                        .build()
                        .map_err(caption_error)?,
                ),
            ])
            .build()
            .map_err(caption_error)?;

        let response = tokio::time::timeout(
            Duration::from_secs(DESCRIBE_TIMEOUT_SECS),
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| CaptionError::Timeout(DESCRIBE_TIMEOUT_SECS))?
        .map_err(caption_error)?;

        let text = response_text(response).ok_or(CaptionError::EmptyResponse)?;
        tokio::time::sleep(CALL_THROTTLE).await;
        Ok(text)
    }
}

#[async_trait]
impl TextGenerate for OpenAiEngine {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.text_model)
            .max_tokens(max_tokens)
            .temperature(GENERATE_TEMPERATURE)
            .messages([
                ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(system)
                        .build()
                        .map_err(generation_error)?,
                ),
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(user)
                        .build()
                        .map_err(generation_error)?,
                ),
            ])
            .build()
            .map_err(generation_error)?;

        let response = tokio::time::timeout(
            Duration::from_secs(GENERATE_TIMEOUT_SECS),
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| GenerationError::Timeout(GENERATE_TIMEOUT_SECS))?
        .map_err(generation_error)?;

        let text = response_text(response).ok_or(GenerationError::EmptyResponse)?;
        tokio::time::sleep(CALL_THROTTLE).await;
        Ok(text)
    }
}

fn image_data_url(jpeg: &[u8]) -> String {
    "data:image/jpeg;base64,".to_owned() + &BASE64_STANDARD.encode(jpeg)
}

fn response_text(response: CreateChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

fn caption_error(e: OpenAIError) -> CaptionError {
    match e {
        OpenAIError::Reqwest(e) => CaptionError::Unavailable(e.to_string()),
        other => CaptionError::Rejected(other.to_string()),
    }
}

fn generation_error(e: OpenAIError) -> GenerationError {
    match e {
        OpenAIError::Reqwest(e) => GenerationError::Unavailable(e.to_string()),
        other => GenerationError::Rejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_jpeg_mime_and_base64_payload() {
        let url = image_data_url(&[0xFF, 0xD8, 0xFF]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(&url["data:image/jpeg;base64,".len()..], "/9j/");
    }
}
