//! Chat-completion lesson generator.
//!
//! Speaks to any OpenAI-compatible endpoint via async-openai. Missing
//! credentials switch it to a canned demo lesson instead of failing,
//! so development machines without secrets still produce output.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{LessonGenerator, LessonRequest};
use crate::config::GenerationConfig;
use crate::error::PipelineError;

const SYSTEM_PROMPT: &str = r#"You are Mimi, a warm, patient French tutor for an 11-year-old (A1-A2 level).
Turn the input (topic, text excerpt, image descriptions) into a complete 30-minute lesson.

Return STRICT JSON ONLY with EXACTLY these keys:

{
  "title": "string",
  "duration": "string (e.g., '30 min')",
  "objectives": ["string", "..."],
  "plan": [
    { "name": "string", "minutes": "string or number", "teacher_script": "string" }
  ],
  "image_prompts": [
    { "id": "string", "prompt": "string" }
  ],
  "first_tutor_messages": ["string", "..."]
}

Rules:
- No extra keys.
- No code fences.
- No prose outside JSON.
- Make language simple and encouraging; short sentences; playful tone.
- Include speaking aloud, call-and-response, mini-games, and a creative wrap-up.
- Provide 5-8 kid-safe image prompts (no brands, no text in-image, no real faces).
"#;

/// Lesson served when no API key is configured.
const DEMO_LESSON: &str = r#"{
  "title": "Démo — Les symboles de la France",
  "duration": "30 min",
  "objectives": ["Reconnaître quelques symboles", "Dire 'C’est ...'"],
  "plan": [
    {"name": "Échauffement — Devine l’image", "minutes": "5", "teacher_script": "Regarde l’image. Qu’est-ce que c’est ? Répète : C’est un croissant !"},
    {"name": "Jeu — Associer", "minutes": "8", "teacher_script": "Associe la photo au mot. Répète ensemble."},
    {"name": "Découverte — Carte du monde", "minutes": "7", "teacher_script": "On parle français dans plusieurs pays."},
    {"name": "Jeu de rôle — Guide & Touriste", "minutes": "6", "teacher_script": "Tu es le guide, je suis le touriste."},
    {"name": "Créatif — Dessin", "minutes": "4", "teacher_script": "Dessine ton symbole préféré et dis : C’est ..."}
  ],
  "image_prompts": [
    {"id": "img1", "prompt": "Kid-friendly illustration of the Eiffel Tower, bright colors, no text, no real faces, teaching style"},
    {"id": "img2", "prompt": "Croissant on a small plate, friendly illustration, simple shapes, no text"}
  ],
  "first_tutor_messages": ["Bonjour ! Prêt(e) ? On commence avec un jeu de devinettes !"]
}"#;

/// Chat-completion client for lesson generation.
pub struct OpenAiGenerator {
    client: Option<Client<OpenAIConfig>>,
    model: String,
    request_timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        let client = config.api_key.as_ref().map(|key| {
            let mut openai_config = OpenAIConfig::new().with_api_key(key);
            if let Some(base) = &config.api_base {
                openai_config = openai_config.with_api_base(base);
            }
            Client::with_config(openai_config)
        });

        Self {
            client,
            model: config.model.clone(),
            request_timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl LessonGenerator for OpenAiGenerator {
    async fn generate(&self, request: &LessonRequest) -> Result<String, PipelineError> {
        let Some(client) = &self.client else {
            debug!("no generation API key configured, serving the demo lesson");
            return Ok(DEMO_LESSON.to_string());
        };

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|err| PipelineError::Generation(err.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(user_payload(request))
            .build()
            .map_err(|err| PipelineError::Generation(err.to_string()))?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system),
                ChatCompletionRequestMessage::User(user),
            ])
            .temperature(0.4)
            .max_tokens(2048u32)
            .build()
            .map_err(|err| PipelineError::Generation(err.to_string()))?;

        debug!(
            model = %self.model,
            excerpt_chars = request.document_excerpt.len(),
            "requesting lesson generation"
        );

        let response = tokio::time::timeout(self.request_timeout, client.chat().create(chat_request))
            .await
            .map_err(|_| {
                warn!(timeout_secs = self.request_timeout.as_secs(), "generation timed out");
                PipelineError::Generation("generation request timed out".to_string())
            })?
            .map_err(|err| {
                warn!(error = %err, "generation request failed");
                PipelineError::Generation(err.to_string())
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PipelineError::Generation("empty model response".to_string()))?;

        Ok(content.trim().to_string())
    }
}

/// The user message is a JSON payload, not prose.
fn user_payload(request: &LessonRequest) -> String {
    json!({
        "topic_hint": request.topic_hint,
        "pdf_text_excerpt": request.document_excerpt,
        "image_descriptions": request.image_descriptions,
        "age": request.age,
    })
    .to_string()
}
