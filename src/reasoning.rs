// ai reasoning service that picks events for a query

use async_trait::async_trait;
use regex::Regex;
use rig::prelude::*;
use rig::{agent::Agent, completion::Prompt, providers::openai};
use tracing::{info, warn};

use crate::config::ReasoningSettings;
use crate::models::{AiRecommendationRequest, AiRecommendationResponse};

#[derive(Debug, thiserror::Error)]
#[error("Reasoning service error: {0}")]
pub struct ReasoningError(pub String);

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn recommend_events(
        &self,
        request: &AiRecommendationRequest,
    ) -> Result<AiRecommendationResponse, ReasoningError>;
}

const AGENT_INSTRUCTIONS: &str = "\
    You are an event concierge. You receive a JSON object with the user's query, \
    coarse context about the user, and a list of candidate events ordered from most \
    to least relevant by distance or start time.\n\n\
    Reply with a single JSON object and nothing else:\n\
    {\"assistant_message\": string, \
    \"recommended_events\": [{\"id\": string, \"reason\": string}], \
    \"followup_questions\": [string]}\n\n\
    Rules:\n\
    1. Only recommend events whose id appears in the candidate list\n\
    2. Recommend at most five events, best match first\n\
    3. If nothing fits, return an empty recommended_events list and explain why\n\
    4. Keep each reason to one sentence the user can act on";

// openai-backed reasoning through a rig agent
pub struct OpenAiReasoningService {
    agent: Agent<openai::CompletionModel>,
}

impl OpenAiReasoningService {
    pub fn from_env(settings: &ReasoningSettings) -> Result<Self, ReasoningError> {
        let client = initialize_openai_client()?;
        Ok(Self {
            agent: build_recommendation_agent(client, settings),
        })
    }
}

// setup openai client from env
fn initialize_openai_client() -> Result<openai::Client, ReasoningError> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(_) => {
            info!("OpenAI API key found in environment");
            Ok(openai::Client::from_env())
        }
        Err(_) => Err(ReasoningError(
            "OPENAI_API_KEY not found in environment".to_string(),
        )),
    }
}

fn build_recommendation_agent(
    client: openai::Client,
    settings: &ReasoningSettings,
) -> Agent<openai::CompletionModel> {
    client
        .agent(openai::GPT_4O)
        .preamble(AGENT_INSTRUCTIONS)
        .max_tokens(settings.max_tokens)
        .temperature(settings.temperature)
        .build()
}

#[async_trait]
impl ReasoningService for OpenAiReasoningService {
    async fn recommend_events(
        &self,
        request: &AiRecommendationRequest,
    ) -> Result<AiRecommendationResponse, ReasoningError> {
        let prompt = serde_json::to_string_pretty(request)
            .map_err(|e| ReasoningError(format!("Failed to encode request: {}", e)))?;

        info!(
            candidates = request.events.len(),
            "Asking reasoning agent for recommendations"
        );

        let reply = self.agent.prompt(prompt.as_str()).await.map_err(|e| {
            tracing::error!("Reasoning agent failed: {}", e);
            ReasoningError(format!("Agent execution failed: {}", e))
        })?;

        let response = parse_reasoning_reply(&reply)?;
        Ok(retain_known_candidates(response, request))
    }
}

/// Reads the agent's reply, which is either bare JSON or JSON wrapped in a
/// fenced code block, possibly with chatter around it.
pub fn parse_reasoning_reply(reply: &str) -> Result<AiRecommendationResponse, ReasoningError> {
    let trimmed = reply.trim();
    if let Ok(response) = serde_json::from_str(trimmed) {
        return Ok(response);
    }

    if let Ok(fence) = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```") {
        if let Some(body) = fence.captures(trimmed).and_then(|c| c.get(1)) {
            return serde_json::from_str(body.as_str())
                .map_err(|e| ReasoningError(format!("Invalid JSON in fenced reply: {}", e)));
        }
    }

    // fall back to the outermost braces
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| ReasoningError(format!("Invalid JSON in reply: {}", e))),
        _ => Err(ReasoningError("Reply contained no JSON object".to_string())),
    }
}

// the agent may invent ids; only candidates can be joined
fn retain_known_candidates(
    mut response: AiRecommendationResponse,
    request: &AiRecommendationRequest,
) -> AiRecommendationResponse {
    response.recommended_events.retain(|recommended| {
        let known = request.events.iter().any(|event| event.id == recommended.id);
        if !known {
            warn!(event_id = %recommended.id, "Dropping recommendation for unknown event");
        }
        known
    });
    response
}
