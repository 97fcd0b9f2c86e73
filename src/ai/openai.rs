use super::{ArtistExtraction, ArtistExtractor, GenerationOptions, TextGenerator};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const EXTRACTOR_FUNCTION: &str = "extractor";

const EXTRACTION_SYSTEM_PROMPT: &str = "Parse this event listing into the names of all the musicians performing. \
Listings use all kinds of delimiters such as \"&\", \"W.\", \"w/\", \"W/\" or \",\" but also longer natural \
language delimiters like \"with support from\". Short words containing numbers or symbols are not part of a name. \
Also say whether the event is a music performance at all.";

/// Chat completions client used for artist extraction and review text
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractorArguments {
    #[serde(default)]
    artist_names: Vec<String>,
    #[serde(default)]
    is_music_event: bool,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("booking_scraper/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
        })
    }

    async fn post(&self, body: &Value) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ScraperError::api(format!(
                "OpenAI returned {}: {}",
                status,
                text.chars().take(300).collect::<String>()
            )));
        }
        Ok(text)
    }
}

fn extraction_request(model: &str, title: &str, description: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": EXTRACTION_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": format!("title: \"{}\"\ndescription: \"{}\"", title, description),
            }
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": EXTRACTOR_FUNCTION,
                "description": "Extracts fields from the input.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "artistNames": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "The musicians listed for this event or an empty array if none are found."
                        },
                        "isMusicEvent": {
                            "type": "boolean",
                            "description": "Whether the event is a live music performance."
                        }
                    },
                    "required": ["artistNames", "isMusicEvent"]
                }
            }
        }],
        "tool_choice": { "type": "function", "function": { "name": EXTRACTOR_FUNCTION } },
        "temperature": 0
    })
}

/// Read the `extractor` tool call out of a chat completion body.
/// Fields the model leaves out count as empty / not music.
fn parse_extraction_response(body: &str) -> Result<ArtistExtraction> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let call = response
        .choices
        .into_iter()
        .flat_map(|c| c.message.tool_calls.unwrap_or_default())
        .find(|t| t.function.name == EXTRACTOR_FUNCTION)
        .ok_or_else(|| ScraperError::api("completion has no extractor tool call"))?;

    let args: ExtractorArguments = if call.function.arguments.trim().is_empty() {
        ExtractorArguments::default()
    } else {
        serde_json::from_str(&call.function.arguments)?
    };

    Ok(ArtistExtraction {
        names: args
            .artist_names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        is_music_event: args.is_music_event,
    })
}

fn parse_completion_text(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .find_map(|c| c.message.content)
        .map(|t| t.trim().trim_matches('"').to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScraperError::api("completion has no message content"))
}

#[async_trait::async_trait]
impl ArtistExtractor for OpenAiClient {
    async fn extract_artists(&self, title: &str, description: &str) -> Result<ArtistExtraction> {
        let body = extraction_request(&self.model, title, description);
        let text = self.post(&body).await?;
        let extraction = parse_extraction_response(&text)?;
        debug!(
            "OpenAI extracted {} artists (music: {})",
            extraction.names.len(),
            extraction.is_music_event
        );
        Ok(extraction)
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let body = json!({
            "model": options.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
        });
        let text = self.post(&body).await?;
        parse_completion_text(&text)
    }
}
