//! Conversational answers about station data.
//!
//! One turn is at most two model calls: the first may request the
//! `query_weather` tool, the second sees the tool results and writes the answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::genai::models::{
    Content, FunctionCall, FunctionDeclaration, GenerateContentRequest, GenerationConfig, Part,
    Tool,
};
use crate::query::{self, Operation, QueryArguments};

pub const FUNCTION_NAME: &str = "query_weather";

/// Conversations longer than this many turns restart from the current message.
pub const MAX_CONVERSATION_TURNS: usize = 4;

const DEFAULT_FIELDS: [&str; 5] = ["timestamp_UTC", "temperature", "humidity", "pressure", "wind_speed"];

const NO_TEXT_AFTER_TOOL: &str = "I couldn't process the weather data properly.";
const NO_TEXT_NO_TOOL: &str = "I need to check the weather data for you. Let me try again.";
const NO_CANDIDATE: &str =
    "I couldn't generate a proper response. Please try asking about the weather again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier messages, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
}

fn system_prompt(now: DateTime<Utc>, state: &AppState) -> String {
    let local = now.with_timezone(&state.config.local_timezone);
    format!(
        "You are a weather-station analyst that gives precise, helpful answers.\n\
         Today is {today}. Interpret relative dates against it; a month name alone means the current year.\n\
         Always call {FUNCTION_NAME} to get data. Never guess.\n\
         range_param: latest, first, all, today, yesterday, last24h, last7days, week, month, year, \
         day=N, week=N, month=N (current year), year=YYYY, or an ISO-8601 interval such as \
         2025-01-01T00:00Z/2025-02-01T00:00Z.\n\
         operation: raw (default), max, min, mean, sum, count. For questions about when an extreme \
         happened, use raw with timestamp_UTC and the field, then find the extreme yourself.\n\
         Results include _metadata.units; use them. Round to one decimal place. \
         Never show JSON or tool details to the user.",
        today = local.format("%A, %B %d, %Y"),
    )
}

fn function_declaration() -> FunctionDeclaration {
    let schema = query::argument_schema();
    let fields: Vec<&str> = schema["properties"]["fields"]["items"]["enum"]
        .as_array()
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let operations: Vec<&str> = Operation::ALL.iter().map(|o| o.name()).collect();

    FunctionDeclaration {
        name: FUNCTION_NAME.to_string(),
        description: "Retrieve weather-station data by time range with optional aggregation."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "range_param": {
                    "type": "string",
                    "description": "Time range: latest, today, yesterday, last24h, last7days, day=N, week=N, month=N, year=YYYY, or ISO-8601 interval",
                },
                "fields": {
                    "type": "array",
                    "items": {"type": "string", "enum": fields},
                },
                "operation": {
                    "type": "string",
                    "enum": operations,
                    "description": "Aggregation operation: raw (no aggregation), max, min, mean, sum, count",
                },
            },
            "required": ["range_param"],
        }),
    }
}

/// Conversation sent to the model, ending with the new user message.
fn conversation(request: &ChatRequest) -> Vec<Content> {
    let mut contents = Vec::new();
    if request.history.len() < MAX_CONVERSATION_TURNS * 2 {
        for m in &request.history {
            let part = vec![Part::text(m.content.clone())];
            contents.push(match m.role {
                ChatRole::User => Content::user(part),
                ChatRole::Assistant => Content::model(part),
            });
        }
    } else {
        tracing::debug!(history = request.history.len(), "Conversation restarted");
    }
    contents.push(Content::user(vec![Part::text(request.message.trim())]));
    contents
}

/// Tool arguments from a model function call. Missing values fall back to
/// the latest reading with a default set of fields.
fn tool_arguments(call: &FunctionCall) -> QueryArguments {
    let range = call
        .args
        .get("range_param")
        .and_then(Value::as_str)
        .unwrap_or("latest")
        .to_string();

    let fields = match call.args.get("fields") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        // Some models send the list as a string
        Some(Value::String(text)) => serde_json::from_str::<Vec<String>>(&text.replace('\'', "\""))
            .unwrap_or_else(|_| vec![text.clone()]),
        _ => DEFAULT_FIELDS.iter().map(ToString::to_string).collect(),
    };

    let operation = call
        .args
        .get("operation")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());

    QueryArguments {
        range: Some(range),
        fields: Some(fields),
        operation,
        ..QueryArguments::default()
    }
}

async fn run_tool(state: &AppState, call: &FunctionCall, now: DateTime<Utc>) -> AppResult<Value> {
    if call.name != FUNCTION_NAME {
        return Ok(json!({"error": format!("Unknown function: {}", call.name)}));
    }

    let args = tool_arguments(call);
    tracing::debug!(range = ?args.range, fields = ?args.fields, operation = ?args.operation, "Running weather query for chat");

    match query::query_weather(
        &state.db,
        &args,
        now,
        state.config.local_timezone,
        Some(state.config.chat_max_context_rows),
    )
    .await
    {
        Ok(result) => Ok(json!({"content": result})),
        // Bad arguments go back to the model as a tool error
        Err(AppError::BadRequest(msg) | AppError::Validation(msg)) => Ok(json!({"error": msg})),
        Err(e) => Err(e),
    }
}

/// Answer one user message.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an empty message, `AppError::Upstream`
/// when the model API fails, and `AppError::Database` if the lookup fails.
pub async fn respond(
    state: &AppState,
    request: &ChatRequest,
    now: DateTime<Utc>,
) -> AppResult<ChatResponse> {
    if request.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let model = &state.config.chat_model;
    let mut generate = GenerateContentRequest {
        contents: conversation(request),
        system_instruction: Some(Content::system(system_prompt(now, state))),
        tools: vec![Tool {
            function_declarations: vec![function_declaration()],
        }],
        generation_config: Some(GenerationConfig {
            temperature: Some(0.2),
            max_output_tokens: None,
        }),
    };

    let first = state.genai.generate_content(model, &generate).await?;
    let calls: Vec<FunctionCall> = first.function_calls().cloned().collect();

    let answer = if calls.is_empty() {
        if first.parts().is_empty() {
            NO_CANDIDATE.to_string()
        } else {
            first.text().unwrap_or_else(|| NO_TEXT_NO_TOOL.to_string())
        }
    } else {
        let results =
            futures::future::try_join_all(calls.iter().map(|call| run_tool(state, call, now))).await?;
        let responses: Vec<Part> = calls
            .iter()
            .zip(results)
            .map(|(call, result)| Part::function_response(call.name.clone(), result))
            .collect();

        generate.contents.push(Content::model(first.parts().to_vec()));
        generate.contents.push(Content::user(responses));

        let second = state.genai.generate_content(model, &generate).await?;
        second.text().unwrap_or_else(|| NO_TEXT_AFTER_TOOL.to_string())
    };

    tracing::info!(tool_calls = calls.len(), answer_len = answer.len(), "Chat turn answered");
    Ok(ChatResponse { answer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> FunctionCall {
        FunctionCall {
            name: FUNCTION_NAME.to_string(),
            args,
        }
    }

    #[test]
    fn tool_arguments_defaults() {
        let args = tool_arguments(&call(json!({})));
        assert_eq!(args.range.as_deref(), Some("latest"));
        assert_eq!(args.fields.unwrap().len(), DEFAULT_FIELDS.len());
        assert_eq!(args.operation, None);
    }

    #[test]
    fn tool_arguments_accept_stringified_lists() {
        let args = tool_arguments(&call(json!({
            "range_param": "month=6",
            "fields": "['rain']",
            "operation": "sum"
        })));
        assert_eq!(args.range.as_deref(), Some("month=6"));
        assert_eq!(args.fields.unwrap(), vec!["rain".to_string()]);
        assert_eq!(args.operation, Some(Operation::Sum));
    }

    #[test]
    fn long_history_restarts_conversation() {
        let turn = |role, content: &str| ChatMessage {
            role,
            content: content.to_string(),
        };
        let mut request = ChatRequest {
            message: "and now?".to_string(),
            history: vec![turn(ChatRole::User, "hi"), turn(ChatRole::Assistant, "hello")],
        };
        let contents = conversation(&request);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role.as_deref(), Some("model"));

        request.history = (0..8).map(|_| turn(ChatRole::User, "again")).collect();
        let contents = conversation(&request);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].parts[0].text.as_deref(), Some("and now?"));
    }
}
