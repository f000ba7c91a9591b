//! LLM-backed extraction

use super::ExtractionStrategy;
use crate::dataset::DatasetSchema;
use crate::error::{DataSiftError, Result};
use crate::filter::StructuredFilter;
use crate::llm::{extract_json_object, ChatMessage, LLMClient, ResponseFormat};
use async_trait::async_trait;
use std::sync::Arc;

/// Query extractor using an external chat completion service
pub struct RemoteExtractor {
    client: Arc<dyn LLMClient>,
}

impl RemoteExtractor {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for RemoteExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &'static DatasetSchema,
    ) -> Result<StructuredFilter> {
        let messages = vec![
            ChatMessage::system(format!(
                "You extract search filters from questions about a {} database. \
                 Always respond with valid JSON only.",
                schema.kind
            )),
            ChatMessage::user(build_extraction_prompt(text, schema)),
        ];

        let response = self
            .client
            .chat_completion(messages, ResponseFormat::Json)
            .await
            .map_err(|e| DataSiftError::ExtractionUnavailable(e.to_string()))?;

        parse_extraction_response(&response, schema)
    }

    fn name(&self) -> &'static str {
        "remote extractor"
    }
}

/// Instruction prompt listing every filter field of the schema
pub fn build_extraction_prompt(text: &str, schema: &DatasetSchema) -> String {
    let fields: Vec<String> = schema
        .fields
        .iter()
        .map(|f| {
            let ty = match f.value_type {
                crate::dataset::ValueType::Text => "string",
                crate::dataset::ValueType::Integer => "integer",
                crate::dataset::ValueType::Number => "number",
            };
            format!("- {} ({}): {}", f.name, ty, f.description)
        })
        .collect();

    let (example_query, example_json) = schema.example;

    format!(
        r#"Extract search parameters from this query:

Query: "{text}"

Output a JSON object with any of these fields:
{fields}

Leave out fields the query does not mention. Do not add other fields.

Example:
Input: "{example_query}"
Output: {example_json}

Now parse the query above. Output only JSON:"#,
        text = text,
        fields = fields.join("\n"),
        example_query = example_query,
        example_json = example_json,
    )
}

/// Parse a model answer into a filter bound to `schema`
pub fn parse_extraction_response(
    response: &str,
    schema: &DatasetSchema,
) -> Result<StructuredFilter> {
    let parse_error = |message: String| DataSiftError::ExtractionParse {
        message,
        raw: response.to_string(),
    };

    let json_str =
        extract_json_object(response).ok_or_else(|| parse_error("no JSON object".to_string()))?;

    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| parse_error(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| parse_error("expected a JSON object".to_string()))?;

    Ok(StructuredFilter::from_json(object, schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use crate::filter::FilterValue;
    use std::sync::Mutex;

    struct CannedClient {
        reply: Result<String>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LLMClient for CannedClient {
        async fn chat_completion(
            &self,
            messages: Vec<ChatMessage>,
            format: ResponseFormat,
        ) -> Result<String> {
            assert_eq!(format, ResponseFormat::Json);
            self.seen.lock().unwrap().extend(messages);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(DataSiftError::Llm(e.to_string())),
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_prompt_lists_fields_and_example() {
        let prompt = build_extraction_prompt("cheap tea", DatasetKind::Reviews.schema());
        assert!(prompt.contains("Query: \"cheap tea\""));
        assert!(prompt.contains("- min_score (integer)"));
        assert!(prompt.contains("- sentiment (string)"));
        assert!(prompt.contains("Find 5-star chocolate reviews"));
    }

    #[test]
    fn test_parse_fenced_response() {
        let response = "```json\n{\"keyword\": \"chocolate\", \"min_score\": 5, \"max_score\": 5}\n```";
        let filter = parse_extraction_response(response, DatasetKind::Reviews.schema()).unwrap();
        assert_eq!(filter.get("min_score"), Some(&FilterValue::Integer(5)));
        assert_eq!(filter.text("keyword"), Some("chocolate"));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_extraction_response("I cannot help", DatasetKind::News.schema()).unwrap_err();
        match err {
            DataSiftError::ExtractionParse { raw, .. } => assert_eq!(raw, "I cannot help"),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_extraction_response("{not json}", DatasetKind::News.schema()).unwrap_err();
        assert!(err.is_extraction_error());
    }

    #[tokio::test]
    async fn test_client_failure_is_unavailable() {
        let extractor = RemoteExtractor::new(Arc::new(CannedClient {
            reply: Err(DataSiftError::Llm("timeout".to_string())),
            seen: Mutex::new(Vec::new()),
        }));
        let err = extractor
            .extract("tech news", DatasetKind::News.schema())
            .await
            .unwrap_err();
        assert!(matches!(err, DataSiftError::ExtractionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_extract_sends_system_and_user_messages() {
        let client = Arc::new(CannedClient {
            reply: Ok(r#"{"category": "Tech", "keyword": "chips", "extra": 1}"#.to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let extractor = RemoteExtractor::new(client.clone());
        let filter = extractor
            .extract("tech news about chips", DatasetKind::News.schema())
            .await
            .unwrap();

        assert_eq!(filter.text("category"), Some("tech"));
        assert!(!filter.contains("extra"));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, "system");
        assert!(seen[0].content.contains("valid JSON only"));
    }
}
