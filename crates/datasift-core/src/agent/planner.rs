//! Next-step planning for the agent loop

use super::tools::AgentTool;
use super::{summarize_output, AgentStep};
use crate::dataset::DatasetSchema;
use crate::error::{DataSiftError, Result};
use crate::llm::{extract_json_object, ChatMessage, LLMClient, ResponseFormat};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// What the agent does next
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AgentDecision {
    UseTool { tool: AgentTool, input: Value },
    Finish { answer: String },
}

/// Decides the next step from the query and the trace so far
///
/// A `DataSiftError::Parse` result means the decision could not be read;
/// the loop records it and asks again. Any other error stops the loop.
#[async_trait]
pub trait StepPlanner: Send + Sync {
    async fn next(&self, query: &str, trace: &[AgentStep]) -> Result<AgentDecision>;
}

/// Planner backed by a chat completion model
pub struct LlmPlanner {
    client: Arc<dyn LLMClient>,
    schema: &'static DatasetSchema,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LLMClient>, schema: &'static DatasetSchema) -> Self {
        Self { client, schema }
    }
}

#[async_trait]
impl StepPlanner for LlmPlanner {
    async fn next(&self, query: &str, trace: &[AgentStep]) -> Result<AgentDecision> {
        let messages = vec![
            ChatMessage::system(build_system_prompt(self.schema)),
            ChatMessage::user(build_step_prompt(query, trace)),
        ];
        let response = self
            .client
            .chat_completion(messages, ResponseFormat::Json)
            .await?;
        parse_decision(&response)
    }
}

/// System prompt listing the tools and the dataset table
pub fn build_system_prompt(schema: &DatasetSchema) -> String {
    let tools: Vec<String> = AgentTool::ALL
        .iter()
        .map(|t| format!("- {}: {}\n  input: {}", t, t.description(), t.input_schema()))
        .collect();
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.ty.sql_type()))
        .collect();

    format!(
        r#"You are a data analyst answering questions about a SQLite database.

Table: {table}
Columns: {columns}

Available tools:
{tools}

Work step by step:
1. Inspect the schema or sample queries when unsure about the data
2. Write SQL to get the data you need; GROUP BY, HAVING, CASE and CTEs are allowed
3. Use follow_up_query to dig into interesting results
4. Use analyze_data to summarize results
5. Give the final answer once you have enough data

Respond with exactly one JSON object, either
{{"action": "<tool name>", "action_input": {{...}}}}
or
{{"final_answer": "<answer for the user>"}}"#,
        table = schema.table,
        columns = columns.join(", "),
        tools = tools.join("\n"),
    )
}

/// User prompt with the question and every step taken so far
pub fn build_step_prompt(query: &str, trace: &[AgentStep]) -> String {
    let mut prompt = format!("Question: {}\n", query);
    if trace.is_empty() {
        prompt.push_str("\nNo steps taken yet.\n");
    } else {
        prompt.push_str("\nSteps so far:\n");
        for step in trace {
            let tool = step.tool.map_or("(none)", AgentTool::name);
            prompt.push_str(&format!("{}. {} {}\n", step.index + 1, tool, step.input));
            match (&step.output, &step.error) {
                (_, Some(error)) => prompt.push_str(&format!("   error: {}\n", error)),
                (Some(output), None) => {
                    prompt.push_str(&format!("   result: {}\n", summarize_output(output)))
                }
                (None, None) => {}
            }
        }
    }
    prompt.push_str("\nDecide the next step. Output only JSON:");
    prompt
}

/// Read a planner answer
///
/// Unreadable answers and unknown tools are `DataSiftError::Parse`.
pub fn parse_decision(response: &str) -> Result<AgentDecision> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        DataSiftError::Parse(format!("No JSON object in planner response: {}", response))
    })?;
    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        tracing::debug!("Planner response was: {}", response);
        DataSiftError::Parse(format!("Invalid planner JSON: {}", e))
    })?;

    if let Some(answer) = value.get("final_answer") {
        let answer = match answer {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Ok(AgentDecision::Finish { answer });
    }

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| DataSiftError::Parse("Planner response has no action".to_string()))?;
    let tool: AgentTool = action.parse()?;
    let input = value
        .get("action_input")
        .or_else(|| value.get("input"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(AgentDecision::UseTool { tool, input })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use serde_json::json;

    #[test]
    fn test_parse_tool_decision() {
        let decision = parse_decision(
            r#"```json
{"action": "get_database_schema", "action_input": {}}
```"#,
        )
        .unwrap();
        assert_eq!(
            decision,
            AgentDecision::UseTool {
                tool: AgentTool::GetSchema,
                input: json!({})
            }
        );
    }

    #[test]
    fn test_parse_final_answer() {
        let decision =
            parse_decision(r#"Done. {"final_answer": "Product B001 has 12 reviews"}"#).unwrap();
        assert_eq!(
            decision,
            AgentDecision::Finish {
                answer: "Product B001 has 12 reviews".to_string()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_decision("thinking..."), Err(DataSiftError::Parse(_))));
        assert!(matches!(
            parse_decision(r#"{"action": "rm_rf"}"#),
            Err(DataSiftError::Parse(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"thought": "hmm"}"#),
            Err(DataSiftError::Parse(_))
        ));
    }

    #[test]
    fn test_system_prompt_lists_tools_and_columns() {
        let prompt = build_system_prompt(DatasetKind::Reviews.schema());
        for tool in AgentTool::ALL {
            assert!(prompt.contains(tool.name()));
        }
        assert!(prompt.contains("Table: Reviews"));
        assert!(prompt.contains("ProductId (TEXT)"));
    }

    #[test]
    fn test_step_prompt_includes_errors() {
        let trace = vec![AgentStep {
            index: 0,
            tool: Some(AgentTool::ExecuteSql),
            input: json!({"query": "SELECT nope FROM Reviews"}),
            output: None,
            error: Some("no such column: nope".to_string()),
        }];
        let prompt = build_step_prompt("how many reviews?", &trace);
        assert!(prompt.contains("1. execute_sql"));
        assert!(prompt.contains("error: no such column: nope"));
    }
}
