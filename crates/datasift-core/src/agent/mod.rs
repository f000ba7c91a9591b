//! Bounded tool-calling agent
//!
//! A planner picks one tool per step until it produces an answer, the step
//! cap is reached, or an unrecoverable error occurs. Every step is kept in
//! the trace, including failed ones.

mod catalog;
mod insights;
mod planner;
mod tools;

pub use catalog::{advanced_examples, sample_queries, AdvancedExample};
pub use insights::{extract_insights, Insights, SqlFeatures};
pub use planner::{
    build_step_prompt, build_system_prompt, parse_decision, AgentDecision, LlmPlanner,
    StepPlanner,
};
pub use tools::{with_default_limit, AgentTool, ToolRegistry, SAMPLE_SIZE, SAMPLE_THRESHOLD};

use crate::error::{DataSiftError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Outputs longer than this are summarized in responses
const SUMMARY_THRESHOLD: usize = 1000;

/// Characters kept from each end of a long non-list output
const SUMMARY_EDGE_CHARS: usize = 500;

/// One planner decision and its result
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub index: usize,
    /// `None` when the planner answer could not be read
    pub tool: Option<AgentTool>,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Finished,
    MaxIterations,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub query: String,
    pub response: String,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub intermediate_steps: Vec<AgentStep>,
    pub insights: Insights,
}

pub struct AgentOrchestrator {
    planner: Arc<dyn StepPlanner>,
    tools: ToolRegistry,
    max_iterations: usize,
}

impl AgentOrchestrator {
    pub fn new(planner: Arc<dyn StepPlanner>, tools: ToolRegistry, max_iterations: usize) -> Self {
        Self {
            planner,
            tools,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Run the loop for `query`
    ///
    /// Only an empty query is an `Err`; every other failure is reported in
    /// the response together with the partial trace.
    pub async fn run(&self, query: &str) -> Result<AgentResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DataSiftError::InvalidInput(
                "Agent query must not be empty".to_string(),
            ));
        }

        let mut trace: Vec<AgentStep> = Vec::new();
        let mut outcome: Option<(StopReason, String, Option<String>)> = None;

        for index in 0..self.max_iterations {
            let decision = match self.planner.next(query, &trace).await {
                Ok(decision) => decision,
                Err(DataSiftError::Parse(message)) => {
                    tracing::warn!("Step {}: unreadable planner decision: {}", index + 1, message);
                    trace.push(AgentStep {
                        index,
                        tool: None,
                        input: Value::Null,
                        output: None,
                        error: Some(message),
                    });
                    continue;
                }
                Err(e) => {
                    tracing::error!("Planner failed: {}", e);
                    outcome = Some((StopReason::Error, format!("Agent stopped: {}", e), Some(e.to_string())));
                    break;
                }
            };

            match decision {
                AgentDecision::Finish { answer } => {
                    tracing::info!("Agent finished after {} steps", trace.len());
                    outcome = Some((StopReason::Finished, answer, None));
                    break;
                }
                AgentDecision::UseTool { tool, input } => {
                    tracing::debug!("Step {}: {} {}", index + 1, tool, input);
                    match self.tools.execute(tool, &input) {
                        Ok(output) => trace.push(AgentStep {
                            index,
                            tool: Some(tool),
                            input,
                            output: Some(output),
                            error: None,
                        }),
                        Err(e) => {
                            let fatal = matches!(e, DataSiftError::StorageUnavailable(_));
                            tracing::warn!("Step {}: {} failed: {}", index + 1, tool, e);
                            trace.push(AgentStep {
                                index,
                                tool: Some(tool),
                                input,
                                output: None,
                                error: Some(e.to_string()),
                            });
                            if fatal {
                                outcome = Some((
                                    StopReason::Error,
                                    format!("Agent stopped: {}", e),
                                    Some(e.to_string()),
                                ));
                                break;
                            }
                        }
                    }
                }
            }
        }

        let (stop_reason, response, error) = outcome.unwrap_or_else(|| {
            tracing::warn!("Agent hit the step limit of {}", self.max_iterations);
            (
                StopReason::MaxIterations,
                format!(
                    "Stopped after {} steps without a final answer",
                    self.max_iterations
                ),
                None,
            )
        });

        let insights = extract_insights(&response, &trace);
        let intermediate_steps = trace
            .into_iter()
            .map(|mut step| {
                step.output = step.output.map(|o| summarize_output(&o));
                step
            })
            .collect();

        Ok(AgentResponse {
            query: query.to_string(),
            response,
            stop_reason,
            error,
            intermediate_steps,
            insights,
        })
    }
}

/// Shorten a step output for display
///
/// Outputs up to 1000 serialized characters are returned unchanged. Longer
/// arrays of more than 10 items keep their first and last three items,
/// anything else keeps 500 characters from each end.
pub fn summarize_output(output: &Value) -> Value {
    let text = match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let total = text.chars().count();
    if total <= SUMMARY_THRESHOLD {
        return output.clone();
    }

    if let Value::Array(items) = output {
        if items.len() > 10 {
            return json!({
                "total_items": items.len(),
                "first_items": &items[..3],
                "last_items": &items[items.len() - 3..],
                "note": format!("Full result has {} items, showing only the ends", items.len()),
            });
        }
    }

    let head: String = text.chars().take(SUMMARY_EDGE_CHARS).collect();
    let tail: String = text.chars().skip(total - SUMMARY_EDGE_CHARS).collect();
    Value::String(format!("{}\n...({} characters total)...\n{}", head, total, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use crate::db::SqliteStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed list of planner results, then repeats the last one
    struct ScriptedPlanner {
        script: Mutex<Vec<Result<AgentDecision>>>,
    }

    impl ScriptedPlanner {
        fn new(script: Vec<Result<AgentDecision>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
            })
        }
    }

    #[async_trait]
    impl StepPlanner for ScriptedPlanner {
        async fn next(&self, _query: &str, _trace: &[AgentStep]) -> Result<AgentDecision> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Ok(d) => Ok(d.clone()),
                    Err(e) => Err(DataSiftError::Parse(e.to_string())),
                }
            }
        }
    }

    fn missing_storage() -> ToolRegistry {
        ToolRegistry::new(Arc::new(SqliteStorage::new(
            "/nonexistent/datasift.sqlite",
            DatasetKind::Reviews.schema(),
        )))
    }

    #[tokio::test]
    async fn test_max_iterations_returns_partial_trace() {
        let planner = ScriptedPlanner::new(vec![Ok(AgentDecision::UseTool {
            tool: AgentTool::GetAdvancedExamples,
            input: Value::Null,
        })]);
        let agent = AgentOrchestrator::new(planner, missing_storage(), 3);

        let response = agent.run("what are polarizing products?").await.unwrap();
        assert_eq!(response.stop_reason, StopReason::MaxIterations);
        assert_eq!(response.intermediate_steps.len(), 3);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_decision_is_recorded() {
        let planner = ScriptedPlanner::new(vec![
            Err(DataSiftError::Parse("no JSON".to_string())),
            Ok(AgentDecision::Finish {
                answer: "Nothing to report".to_string(),
            }),
        ]);
        let agent = AgentOrchestrator::new(planner, missing_storage(), 5);

        let response = agent.run("anything").await.unwrap();
        assert_eq!(response.stop_reason, StopReason::Finished);
        assert_eq!(response.response, "Nothing to report");
        assert_eq!(response.intermediate_steps.len(), 1);
        assert!(response.intermediate_steps[0].tool.is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_stops_loop() {
        let planner = ScriptedPlanner::new(vec![Ok(AgentDecision::UseTool {
            tool: AgentTool::ExecuteSql,
            input: json!({ "query": "SELECT * FROM Reviews" }),
        })]);
        let agent = AgentOrchestrator::new(planner, missing_storage(), 5);

        let response = agent.run("count reviews").await.unwrap();
        assert_eq!(response.stop_reason, StopReason::Error);
        assert_eq!(response.intermediate_steps.len(), 1);
        assert!(response.error.unwrap().contains("Storage unavailable"));
    }

    #[tokio::test]
    async fn test_planner_failure_stops_loop() {
        let planner = ScriptedPlanner::new(vec![
            Err(DataSiftError::Llm("connection refused".to_string())),
            Ok(AgentDecision::Finish {
                answer: "unreachable".to_string(),
            }),
        ]);
        let agent = AgentOrchestrator::new(planner, missing_storage(), 5);

        let response = agent.run("anything").await.unwrap();
        assert_eq!(response.stop_reason, StopReason::Error);
        assert!(response.intermediate_steps.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let planner = ScriptedPlanner::new(vec![Ok(AgentDecision::Finish {
            answer: String::new(),
        })]);
        let agent = AgentOrchestrator::new(planner, missing_storage(), 5);
        assert!(agent.run("  ").await.is_err());
    }

    #[test]
    fn test_summarize_long_array() {
        let items: Vec<Value> = (0..50).map(|i| json!({ "id": i, "text": "x".repeat(40) })).collect();
        let summary = summarize_output(&Value::Array(items));
        assert_eq!(summary["total_items"], json!(50));
        assert_eq!(summary["first_items"].as_array().unwrap().len(), 3);
        assert_eq!(summary["last_items"][2]["id"], json!(49));
    }

    #[test]
    fn test_summarize_long_text() {
        let text = "a".repeat(600) + &"b".repeat(600);
        let summary = summarize_output(&Value::String(text));
        let s = summary.as_str().unwrap();
        assert!(s.starts_with(&"a".repeat(500)));
        assert!(s.ends_with(&"b".repeat(500)));
        assert!(s.contains("1200 characters total"));

        let short = json!({ "ok": true });
        assert_eq!(summarize_output(&short), short);
    }
}
