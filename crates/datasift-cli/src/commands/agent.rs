//! Analysis agent command

use crate::app::{AgentArgs, OutputFormat};
use crate::output;
use anyhow::{Context, Result};
use datasift_core::{AgentOrchestrator, DataSiftError, LlmPlanner, SearchService, ToolRegistry};
use std::sync::Arc;

pub async fn run(args: AgentArgs, service: &SearchService, format: OutputFormat) -> Result<()> {
    let text = args.text.join(" ");
    let agent = build(service, args.max_iterations).with_context(|| text.clone())?;
    let response = agent.run(&text).await.with_context(|| text.clone())?;
    print!("{}", output::format_agent(&response, format));
    Ok(())
}

/// Planner backed by the configured LLM, tools bound to the current snapshot
pub fn build(service: &SearchService, max_iterations: Option<usize>) -> Result<AgentOrchestrator> {
    let config = service.config();
    let client = service.llm_client().ok_or_else(|| {
        DataSiftError::Config(
            "The agent needs an LLM service: set DATASIFT_LLM_URL or llm_service.url".to_string(),
        )
    })?;

    let planner = LlmPlanner::new(client, service.schema());
    let tools = ToolRegistry::new(Arc::new(service.storage()));

    Ok(AgentOrchestrator::new(
        Arc::new(planner),
        tools,
        max_iterations.unwrap_or(config.agent.max_iterations),
    ))
}
