//! LLM integration
//!
//! OpenAI-compatible chat completion client used by query extraction and
//! the agent planner.

mod client;

pub use client::{
    extract_json_object, APIMetrics, ChatMessage, LLMClient, MetricsSnapshot, ResponseFormat,
    VLLMClient,
};
