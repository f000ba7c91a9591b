//! Free text to structured filter
//!
//! Two strategies share one interface: the remote LLM extractor and the
//! local keyword heuristic. [`extract_with_fallback`] runs the remote one
//! first and falls back to the heuristic on a hard failure or when the
//! remote answer lacks the required field.

mod heuristic;
mod remote;

pub use heuristic::HeuristicExtractor;
pub use remote::{build_extraction_prompt, parse_extraction_response, RemoteExtractor};

use crate::dataset::DatasetSchema;
use crate::error::Result;
use crate::filter::StructuredFilter;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Turns free text into a filter for a dataset schema
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn extract(&self, text: &str, schema: &'static DatasetSchema)
        -> Result<StructuredFilter>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Which strategy produced the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Remote,
    Heuristic,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionSource::Remote => f.write_str("remote"),
            ExtractionSource::Heuristic => f.write_str("heuristic"),
        }
    }
}

/// Why the heuristic was used instead of the remote extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Remote call failed or returned something unparseable
    RemoteFailed(String),
    /// Remote call succeeded but left the named field empty
    EmptyRequiredField(String),
    RemoteNotConfigured,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::RemoteFailed(e) => write!(f, "remote extraction failed: {}", e),
            FallbackReason::EmptyRequiredField(field) => {
                write!(f, "remote extraction returned no '{}'", field)
            }
            FallbackReason::RemoteNotConfigured => f.write_str("no LLM service configured"),
        }
    }
}

/// Filter plus how it was obtained
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub filter: StructuredFilter,
    pub source: ExtractionSource,
    pub fallback_reason: Option<FallbackReason>,
}

/// Run `primary` and fall back to `fallback` when it fails or comes back
/// without the schema's required field.
///
/// Never returns an error: a failing fallback yields an empty filter.
pub async fn extract_with_fallback(
    primary: Option<&dyn ExtractionStrategy>,
    fallback: &dyn ExtractionStrategy,
    text: &str,
    schema: &'static DatasetSchema,
) -> Extraction {
    let reason = match primary {
        None => {
            tracing::debug!("No remote extractor, using {}", fallback.name());
            FallbackReason::RemoteNotConfigured
        }
        Some(primary) => match primary.extract(text, schema).await {
            Ok(filter) if !filter.is_blank(schema.required_field()) => {
                tracing::debug!("{} extracted {:?}", primary.name(), filter);
                return Extraction {
                    filter,
                    source: ExtractionSource::Remote,
                    fallback_reason: None,
                };
            }
            Ok(_) => {
                tracing::info!(
                    "{} returned no '{}', falling back to {}",
                    primary.name(),
                    schema.required_field(),
                    fallback.name()
                );
                FallbackReason::EmptyRequiredField(schema.required_field().to_string())
            }
            Err(e) => {
                if e.is_extraction_error() {
                    tracing::warn!(
                        "{} failed: {}, falling back to {}",
                        primary.name(),
                        e,
                        fallback.name()
                    );
                } else {
                    tracing::error!(
                        "{} raised an unexpected error: {}, falling back to {}",
                        primary.name(),
                        e,
                        fallback.name()
                    );
                }
                FallbackReason::RemoteFailed(e.to_string())
            }
        },
    };

    let filter = match fallback.extract(text, schema).await {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!("{} failed: {}", fallback.name(), e);
            StructuredFilter::new()
        }
    };

    Extraction {
        filter,
        source: ExtractionSource::Heuristic,
        fallback_reason: Some(reason),
    }
}
