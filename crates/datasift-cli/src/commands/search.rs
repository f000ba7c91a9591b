//! Browse and keyword search commands

use crate::app::{FindArgs, OutputFormat, PageArgs, SearchArgs};
use crate::output;
use anyhow::{Context, Result};
use datasift_core::dataset::ValueType;
use datasift_core::{DataSiftError, DatasetSchema, FilterValue, Page, SearchService, StructuredFilter};
use serde_json::Value;

pub fn run(args: SearchArgs, service: &SearchService, format: OutputFormat) -> Result<()> {
    let schema = service.schema();

    let mut pairs = Vec::new();
    if let Some(category) = args.category {
        pairs.push(("category".to_string(), category));
    }
    if let Some(keyword) = args.keyword {
        pairs.push(("keyword".to_string(), keyword));
    }
    for raw in &args.filters {
        let (name, value) = raw.split_once('=').ok_or_else(|| {
            DataSiftError::InvalidInput(format!("Filter '{}' must look like FIELD=VALUE", raw))
        })?;
        pairs.push((name.trim().to_string(), value.trim().to_string()));
    }

    let described = pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(" ");
    let filter = build_filter(schema, pairs).with_context(|| described.clone())?;
    let result = page_of(&args.page, service)
        .and_then(|page| service.browse(&filter, page))
        .with_context(|| described.clone())?;
    print!("{}", output::format_page(&result, schema, format));
    Ok(())
}

pub fn run_find(args: FindArgs, service: &SearchService, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    let result = page_of(&args.page, service)
        .and_then(|page| service.text_search(&query, page))
        .with_context(|| query.clone())?;
    print!("{}", output::format_page(&result, service.schema(), format));
    Ok(())
}

fn page_of(args: &PageArgs, service: &SearchService) -> datasift_core::Result<Page> {
    Page::new(
        args.page,
        args.limit.unwrap_or(service.config().default_page_size),
    )
}

/// Typed filter from `field=value` pairs; unknown fields and unreadable
/// values are rejected instead of dropped
pub fn build_filter(
    schema: &DatasetSchema,
    pairs: Vec<(String, String)>,
) -> datasift_core::Result<StructuredFilter> {
    let mut filter = StructuredFilter::new();
    for (name, raw) in pairs {
        let spec = schema
            .field(&name)
            .ok_or_else(|| DataSiftError::query_mapping(&name, "unknown field"))?;
        let value = FilterValue::coerce(&Value::String(raw.clone()), spec.value_type)
            .ok_or_else(|| {
                DataSiftError::query_mapping(
                    &name,
                    format!("expected {}, got '{}'", type_name(spec.value_type), raw),
                )
            })?;
        filter.set(spec.name, value);
    }
    Ok(filter)
}

fn type_name(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Text => "text",
        ValueType::Integer => "an integer",
        ValueType::Number => "a number",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasift_core::DatasetKind;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_build_filter_coerces_types() {
        let schema = DatasetKind::Reviews.schema();
        let filter = build_filter(schema, vec![pair("min_score", "4"), pair("keyword", "tea")]).unwrap();
        assert_eq!(filter.get("min_score"), Some(&FilterValue::Integer(4)));
        assert_eq!(filter.text("keyword"), Some("tea"));
    }

    #[test]
    fn test_build_filter_rejects_bad_input() {
        let schema = DatasetKind::Reviews.schema();
        let unknown = build_filter(schema, vec![pair("genre", "drama")]).unwrap_err();
        assert_eq!(unknown.exit_code(), 3);

        let bad = build_filter(schema, vec![pair("min_score", "lots")]).unwrap_err();
        assert!(bad.to_string().contains("min_score"));
    }
}
