//! Step operations used by the built-in templates.
//!
//! Source steps call the executor (searches, company lookup). Downstream
//! steps work from [`StepResults`] and report which of their inputs were
//! missing instead of failing when an upstream step failed.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{json, Value};

use super::step::{StepContext, StepOperation, StepParams, StepResults};
use crate::error::StepError;
use crate::tools::search::{analyze_sentiment, extract_domain, sentiment_counts};
use crate::tools::{truncate_chars, SearchType};

/// Merged search results kept by [`SynthesizeOperation`].
const MAX_SYNTHESIZED: usize = 20;

/// Upper bound on the text handed to the summarizer.
const MAX_DIGEST_CHARS: usize = 4000;

/// Hits requested per search step.
const SEARCH_RESULTS: usize = 10;

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("static pattern compiles"))
}

/// Replace `{key}` placeholders with step params. Unknown keys render empty.
///
/// Only the template is scanned; substituted values are copied verbatim.
fn render(template: &str, params: &StepParams) -> String {
    let rendered = placeholder_pattern().replace_all(template, |caps: &Captures| {
        params.get(&caps[1]).cloned().unwrap_or_default()
    });
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Names of the `{key}` placeholders in a template.
fn placeholders(template: &str) -> Vec<&str> {
    placeholder_pattern()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|key| key.as_str())
        .collect()
}

/// Search hits inside an upstream value, whichever shape produced them.
fn result_items(value: &Value) -> Vec<&Value> {
    ["results", "synthesized_results", "quotes", "key_points"]
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_array))
        .flatten()
        .collect()
}

/// Readable text pulled out of an upstream value, capped at `limit` characters.
fn digest(value: &Value, limit: usize) -> String {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, field) in map {
                    match (key.as_str(), field) {
                        (
                            "title" | "snippet" | "summary" | "analysis" | "description"
                            | "point",
                            Value::String(text),
                        ) if !text.is_empty() => out.push(text.clone()),
                        _ => walk(field, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            _ => {}
        }
    }

    let mut parts = Vec::new();
    walk(value, &mut parts);
    truncate_chars(&parts.join("\n"), limit)
}

fn urls(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, field) in map {
                    match (key.as_str(), field) {
                        ("url" | "website", Value::String(url)) => out.push(url.clone()),
                        _ => walk(field, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

// =============================================================================
// SOURCE STEPS
// =============================================================================
/// Web search for a query rendered from step params, e.g. `"{topic} trends"`.
pub struct SearchOperation {
    query: &'static str,
    search_type: SearchType,
}

impl SearchOperation {
    pub fn new(query: &'static str, search_type: SearchType) -> Self {
        Self { query, search_type }
    }
}

#[async_trait]
impl StepOperation for SearchOperation {
    async fn execute(
        &self,
        params: &StepParams,
        _previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let keys = placeholders(self.query);
        let bound = keys
            .iter()
            .any(|key| params.get(*key).is_some_and(|v| !v.trim().is_empty()));
        if !keys.is_empty() && !bound {
            return Err(StepError::invalid_param(keys[0], "must not be empty"));
        }

        let query = render(self.query, params);
        let response = ctx
            .executor
            .search(&query, self.search_type, SEARCH_RESULTS, ctx.conversation_id())
            .await
            .into_output()?;

        serde_json::to_value(response).map_err(|e| StepError::failed(e.to_string()))
    }
}

/// Company record for the `company` param.
pub struct CompanyProfileOperation;

#[async_trait]
impl StepOperation for CompanyProfileOperation {
    async fn execute(
        &self,
        params: &StepParams,
        _previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let company = params.get("company").map(String::as_str).unwrap_or_default();
        if company.trim().is_empty() {
            return Err(StepError::invalid_param("company", "must not be empty"));
        }

        let record = ctx
            .executor
            .lookup_company(company, ctx.conversation_id())
            .await
            .into_output()?;

        serde_json::to_value(record).map_err(|e| StepError::failed(e.to_string()))
    }
}

// =============================================================================
// DERIVED STEPS
// =============================================================================
/// Merges the hits of several upstream searches.
pub struct SynthesizeOperation {
    sources: Vec<&'static str>,
}

impl SynthesizeOperation {
    pub fn new(sources: Vec<&'static str>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl StepOperation for SynthesizeOperation {
    async fn execute(
        &self,
        params: &StepParams,
        previous: &StepResults,
        _ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        for source in &self.sources {
            let Some(value) = previous.value(source) else {
                continue;
            };
            for item in result_items(value) {
                let url = item.get("url").and_then(Value::as_str).unwrap_or_default();
                if url.is_empty() || seen.insert(url.to_string()) {
                    merged.push(item.clone());
                }
            }
        }

        let total = merged.len();
        merged.truncate(MAX_SYNTHESIZED);

        Ok(json!({
            "query": params.get("query").cloned().unwrap_or_default(),
            "total_results": total,
            "synthesized_results": merged,
            "summary": format!("Synthesized {total} search results"),
            "missing_inputs": previous.missing(&self.sources),
        }))
    }
}

/// Summarizes the text of one upstream step.
pub struct SummaryOperation {
    source: &'static str,
    max_length: usize,
}

impl SummaryOperation {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            max_length: 300,
        }
    }
}

#[async_trait]
impl StepOperation for SummaryOperation {
    async fn execute(
        &self,
        _params: &StepParams,
        previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let text = previous
            .value(self.source)
            .map(|value| digest(value, MAX_DIGEST_CHARS))
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(json!({ "summary": "Unable to generate summary" }));
        }

        let output = ctx
            .executor
            .summarize(&text, self.max_length, ctx.conversation_id())
            .await
            .into_output()?;

        Ok(json!({ "summary": output.summary }))
    }
}

/// Positive/negative tally over the hits of one upstream search.
pub struct SentimentOperation {
    source: &'static str,
}

impl SentimentOperation {
    pub fn new(source: &'static str) -> Self {
        Self { source }
    }
}

#[async_trait]
impl StepOperation for SentimentOperation {
    async fn execute(
        &self,
        _params: &StepParams,
        previous: &StepResults,
        _ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let value = previous.require(self.source)?;
        let text = digest(value, usize::MAX);
        let (positive, negative) = sentiment_counts(&text);
        let confidence = if positive + negative == 0 {
            0.5
        } else {
            positive.max(negative) as f64 / (positive + negative) as f64
        };

        Ok(json!({
            "sentiment": analyze_sentiment(&text),
            "positive_signals": positive,
            "negative_signals": negative,
            "confidence": confidence,
            "analyzed_items": result_items(value).len(),
        }))
    }
}

/// Titles of the top upstream hits as key points.
pub struct KeyPointsOperation {
    source: &'static str,
    limit: usize,
}

impl KeyPointsOperation {
    pub fn new(source: &'static str, limit: usize) -> Self {
        Self { source, limit }
    }
}

#[async_trait]
impl StepOperation for KeyPointsOperation {
    async fn execute(
        &self,
        _params: &StepParams,
        previous: &StepResults,
        _ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let value = previous.require(self.source)?;
        let key_points: Vec<Value> = result_items(value)
            .into_iter()
            .filter_map(|item| {
                let title = item.get("title").and_then(Value::as_str)?;
                Some(json!({
                    "point": title,
                    "url": item.get("url").cloned().unwrap_or(Value::Null),
                }))
            })
            .take(self.limit)
            .collect();

        Ok(json!({ "key_points": key_points }))
    }
}

/// Domains referenced by more than one upstream hit.
pub struct CrossReferenceOperation {
    sources: Vec<&'static str>,
}

impl CrossReferenceOperation {
    pub fn new(sources: Vec<&'static str>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl StepOperation for CrossReferenceOperation {
    async fn execute(
        &self,
        _params: &StepParams,
        previous: &StepResults,
        _ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for source in &self.sources {
            if let Some(value) = previous.value(source) {
                for url in urls(value) {
                    if let Some(domain) = extract_domain(&url) {
                        *counts.entry(domain).or_default() += 1;
                    }
                }
            }
        }

        let mut shared: Vec<(String, usize)> =
            counts.into_iter().filter(|(_, count)| *count > 1).collect();
        shared.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let cross_references: Vec<Value> = shared
            .into_iter()
            .map(|(domain, mentions)| json!({ "domain": domain, "mentions": mentions }))
            .collect();

        Ok(json!({
            "cross_references": cross_references,
            "missing_inputs": previous.missing(&self.sources),
        }))
    }
}

/// Condenses upstream findings into an analysis with one focus
/// (market position, SWOT, projection, ...).
pub struct AnalysisOperation {
    focus: &'static str,
    subject: &'static str,
    inputs: Vec<&'static str>,
    max_length: usize,
}

impl AnalysisOperation {
    /// `subject` is rendered from step params, e.g. `"{company}"`.
    pub fn new(focus: &'static str, subject: &'static str, inputs: Vec<&'static str>) -> Self {
        Self {
            focus,
            subject,
            inputs,
            max_length: 500,
        }
    }
}

#[async_trait]
impl StepOperation for AnalysisOperation {
    async fn execute(
        &self,
        params: &StepParams,
        previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError> {
        let subject = render(self.subject, params);
        let used: Vec<&str> = self
            .inputs
            .iter()
            .copied()
            .filter(|id| previous.value(id).is_some())
            .collect();
        let missing = previous.missing(&self.inputs);

        let findings: Vec<String> = used
            .iter()
            .filter_map(|id| previous.value(id))
            .map(|value| digest(value, MAX_DIGEST_CHARS / self.inputs.len().max(1)))
            .filter(|text| !text.is_empty())
            .collect();

        let analysis = if findings.is_empty() {
            format!("No upstream findings available for {} of {}", self.focus, subject)
        } else {
            let text = format!(
                "{} of {}.\n{}",
                self.focus,
                subject,
                findings.join("\n")
            );
            ctx.executor
                .summarize(&text, self.max_length, ctx.conversation_id())
                .await
                .into_output()?
                .summary
        };

        Ok(json!({
            "focus": self.focus,
            "subject": subject,
            "analysis": analysis,
            "inputs_used": used,
            "missing_inputs": missing,
        }))
    }
}
