//! Natural-language question to [`StructuredQuery`].
//!
//! The completion service proposes a search string and metadata filter as
//! JSON. Its output is checked against the declared attributes: predicates on
//! unknown attributes, unknown comparators or values of the wrong type are
//! dropped. A policy code or page number written in the question is then
//! added as a filter when the model left that attribute unconstrained.

use crate::types::{AttributeInfo, AttributeType, Comparator, FilterValue, Predicate, StructuredQuery};
use policypro_core::{AppError, AppResult};
use policypro_llm::{ChatMessage, LlmClient, LlmRequest};
use policypro_prompt::{PromptLibrary, RETRIEVAL_SELF_QUERY};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static POLICY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPOL[\s\-_]*(\d+)\b").expect("Invalid policy code regex"));

static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:p[aá]gina|p[aá]g\.?|page)\s*(?:n[uú]mero\s*|no\.?\s*|#\s*)?(\d+)")
        .expect("Invalid page number regex")
});

#[derive(Debug, Deserialize)]
struct RawStructuredQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    filter: Vec<RawPredicate>,
}

#[derive(Debug, Deserialize)]
struct RawPredicate {
    attribute: String,
    comparator: String,
    value: Value,
}

/// Asks the completion service to structure a question.
pub struct SelfQueryParser {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
    content_description: String,
    attributes: Vec<AttributeInfo>,
}

impl SelfQueryParser {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
        content_description: impl Into<String>,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
            content_description: content_description.into(),
            attributes,
        }
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub async fn parse(&self, question: &str) -> AppResult<StructuredQuery> {
        let attributes = describe_attributes(&self.attributes);
        let prompt = self.prompts.render(
            RETRIEVAL_SELF_QUERY,
            &[
                ("content_description", self.content_description.as_str()),
                ("attributes", attributes.as_str()),
                ("query", question),
            ],
        )?;

        let request = LlmRequest::new(self.model.clone(), vec![ChatMessage::user(prompt)])
            .with_temperature(0.0)
            .with_json_mode();
        let response = self.llm.complete(&request).await?;

        let mut structured = parse_structured_output(&response.content, question, &self.attributes)?;
        apply_hints(&mut structured, question, &self.attributes);

        tracing::debug!(
            query = %structured.query,
            filters = structured.filter.len(),
            "Structured query"
        );
        Ok(structured)
    }
}

/// One line per attribute, `- name (type): description`.
pub fn describe_attributes(attributes: &[AttributeInfo]) -> String {
    attributes
        .iter()
        .map(|a| {
            let ty = match a.attr_type {
                AttributeType::String => "string",
                AttributeType::Integer => "integer",
            };
            format!("- {} ({}): {}", a.name, ty, a.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the JSON object from a completion, tolerating code fences and
/// surrounding prose.
fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Validate the parser output against `attributes`.
///
/// # Errors
/// `Upstream` when the output is not a JSON object of the expected shape.
pub fn parse_structured_output(
    raw: &str,
    question: &str,
    attributes: &[AttributeInfo],
) -> AppResult<StructuredQuery> {
    let json = json_object(raw).ok_or_else(|| {
        AppError::Upstream(format!("Query parser returned no JSON object: {}", raw.trim()))
    })?;
    let parsed: RawStructuredQuery = serde_json::from_str(json)
        .map_err(|e| AppError::Upstream(format!("Query parser returned malformed JSON: {}", e)))?;

    let filter: Vec<Predicate> = parsed
        .filter
        .into_iter()
        .filter_map(|raw| normalize_predicate(raw, attributes))
        .collect();

    let query = parsed
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    Ok(match (filter.is_empty(), query) {
        (true, _) | (false, None) => StructuredQuery {
            query: question.to_string(),
            filter,
        },
        (false, Some(query)) => StructuredQuery { query, filter },
    })
}

fn normalize_predicate(raw: RawPredicate, attributes: &[AttributeInfo]) -> Option<Predicate> {
    let Some(info) = attributes.iter().find(|a| a.name == raw.attribute) else {
        tracing::debug!("Dropping predicate on unknown attribute '{}'", raw.attribute);
        return None;
    };
    let Some(comparator) = Comparator::parse(&raw.comparator) else {
        tracing::debug!("Dropping predicate with unknown comparator '{}'", raw.comparator);
        return None;
    };

    let value = match (info.attr_type, raw.value) {
        (AttributeType::Integer, Value::Number(n)) => FilterValue::Integer(n.as_i64()?),
        (AttributeType::Integer, Value::String(s)) => FilterValue::Integer(s.trim().parse().ok()?),
        (AttributeType::String, Value::String(s)) if !s.trim().is_empty() => {
            FilterValue::Text(s.trim().to_string())
        }
        (AttributeType::String, Value::Number(n)) => FilterValue::Text(n.to_string()),
        (_, other) => {
            tracing::debug!("Dropping predicate on '{}' with value {}", info.name, other);
            return None;
        }
    };

    Some(Predicate::new(info.name.clone(), comparator, value))
}

/// Add `source` / `page` conditions written literally in the question.
pub fn apply_hints(query: &mut StructuredQuery, question: &str, attributes: &[AttributeInfo]) {
    let declared = |name: &str| attributes.iter().any(|a| a.name == name);

    if declared("source") && !query.constrains("source") {
        if let Some(code) = POLICY_CODE.captures(question).and_then(|c| c.get(1)) {
            query.filter.push(Predicate::eq(
                "source",
                FilterValue::Text(format!("POL{}.pdf", code.as_str())),
            ));
        }
    }

    if declared("page") && !query.constrains("page") {
        if let Some(page) = PAGE_NUMBER
            .captures(question)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
        {
            query.filter.push(Predicate::eq("page", FilterValue::Integer(page)));
        }
    }
}
