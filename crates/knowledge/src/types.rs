//! Domain types for policy document retrieval.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Short description of the indexed collection.
pub const DOCUMENT_CONTENT_DESCRIPTION: &str = "Colección de pólizas de seguros";

/// A passage of a policy document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFragment {
    pub id: String,
    pub text: String,

    /// File the fragment came from, `POL<code>.pdf`
    pub source: String,

    /// Page number within the source file
    pub page: i64,

    /// Policy title
    #[serde(default)]
    pub title: String,
}

impl DocumentFragment {
    /// `POL123.pdf, página 4` style attribution.
    pub fn citation(&self) -> String {
        if self.title.is_empty() {
            format!("{}, página {}", self.source, self.page)
        } else {
            format!("{} ({}), página {}", self.source, self.title, self.page)
        }
    }
}

/// A fragment together with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub fragment: DocumentFragment,
    pub score: f32,
}

/// Comparison operator of a metadata predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "eq" | "=" | "==" => Some(Self::Eq),
            "ne" | "!=" | "<>" => Some(Self::Ne),
            "gt" | ">" => Some(Self::Gt),
            "gte" | ">=" => Some(Self::Gte),
            "lt" | "<" => Some(Self::Lt),
            "lte" | "<=" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Integer(n) => write!(f, "{}", n),
            FilterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One `attribute comparator value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub attribute: String,
    pub comparator: Comparator,
    pub value: FilterValue,
}

impl Predicate {
    pub fn new(attribute: impl Into<String>, comparator: Comparator, value: FilterValue) -> Self {
        Self {
            attribute: attribute.into(),
            comparator,
            value,
        }
    }

    pub fn eq(attribute: impl Into<String>, value: FilterValue) -> Self {
        Self::new(attribute, Comparator::Eq, value)
    }

    /// Evaluate against a fragment. Unknown attributes and type mismatches
    /// never match.
    pub fn matches(&self, fragment: &DocumentFragment) -> bool {
        let ordering = match (self.attribute.as_str(), &self.value) {
            ("source", FilterValue::Text(v)) => fragment.source.as_str().cmp(v.as_str()),
            ("title", FilterValue::Text(v)) => fragment.title.as_str().cmp(v.as_str()),
            ("page", FilterValue::Integer(v)) => fragment.page.cmp(v),
            _ => return false,
        };
        self.comparator.accepts(ordering)
    }

    /// SQL condition for the vector store.
    pub fn to_sql(&self) -> String {
        let value = match &self.value {
            FilterValue::Integer(n) => n.to_string(),
            FilterValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        };
        format!(
            "{} {} {}",
            self.attribute,
            self.comparator.sql_operator(),
            value
        )
    }
}

/// Conjunction of predicates as a single SQL condition, `None` when empty.
pub fn filter_to_sql(filter: &[Predicate]) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    Some(
        filter
            .iter()
            .map(Predicate::to_sql)
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// A natural-language question split into a semantic search string and a
/// metadata filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub query: String,
    #[serde(default)]
    pub filter: Vec<Predicate>,
}

impl StructuredQuery {
    /// No filter; the full text is the search string.
    pub fn unfiltered(text: impl Into<String>) -> Self {
        Self {
            query: text.into(),
            filter: Vec::new(),
        }
    }

    pub fn constrains(&self, attribute: &str) -> bool {
        self.filter.iter().any(|p| p.attribute == attribute)
    }
}

/// Value type of a filterable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
}

/// A filterable metadata field as described to the query parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub description: String,
}

impl AttributeInfo {
    pub fn new(name: &str, attr_type: AttributeType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            description: description.to_string(),
        }
    }
}

/// `source`, `page` and `title`.
pub fn default_metadata_fields() -> Vec<AttributeInfo> {
    vec![
        AttributeInfo::new(
            "source",
            AttributeType::String,
            "el nombre de archivo y código de la póliza de donde vino este fragmento, el formato es POL{código de póliza}.pdf",
        ),
        AttributeInfo::new(
            "page",
            AttributeType::Integer,
            "el número de página de la póliza",
        ),
        AttributeInfo::new("title", AttributeType::String, "el título de la póliza"),
    ]
}
