use crate::model::Id;
use serde::{Deserialize, Serialize};

/// Declared type of a searchable field; decides which operators apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Select,
    Number,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchField {
    Name,
    CasNumber,
    Synonyms,
    Supplier,
    Location,
    HazardClass,
    Quantity,
    Threshold,
    ExpiryDate,
    ReceivedDate,
    BatchNumber,
}

impl SearchField {
    pub const ALL: [SearchField; 11] = [
        SearchField::Name,
        SearchField::CasNumber,
        SearchField::Synonyms,
        SearchField::Supplier,
        SearchField::Location,
        SearchField::HazardClass,
        SearchField::Quantity,
        SearchField::Threshold,
        SearchField::ExpiryDate,
        SearchField::ReceivedDate,
        SearchField::BatchNumber,
    ];

    /// Fields scanned by simple (free-text) search
    pub const SIMPLE: [SearchField; 5] = [
        SearchField::Name,
        SearchField::CasNumber,
        SearchField::Synonyms,
        SearchField::Supplier,
        SearchField::BatchNumber,
    ];

    pub fn field_type(&self) -> FieldType {
        match self {
            SearchField::Name
            | SearchField::CasNumber
            | SearchField::Synonyms
            | SearchField::Supplier
            | SearchField::BatchNumber => FieldType::Text,
            SearchField::Location | SearchField::HazardClass => FieldType::Select,
            SearchField::Quantity | SearchField::Threshold => FieldType::Number,
            SearchField::ExpiryDate | SearchField::ReceivedDate => FieldType::Date,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SearchField::Name => "Compound Name",
            SearchField::CasNumber => "CAS Number",
            SearchField::Synonyms => "Synonyms",
            SearchField::Supplier => "Supplier",
            SearchField::Location => "Location",
            SearchField::HazardClass => "Hazard Class",
            SearchField::Quantity => "Quantity",
            SearchField::Threshold => "Threshold",
            SearchField::ExpiryDate => "Expiry Date",
            SearchField::ReceivedDate => "Received Date",
            SearchField::BatchNumber => "Batch Number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    IsEmpty,
    IsNotEmpty,
}

impl SearchOperator {
    pub fn label(&self) -> &'static str {
        match self {
            SearchOperator::Contains => "Contains",
            SearchOperator::Equals => "Equals",
            SearchOperator::StartsWith => "Starts with",
            SearchOperator::EndsWith => "Ends with",
            SearchOperator::GreaterThan => "Greater than",
            SearchOperator::LessThan => "Less than",
            SearchOperator::Between => "Between",
            SearchOperator::IsEmpty => "Is empty",
            SearchOperator::IsNotEmpty => "Is not empty",
        }
    }
}

/// Link between a condition and the one after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicOp {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCondition {
    #[serde(default)]
    pub id: Option<String>,
    pub field: SearchField,
    pub operator: SearchOperator,
    #[serde(default)]
    pub value: String,
    /// Combines this condition's running result with the *next* condition
    #[serde(default)]
    pub logic: LogicOp,
}

impl SearchCondition {
    pub fn new(field: SearchField, operator: SearchOperator, value: &str) -> Self {
        Self {
            id: None,
            field,
            operator,
            value: value.to_string(),
            logic: LogicOp::And,
        }
    }

    pub fn then(mut self, logic: LogicOp) -> Self {
        self.logic = logic;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SearchQuery {
    Simple {
        #[serde(default)]
        query: String,
        #[serde(default)]
        regex: bool,
    },
    Advanced {
        #[serde(default)]
        conditions: Vec<SearchCondition>,
    },
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery::Simple {
            query: String::new(),
            regex: false,
        }
    }
}

impl SearchQuery {
    /// Short human-readable description of the active search
    pub fn summary(&self) -> String {
        match self {
            SearchQuery::Simple { query, .. } if query.trim().is_empty() => String::new(),
            SearchQuery::Simple { query, .. } => format!("Text search: \"{}\"", query),
            SearchQuery::Advanced { conditions } => {
                let active = conditions
                    .iter()
                    .filter(|c| !c.value.trim().is_empty())
                    .count();
                match active {
                    0 => String::new(),
                    1 => "1 advanced filter active".to_string(),
                    n => format!("{} advanced filters active", n),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: Id,
    pub name: String,
    pub query: SearchQuery,
    /// Description shown next to the name, e.g. "2 advanced filters active"
    #[serde(default)]
    pub summary: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSearchRequest {
    pub name: String,
    pub query: SearchQuery,
}
