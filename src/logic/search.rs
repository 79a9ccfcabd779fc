use chrono::NaiveDate;
use itertools::Itertools;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::logic::stock;
use crate::model::{
    parse_date, Compound, CompoundInstance, FieldType, HazardClass, LogicOp, SearchCondition, SearchField,
    SearchOperator, SearchQuery,
};

/// A compound joined with its active instances; the unit searches run over
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundView {
    #[serde(flatten)]
    pub compound: Compound,
    pub total_quantity: f64,
    pub instance_count: usize,
    pub locations: Vec<String>,
    pub batch_numbers: Vec<String>,
    pub earliest_expiry: Option<NaiveDate>,
    pub latest_received: Option<NaiveDate>,
    pub is_low_stock: bool,
    pub hazard: HazardClass,
    pub hazard_severity: u8,
    #[serde(skip)]
    expiry_dates: Vec<NaiveDate>,
    #[serde(skip)]
    received_dates: Vec<NaiveDate>,
}

impl CompoundView {
    pub fn new(compound: &Compound, instances: &[CompoundInstance]) -> Self {
        let active: Vec<&CompoundInstance> = instances
            .iter()
            .filter(|i| i.compound_id == compound.id && i.is_active())
            .collect();
        let total_quantity = stock::total_stock(instances, &compound.id);
        let expiry_dates: Vec<NaiveDate> = active.iter().filter_map(|i| i.expiry_date).collect();
        let received_dates: Vec<NaiveDate> =
            active.iter().filter_map(|i| i.received_date).collect();
        let hazard = compound.hazard();

        Self {
            compound: compound.clone(),
            total_quantity,
            instance_count: active.len(),
            locations: active.iter().map(|i| i.location.clone()).unique().collect(),
            batch_numbers: active
                .iter()
                .map(|i| i.batch_number.clone())
                .filter(|b| !b.trim().is_empty())
                .unique()
                .collect(),
            earliest_expiry: expiry_dates.iter().min().copied(),
            latest_received: received_dates.iter().max().copied(),
            is_low_stock: total_quantity < compound.threshold,
            hazard,
            hazard_severity: hazard.severity(),
            expiry_dates,
            received_dates,
        }
    }
}

pub fn build_views(compounds: &[Compound], instances: &[CompoundInstance]) -> Vec<CompoundView> {
    compounds
        .iter()
        .map(|c| CompoundView::new(c, instances))
        .collect()
}

enum FieldValue {
    Text(Vec<String>),
    Number(Option<f64>),
    Date(Vec<NaiveDate>),
}

fn field_value(view: &CompoundView, field: SearchField) -> FieldValue {
    let optional = |value: &Option<String>| value.iter().cloned().collect::<Vec<_>>();
    match field {
        SearchField::Name => FieldValue::Text(vec![view.compound.name.clone()]),
        SearchField::CasNumber => FieldValue::Text(optional(&view.compound.cas_number)),
        SearchField::Synonyms => FieldValue::Text(optional(&view.compound.synonyms)),
        SearchField::Supplier => FieldValue::Text(optional(&view.compound.supplier)),
        SearchField::Location => FieldValue::Text(view.locations.clone()),
        SearchField::HazardClass => FieldValue::Text(view.compound.hazard_classes()),
        SearchField::BatchNumber => FieldValue::Text(view.batch_numbers.clone()),
        SearchField::Quantity => FieldValue::Number(Some(view.total_quantity)),
        SearchField::Threshold => FieldValue::Number(Some(view.compound.threshold)),
        SearchField::ExpiryDate => FieldValue::Date(view.expiry_dates.clone()),
        SearchField::ReceivedDate => FieldValue::Date(view.received_dates.clone()),
    }
}

/// Operators that apply to a field type
pub fn operators_for(field_type: FieldType) -> &'static [SearchOperator] {
    match field_type {
        FieldType::Text | FieldType::Select => &[
            SearchOperator::Contains,
            SearchOperator::Equals,
            SearchOperator::StartsWith,
            SearchOperator::EndsWith,
            SearchOperator::IsEmpty,
            SearchOperator::IsNotEmpty,
        ],
        FieldType::Number | FieldType::Date => &[
            SearchOperator::Equals,
            SearchOperator::GreaterThan,
            SearchOperator::LessThan,
            SearchOperator::Between,
            SearchOperator::IsEmpty,
            SearchOperator::IsNotEmpty,
        ],
    }
}

pub fn is_applicable(field: SearchField, operator: SearchOperator) -> bool {
    operators_for(field.field_type()).contains(&operator)
}

fn needs_value(operator: SearchOperator) -> bool {
    !matches!(operator, SearchOperator::IsEmpty | SearchOperator::IsNotEmpty)
}

fn split_range(raw: &str) -> Option<(&str, &str)> {
    let (low, high) = raw.split_once(',')?;
    Some((low.trim(), high.trim()))
}

/// Problems with a list of advanced conditions, one message per condition
pub fn validate_conditions(conditions: &[SearchCondition]) -> Vec<String> {
    let mut errors = Vec::new();
    for (index, condition) in conditions.iter().enumerate() {
        let position = index + 1;
        let field_type = condition.field.field_type();
        if !is_applicable(condition.field, condition.operator) {
            errors.push(format!(
                "Condition {}: operator '{}' cannot be used with field '{}'",
                position,
                condition.operator.label(),
                condition.field.label()
            ));
            continue;
        }
        if !needs_value(condition.operator) {
            continue;
        }
        let value = condition.value.trim();
        if value.is_empty() {
            errors.push(format!("Condition {}: a value is required", position));
            continue;
        }
        let parses = |raw: &str| match field_type {
            FieldType::Number => raw.parse::<f64>().is_ok(),
            FieldType::Date => parse_date(raw).is_some(),
            FieldType::Text | FieldType::Select => true,
        };
        let well_formed = match condition.operator {
            SearchOperator::Between => {
                split_range(value).is_some_and(|(low, high)| parses(low) && parses(high))
            }
            _ => parses(value),
        };
        if !well_formed {
            let expected = match (field_type, condition.operator) {
                (FieldType::Number, SearchOperator::Between) => "two numbers separated by a comma",
                (FieldType::Date, SearchOperator::Between) => "two dates separated by a comma",
                (FieldType::Date, _) => "a date (YYYY-MM-DD)",
                _ => "a number",
            };
            errors.push(format!("Condition {}: expected {}", position, expected));
        }
    }
    errors
}

fn compare<T: PartialOrd + Copy>(
    values: &[T],
    operator: SearchOperator,
    criteria: &str,
    parse: impl Fn(&str) -> Option<T>,
    equal: impl Fn(T, T) -> bool,
) -> bool {
    match operator {
        SearchOperator::IsEmpty => values.is_empty(),
        SearchOperator::IsNotEmpty => !values.is_empty(),
        SearchOperator::Between => match split_range(criteria).map(|(l, h)| (parse(l), parse(h))) {
            Some((Some(low), Some(high))) => values.iter().any(|v| *v >= low && *v <= high),
            _ => false,
        },
        _ => {
            let Some(target) = parse(criteria.trim()) else {
                return false;
            };
            values.iter().any(|v| match operator {
                SearchOperator::Equals => equal(*v, target),
                SearchOperator::GreaterThan => *v > target,
                SearchOperator::LessThan => *v < target,
                _ => false,
            })
        }
    }
}

/// Evaluate one condition. Inapplicable operators evaluate to false.
pub fn evaluate_condition(view: &CompoundView, condition: &SearchCondition) -> bool {
    if !is_applicable(condition.field, condition.operator) {
        return false;
    }
    let criteria = condition.value.trim().to_lowercase();
    match field_value(view, condition.field) {
        FieldValue::Text(values) => {
            let values: Vec<String> = values
                .iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect();
            match condition.operator {
                SearchOperator::IsEmpty => values.is_empty(),
                SearchOperator::IsNotEmpty => !values.is_empty(),
                SearchOperator::Contains => values.iter().any(|v| v.contains(&criteria)),
                SearchOperator::Equals => values.iter().any(|v| *v == criteria),
                SearchOperator::StartsWith => values.iter().any(|v| v.starts_with(&criteria)),
                SearchOperator::EndsWith => values.iter().any(|v| v.ends_with(&criteria)),
                _ => false,
            }
        }
        FieldValue::Number(value) => compare(
            &value.into_iter().collect::<Vec<_>>(),
            condition.operator,
            &criteria,
            |raw| raw.parse::<f64>().ok(),
            |a, b| (a - b).abs() < f64::EPSILON * a.abs().max(b.abs()).max(1.0),
        ),
        FieldValue::Date(values) => compare(
            &values,
            condition.operator,
            &criteria,
            parse_date,
            |a, b| a == b,
        ),
    }
}

/// Combine conditions by a strict left fold: each condition joins the running
/// result through the logic of the condition before it. No conditions match everything.
pub fn evaluate_conditions(view: &CompoundView, conditions: &[SearchCondition]) -> bool {
    let Some((first, rest)) = conditions.split_first() else {
        return true;
    };
    let (result, _) = rest.iter().fold(
        (evaluate_condition(view, first), first.logic),
        |(acc, link), condition| {
            let current = evaluate_condition(view, condition);
            let combined = match link {
                LogicOp::And => acc && current,
                LogicOp::Or => acc || current,
            };
            (combined, condition.logic)
        },
    );
    result
}

/// Compiled free-text matcher
pub enum TextMatcher {
    All,
    Substring(String),
    Pattern(Regex),
    /// Invalid regular expression
    Nothing,
}

impl TextMatcher {
    pub fn new(query: &str, regex: bool) -> Self {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return TextMatcher::All;
        }
        if !regex {
            return TextMatcher::Substring(trimmed.to_lowercase());
        }
        match RegexBuilder::new(trimmed).case_insensitive(true).build() {
            Ok(pattern) => TextMatcher::Pattern(pattern),
            Err(e) => {
                log::debug!("Ignoring invalid search pattern '{}': {}", trimmed, e);
                TextMatcher::Nothing
            }
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            TextMatcher::All => true,
            TextMatcher::Substring(needle) => text.to_lowercase().contains(needle),
            TextMatcher::Pattern(pattern) => pattern.is_match(text),
            TextMatcher::Nothing => false,
        }
    }

    pub fn matches_view(&self, view: &CompoundView) -> bool {
        match self {
            TextMatcher::All => true,
            TextMatcher::Nothing => false,
            _ => SearchField::SIMPLE.iter().any(|field| match field_value(view, *field) {
                FieldValue::Text(values) => values.iter().any(|v| self.is_match(v)),
                _ => false,
            }),
        }
    }
}

/// Run a search over the compound catalog
pub fn search(
    compounds: &[Compound],
    instances: &[CompoundInstance],
    query: &SearchQuery,
) -> Vec<CompoundView> {
    let views = build_views(compounds, instances);
    match query {
        SearchQuery::Simple { query, regex } => {
            let matcher = TextMatcher::new(query, *regex);
            views.into_iter().filter(|v| matcher.matches_view(v)).collect()
        }
        SearchQuery::Advanced { conditions } => views
            .into_iter()
            .filter(|v| evaluate_conditions(v, conditions))
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorDescriptor {
    pub key: SearchOperator,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub key: SearchField,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub operators: Vec<OperatorDescriptor>,
}

/// Searchable fields and the operators each accepts
pub fn field_descriptors() -> Vec<FieldDescriptor> {
    SearchField::ALL
        .iter()
        .map(|field| FieldDescriptor {
            key: *field,
            label: field.label(),
            field_type: field.field_type(),
            operators: operators_for(field.field_type())
                .iter()
                .map(|op| OperatorDescriptor {
                    key: *op,
                    label: op.label(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewCompound, NewInstance};

    fn compound(name: &str, hazard: &str, cas: Option<&str>) -> Compound {
        NewCompound {
            name: name.to_string(),
            cas_number: cas.map(str::to_string),
            hazard_class: hazard.to_string(),
            supplier: Some("Sigma-Aldrich".to_string()),
            synonyms: None,
            unit: "mL".to_string(),
            threshold: 100.0,
            description: None,
        }
        .into_compound()
    }

    fn instance(compound: &Compound, quantity: f64, batch: &str, expiry: Option<&str>) -> CompoundInstance {
        NewInstance {
            compound_id: compound.id.clone(),
            batch_number: batch.to_string(),
            quantity,
            unit: "mL".to_string(),
            location: "Cabinet A".to_string(),
            received_date: None,
            expiry_date: expiry.and_then(parse_date),
            opened_date: None,
            description: None,
        }
        .into_instance()
    }

    fn catalog() -> (Vec<Compound>, Vec<CompoundInstance>) {
        let ethanol = compound("Ethanol", "Flammable", Some("64-17-5"));
        let acetone = compound("Acetone", "Flammable, Irritant", Some("67-64-1"));
        let salt = compound("Sodium Chloride", "None", None);
        let instances = vec![
            instance(&ethanol, 50.0, "ETH-001", Some("2025-06-01")),
            instance(&acetone, 500.0, "ACE-002", Some("2026-01-01")),
            instance(&salt, 20.0, "NACL-9", None),
        ];
        (vec![ethanol, acetone, salt], instances)
    }

    fn names(views: &[CompoundView]) -> Vec<&str> {
        views.iter().map(|v| v.compound.name.as_str()).collect()
    }

    #[test]
    fn test_simple_search_fields() {
        let (compounds, instances) = catalog();
        let by_name = search(&compounds, &instances, &SearchQuery::Simple { query: "ACET".to_string(), regex: false });
        assert_eq!(names(&by_name), vec!["Acetone"]);

        let by_batch = search(&compounds, &instances, &SearchQuery::Simple { query: "nacl".to_string(), regex: false });
        assert_eq!(names(&by_batch), vec!["Sodium Chloride"]);

        let all = search(&compounds, &instances, &SearchQuery::default());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_regex_search_and_invalid_pattern() {
        let (compounds, instances) = catalog();
        let cas = search(&compounds, &instances, &SearchQuery::Simple { query: r"^6[47]-".to_string(), regex: true });
        assert_eq!(cas.len(), 2);

        let invalid = search(&compounds, &instances, &SearchQuery::Simple { query: "([".to_string(), regex: true });
        assert!(invalid.is_empty());
    }

    #[test]
    fn test_flammable_and_low_quantity() {
        let (compounds, instances) = catalog();
        let query = SearchQuery::Advanced {
            conditions: vec![
                SearchCondition::new(SearchField::HazardClass, SearchOperator::Equals, "Flammable"),
                SearchCondition::new(SearchField::Quantity, SearchOperator::LessThan, "100"),
            ],
        };
        assert_eq!(names(&search(&compounds, &instances, &query)), vec!["Ethanol"]);
    }

    #[test]
    fn test_strict_left_fold_uses_previous_logic() {
        let (compounds, instances) = catalog();
        // (name contains "sodium" OR hazard equals flammable) AND quantity > 100
        let conditions = vec![
            SearchCondition::new(SearchField::Name, SearchOperator::Contains, "sodium").then(LogicOp::Or),
            SearchCondition::new(SearchField::HazardClass, SearchOperator::Equals, "flammable"),
            SearchCondition::new(SearchField::Quantity, SearchOperator::GreaterThan, "100"),
        ];
        let found = search(&compounds, &instances, &SearchQuery::Advanced { conditions });
        assert_eq!(names(&found), vec!["Acetone"]);

        let none = search(&compounds, &instances, &SearchQuery::Advanced { conditions: vec![] });
        assert_eq!(none.len(), 3);
    }

    #[test]
    fn test_date_operators_compare_dates() {
        let (compounds, instances) = catalog();
        let before = SearchQuery::Advanced {
            conditions: vec![SearchCondition::new(SearchField::ExpiryDate, SearchOperator::LessThan, "2025-12-31")],
        };
        assert_eq!(names(&search(&compounds, &instances, &before)), vec!["Ethanol"]);

        let between = SearchQuery::Advanced {
            conditions: vec![SearchCondition::new(
                SearchField::ExpiryDate,
                SearchOperator::Between,
                "2025-01-01, 2026-01-01",
            )],
        };
        assert_eq!(search(&compounds, &instances, &between).len(), 2);

        let empty = SearchQuery::Advanced {
            conditions: vec![SearchCondition::new(SearchField::ExpiryDate, SearchOperator::IsEmpty, "")],
        };
        assert_eq!(names(&search(&compounds, &instances, &empty)), vec!["Sodium Chloride"]);
    }

    #[test]
    fn test_inapplicable_operator_is_false_and_reported() {
        let (compounds, instances) = catalog();
        let bad = SearchCondition::new(SearchField::Name, SearchOperator::GreaterThan, "5");
        let views = build_views(&compounds, &instances);
        assert!(views.iter().all(|v| !evaluate_condition(v, &bad)));

        let errors = validate_conditions(&[
            bad,
            SearchCondition::new(SearchField::Quantity, SearchOperator::Between, "10"),
            SearchCondition::new(SearchField::Supplier, SearchOperator::IsEmpty, ""),
        ]);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Condition 1"));
        assert!(errors[1].contains("two numbers"));
    }

    #[test]
    fn test_views_carry_hazard_severity() {
        let (compounds, instances) = catalog();
        let views = build_views(&compounds, &instances);
        assert_eq!(views[0].hazard, HazardClass::Flammable);
        assert_eq!(views[1].hazard_severity, 3);
        assert_eq!(views[2].hazard, HazardClass::NonHazardous);

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["hazard"], "flammable");
        assert_eq!(json["hazardSeverity"], 3);
        assert_eq!(json["hazardClass"], "Flammable");
    }

    #[test]
    fn test_operators_for_field_types() {
        assert!(operators_for(FieldType::Select).contains(&SearchOperator::StartsWith));
        assert!(!operators_for(FieldType::Date).contains(&SearchOperator::Contains));
        assert_eq!(field_descriptors().len(), SearchField::ALL.len());
    }
}
