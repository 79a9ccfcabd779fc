use crate::model::common::{lenient_f64, now_rfc3339};
use crate::model::{generate_id, Id};
use serde::{Deserialize, Serialize};

/// Catalog identity of a chemical substance. Quantity is never stored here;
/// it is derived from the compound's active instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compound {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    /// Free text, may list several classes ("Toxic, Flammable")
    #[serde(default)]
    pub hazard_class: String,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub synonyms: Option<String>,
    #[serde(default)]
    pub unit: String,
    /// Reorder threshold, expressed in `unit`
    #[serde(default, deserialize_with = "lenient_f64")]
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "now_rfc3339")]
    pub created_at: String,
    #[serde(default = "now_rfc3339")]
    pub updated_at: String,
}

impl Compound {
    /// Individual hazard classes, split on commas and slashes
    pub fn hazard_classes(&self) -> Vec<String> {
        self.hazard_class
            .split([',', '/'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// The single class used for badges and severity ordering
    pub fn hazard(&self) -> HazardClass {
        HazardClass::classify(&self.hazard_class)
    }
}

/// Normalized hazard classification derived from the free-text `hazardClass`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HazardClass {
    #[default]
    NonHazardous,
    Flammable,
    Toxic,
    Carcinogenic,
    Corrosive,
    Oxidizing,
    Explosive,
    ToxicFlammable,
    CarcinogenicFlammable,
}

impl HazardClass {
    /// Single classes in tie-break order: on equal severity the earlier one wins
    const SINGLE: [HazardClass; 6] = [
        HazardClass::Flammable,
        HazardClass::Toxic,
        HazardClass::Carcinogenic,
        HazardClass::Corrosive,
        HazardClass::Oxidizing,
        HazardClass::Explosive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HazardClass::NonHazardous => "non-hazardous",
            HazardClass::Flammable => "flammable",
            HazardClass::Toxic => "toxic",
            HazardClass::Carcinogenic => "carcinogenic",
            HazardClass::Corrosive => "corrosive",
            HazardClass::Oxidizing => "oxidizing",
            HazardClass::Explosive => "explosive",
            HazardClass::ToxicFlammable => "toxic-flammable",
            HazardClass::CarcinogenicFlammable => "carcinogenic-flammable",
        }
    }

    /// 1 (non-hazardous) to 5 (carcinogenic, explosive or combined)
    pub fn severity(self) -> u8 {
        match self {
            HazardClass::NonHazardous => 1,
            HazardClass::Flammable | HazardClass::Corrosive | HazardClass::Oxidizing => 3,
            HazardClass::Toxic => 4,
            HazardClass::Carcinogenic
            | HazardClass::Explosive
            | HazardClass::ToxicFlammable
            | HazardClass::CarcinogenicFlammable => 5,
        }
    }

    /// Classify free text such as "Toxic, Flammable". Toxic or carcinogenic
    /// together with flammable map to the combined classes; otherwise the most
    /// severe recognized class wins. Unrecognized text is non-hazardous.
    pub fn classify(text: &str) -> HazardClass {
        let text = text.to_lowercase();
        let has = |class: HazardClass| text.contains(class.as_str());
        if has(HazardClass::Flammable) {
            if has(HazardClass::Toxic) {
                return HazardClass::ToxicFlammable;
            }
            if has(HazardClass::Carcinogenic) {
                return HazardClass::CarcinogenicFlammable;
            }
        }
        most_severe(Self::SINGLE.into_iter().filter(|class| has(*class)))
    }
}

impl std::fmt::Display for HazardClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest-severity class of the set; the first one wins a tie.
/// An empty set is non-hazardous.
pub fn most_severe(classes: impl IntoIterator<Item = HazardClass>) -> HazardClass {
    classes
        .into_iter()
        .fold(HazardClass::NonHazardous, |worst, class| {
            if class.severity() > worst.severity() {
                class
            } else {
                worst
            }
        })
}

/// Request body for creating a compound
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompound {
    pub name: String,
    pub cas_number: Option<String>,
    #[serde(default)]
    pub hazard_class: String,
    pub supplier: Option<String>,
    pub synonyms: Option<String>,
    #[serde(default)]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub threshold: f64,
    pub description: Option<String>,
}

impl NewCompound {
    pub fn into_compound(self) -> Compound {
        let now = now_rfc3339();
        Compound {
            id: generate_id(),
            name: self.name.trim().to_string(),
            cas_number: self.cas_number.filter(|c| !c.trim().is_empty()),
            hazard_class: self.hazard_class,
            supplier: self.supplier,
            synonyms: self.synonyms,
            unit: self.unit,
            threshold: self.threshold,
            description: self.description,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Field-level checks; every violated rule is reported
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Compound name is required".to_string());
        }
        if let Some(cas) = &self.cas_number {
            if !cas.trim().is_empty() && !is_valid_cas_number(cas.trim()) {
                errors.push(format!("Invalid CAS number format: {}", cas));
            }
        }
        if self.threshold < 0.0 {
            errors.push("Threshold must be a non-negative number".to_string());
        }
        errors
    }
}

/// Partial update for a compound; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundUpdate {
    pub name: Option<String>,
    pub cas_number: Option<String>,
    pub hazard_class: Option<String>,
    pub supplier: Option<String>,
    pub synonyms: Option<String>,
    pub unit: Option<String>,
    pub threshold: Option<f64>,
    pub description: Option<String>,
}

impl CompoundUpdate {
    pub fn apply_to(self, compound: &mut Compound) {
        if let Some(name) = self.name {
            compound.name = name.trim().to_string();
        }
        if let Some(cas) = self.cas_number {
            compound.cas_number = Some(cas).filter(|c| !c.trim().is_empty());
        }
        if let Some(hazard) = self.hazard_class {
            compound.hazard_class = hazard;
        }
        if let Some(supplier) = self.supplier {
            compound.supplier = Some(supplier);
        }
        if let Some(synonyms) = self.synonyms {
            compound.synonyms = Some(synonyms);
        }
        if let Some(unit) = self.unit {
            compound.unit = unit;
        }
        if let Some(threshold) = self.threshold {
            compound.threshold = threshold;
        }
        if let Some(description) = self.description {
            compound.description = Some(description);
        }
        compound.updated_at = now_rfc3339();
    }
}

/// CAS registry number: 2-7 digits, 2 digits, 1 check digit, e.g. `64-17-5`.
/// The check digit is verified as well.
pub fn is_valid_cas_number(cas: &str) -> bool {
    let parts: Vec<&str> = cas.split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    let (head, mid, check) = (parts[0], parts[1], parts[2]);
    let digits_only = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !(digits_only(head) && digits_only(mid) && digits_only(check)) {
        return false;
    }
    if !(2..=7).contains(&head.len()) || mid.len() != 2 || check.len() != 1 {
        return false;
    }

    let body: Vec<u32> = head
        .chars()
        .chain(mid.chars())
        .filter_map(|c| c.to_digit(10))
        .collect();
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| (i as u32 + 1) * d)
        .sum();
    check.chars().next().and_then(|c| c.to_digit(10)) == Some(sum % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_number_validation() {
        assert!(is_valid_cas_number("64-17-5")); // ethanol
        assert!(is_valid_cas_number("7732-18-5")); // water
        assert!(is_valid_cas_number("67-64-1")); // acetone
        assert!(!is_valid_cas_number("64-17-4"));
        assert!(!is_valid_cas_number("6417-5"));
        assert!(!is_valid_cas_number("ab-17-5"));
    }

    #[test]
    fn test_hazard_classes_split() {
        let compound = NewCompound {
            name: "Methanol".to_string(),
            cas_number: None,
            hazard_class: "Toxic, Flammable".to_string(),
            supplier: None,
            synonyms: None,
            unit: "L".to_string(),
            threshold: 1.0,
            description: None,
        }
        .into_compound();
        assert_eq!(compound.hazard_classes(), vec!["Toxic", "Flammable"]);
    }

    #[test]
    fn test_hazard_classification_and_severity() {
        assert_eq!(HazardClass::classify(""), HazardClass::NonHazardous);
        assert_eq!(HazardClass::classify("None"), HazardClass::NonHazardous);
        assert_eq!(HazardClass::classify("Irritant"), HazardClass::NonHazardous);
        assert_eq!(HazardClass::classify("Flammable, Irritant"), HazardClass::Flammable);
        assert_eq!(HazardClass::classify("Corrosive/Oxidizing"), HazardClass::Corrosive);
        assert_eq!(HazardClass::classify("Corrosive, Toxic"), HazardClass::Toxic);
        assert_eq!(HazardClass::classify("Flammable/Toxic"), HazardClass::ToxicFlammable);
        assert_eq!(
            HazardClass::classify("Carcinogenic, Flammable"),
            HazardClass::CarcinogenicFlammable
        );
        assert_eq!(HazardClass::classify("EXPLOSIVE"), HazardClass::Explosive);

        assert_eq!(HazardClass::NonHazardous.severity(), 1);
        assert_eq!(HazardClass::Oxidizing.severity(), 3);
        assert_eq!(HazardClass::Toxic.severity(), 4);
        assert_eq!(HazardClass::ToxicFlammable.severity(), 5);

        assert_eq!(most_severe(std::iter::empty()), HazardClass::NonHazardous);
        assert_eq!(
            most_severe([HazardClass::Flammable, HazardClass::Toxic, HazardClass::Corrosive]),
            HazardClass::Toxic
        );
        assert_eq!(
            most_severe([HazardClass::Oxidizing, HazardClass::Flammable]),
            HazardClass::Oxidizing
        );

        assert_eq!(
            serde_json::to_value(HazardClass::ToxicFlammable).unwrap(),
            serde_json::json!("toxic-flammable")
        );
        let parsed: HazardClass = serde_json::from_str("\"non-hazardous\"").unwrap();
        assert_eq!(parsed, HazardClass::NonHazardous);
    }

    #[test]
    fn test_new_compound_validation_lists_all_errors() {
        let request = NewCompound {
            name: "  ".to_string(),
            cas_number: Some("12-34".to_string()),
            hazard_class: String::new(),
            supplier: None,
            synonyms: None,
            unit: "g".to_string(),
            threshold: -1.0,
            description: None,
        };
        assert_eq!(request.validate().len(), 3);
    }

    #[test]
    fn test_compound_deserializes_string_threshold() {
        let json = r#"{"id":"c1","name":"Ethanol","unit":"mL","threshold":"500"}"#;
        let compound: Compound = serde_json::from_str(json).unwrap();
        assert_eq!(compound.threshold, 500.0);
        assert_eq!(compound.hazard_class, "");
    }
}
