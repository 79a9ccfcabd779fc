use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement family; conversions only happen within one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitFamily {
    Weight,
    Volume,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "mg")]
    Milligram,
    #[serde(rename = "ug")]
    Microgram,
    #[serde(rename = "L")]
    Liter,
    #[serde(rename = "mL")]
    Milliliter,
    #[serde(rename = "mol")]
    Mole,
    #[serde(rename = "mmol")]
    Millimole,
}

impl Unit {
    pub const ALL: [Unit; 8] = [
        Unit::Gram,
        Unit::Kilogram,
        Unit::Milligram,
        Unit::Microgram,
        Unit::Liter,
        Unit::Milliliter,
        Unit::Mole,
        Unit::Millimole,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milligram => "mg",
            Unit::Microgram => "ug",
            Unit::Liter => "L",
            Unit::Milliliter => "mL",
            Unit::Mole => "mol",
            Unit::Millimole => "mmol",
        }
    }

    pub fn family(&self) -> UnitFamily {
        match self {
            Unit::Gram | Unit::Kilogram | Unit::Milligram | Unit::Microgram => UnitFamily::Weight,
            Unit::Liter | Unit::Milliliter => UnitFamily::Volume,
            Unit::Mole | Unit::Millimole => UnitFamily::Amount,
        }
    }

    /// Factor relative to the family base (gram, liter, mole)
    pub fn factor(&self) -> f64 {
        match self {
            Unit::Gram => 1.0,
            Unit::Kilogram => 1000.0,
            Unit::Milligram => 0.001,
            Unit::Microgram => 0.000001,
            Unit::Liter => 1.0,
            Unit::Milliliter => 0.001,
            Unit::Mole => 1.0,
            Unit::Millimole => 0.001,
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Unit::Gram => &["gram", "grams", "gramo", "gramos"],
            Unit::Kilogram => &["kilogram", "kilograms", "kilogramo", "kilogramos"],
            Unit::Milligram => &["milligram", "milligrams", "miligramo", "miligramos"],
            Unit::Microgram => &["µg", "μg", "microgram", "micrograms", "microgramo", "microgramos"],
            Unit::Liter => &["l", "liter", "liters", "litre", "litres", "litro", "litros"],
            Unit::Milliliter => &["ml", "milliliter", "milliliters", "mililitro", "mililitros"],
            Unit::Mole => &["mole", "moles"],
            Unit::Millimole => &["millimole", "millimoles", "milimol", "milimoles"],
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Resolve a unit name, symbol or alias (case-insensitive)
pub fn normalize(unit: &str) -> Option<Unit> {
    let lower = unit.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    Unit::ALL.into_iter().find(|u| {
        u.symbol().to_lowercase() == lower || u.aliases().iter().any(|a| *a == lower)
    })
}

/// Both units are known and belong to the same family
pub fn are_compatible(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a.family() == b.family(),
        _ => false,
    }
}

/// Convert `value` between units. `None` when a unit is unknown or the
/// families differ.
pub fn convert(value: f64, from: &str, to: &str) -> Option<f64> {
    let from = normalize(from)?;
    let to = normalize(to)?;
    convert_units(value, from, to)
}

pub fn convert_units(value: f64, from: Unit, to: Unit) -> Option<f64> {
    if from.family() != to.family() {
        return None;
    }
    Some(value * from.factor() / to.factor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize("gramos"), Some(Unit::Gram));
        assert_eq!(normalize("ML"), Some(Unit::Milliliter));
        assert_eq!(normalize("l"), Some(Unit::Liter));
        assert_eq!(normalize("µg"), Some(Unit::Microgram));
        assert_eq!(normalize("Litros"), Some(Unit::Liter));
        assert_eq!(normalize("bottles"), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_convert_within_family() {
        assert_eq!(convert(2.5, "kg", "g"), Some(2500.0));
        assert_eq!(convert(250.0, "mL", "L"), Some(0.25));
        assert_eq!(convert(5.0, "mmol", "mol"), Some(0.005));
    }

    #[test]
    fn test_convert_rejects_incompatible_or_unknown() {
        assert_eq!(convert(1.0, "g", "mL"), None);
        assert_eq!(convert(1.0, "mol", "kg"), None);
        assert_eq!(convert(1.0, "bottle", "g"), None);
        assert!(!are_compatible("g", "L"));
        assert!(are_compatible("mg", "kilogramos"));
    }

    #[test]
    fn test_kg_round_trip_within_tolerance() {
        for value in [0.001, 1.0, 3.3333, 1234.5678] {
            let grams = convert(value, "kg", "g").unwrap();
            let back = convert(grams, "g", "kg").unwrap();
            assert!((back - value).abs() < 1e-9, "{} -> {} -> {}", value, grams, back);
        }
    }
}
