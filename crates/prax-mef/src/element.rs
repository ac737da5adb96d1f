//! Identifiers, labels, attributes, and units shared by all model entities

use serde::{Deserialize, Serialize};

/// Case-folded identifier with the original spelling preserved for display.
///
/// Events, gates, fault trees, and CCF groups are matched case-insensitively;
/// parameters are case-sensitive and bypass this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Case-folded key used for lookups and uniqueness.
    pub name: String,
    /// Original spelling as it appeared in the input.
    pub orig_name: String,
}

impl Id {
    /// Fold an original spelling into an identifier.
    pub fn new(orig_name: &str) -> Self {
        let orig_name = orig_name.trim().to_string();
        Self {
            name: orig_name.to_lowercase(),
            orig_name,
        }
    }

    /// The case-folded lookup key for a raw spelling.
    pub fn fold(raw: &str) -> String {
        raw.trim().to_lowercase()
    }
}

/// Free-form attribute attached to a declarative element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    /// Optional type hint carried through from the input document.
    pub type_hint: Option<String>,
}

/// Label and attributes common to every declarative element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Optional human-readable label.
    pub label: Option<String>,
    /// Attributes in declaration order.
    pub attributes: Vec<Attribute>,
}

impl Meta {
    /// Look up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Whether the element carries `flavor=<value>`.
    pub fn has_flavor(&self, value: &str) -> bool {
        self.attribute("flavor") == Some(value)
    }
}

/// Units recognized on parameters and mission time.
///
/// Units are recorded and surfaced in reports; no conversion is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Units {
    #[default]
    Unitless,
    Bool,
    Int,
    Float,
    Hours,
    InverseHours,
    Years,
    InverseYears,
    Fit,
    Demands,
}

impl Units {
    /// Parse the unit vocabulary of the input format.
    pub fn parse(unit: &str) -> Option<Self> {
        match unit {
            "bool" => Some(Units::Bool),
            "int" => Some(Units::Int),
            "float" => Some(Units::Float),
            "hours" => Some(Units::Hours),
            "hours-1" => Some(Units::InverseHours),
            "years" => Some(Units::Years),
            "years-1" => Some(Units::InverseYears),
            "fit" => Some(Units::Fit),
            "demands" => Some(Units::Demands),
            _ => None,
        }
    }

    /// String form matching the input vocabulary.
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Unitless => "unitless",
            Units::Bool => "bool",
            Units::Int => "int",
            Units::Float => "float",
            Units::Hours => "hours",
            Units::InverseHours => "hours-1",
            Units::Years => "years",
            Units::InverseYears => "years-1",
            Units::Fit => "fit",
            Units::Demands => "demands",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_case_folding() {
        let id = Id::new("  PumpFailure ");
        assert_eq!(id.name, "pumpfailure");
        assert_eq!(id.orig_name, "PumpFailure");
        assert_eq!(Id::fold("PUMPfailure"), "pumpfailure");
    }

    #[test]
    fn test_meta_flavor() {
        let meta = Meta {
            label: None,
            attributes: vec![Attribute {
                name: "flavor".to_string(),
                value: "conditional".to_string(),
                type_hint: None,
            }],
        };
        assert!(meta.has_flavor("conditional"));
        assert!(!meta.has_flavor("undeveloped"));
    }

    #[test]
    fn test_units_round_trip() {
        for unit in ["hours", "hours-1", "fit", "demands"] {
            let parsed = Units::parse(unit).unwrap();
            assert_eq!(parsed.as_str(), unit);
        }
        assert!(Units::parse("furlongs").is_none());
    }
}
