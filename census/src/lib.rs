use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod labels;

pub use labels::{Breakdown, FlowBreakdown, LabelTable};

/// Geographic summary levels understood by the estimates and flows endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geography {
    Us,
    Region,
    Division,
    State,
    County,
    CountySubdivision,
    // Metropolitan/micropolitan statistical area; the MSA level for flows.
    Cbsa,
    CombinedStatisticalArea,
    Place,
}

impl Geography {
    pub const ALL: [Geography; 9] = [
        Geography::Us,
        Geography::Region,
        Geography::Division,
        Geography::State,
        Geography::County,
        Geography::CountySubdivision,
        Geography::Cbsa,
        Geography::CombinedStatisticalArea,
        Geography::Place,
    ];

    /// Predicate name used in the `for=` clause of an API call.
    pub fn api_name(&self) -> &'static str {
        match self {
            Geography::Us => "us",
            Geography::Region => "region",
            Geography::Division => "division",
            Geography::State => "state",
            Geography::County => "county",
            Geography::CountySubdivision => "county subdivision",
            Geography::Cbsa => "metropolitan statistical area/micropolitan statistical area",
            Geography::CombinedStatisticalArea => "combined statistical area",
            Geography::Place => "place",
        }
    }

    /// Short name, as accepted by `FromStr`.
    pub fn short_name(&self) -> &'static str {
        match self {
            Geography::Us => "us",
            Geography::Region => "region",
            Geography::Division => "division",
            Geography::State => "state",
            Geography::County => "county",
            Geography::CountySubdivision => "county subdivision",
            Geography::Cbsa => "cbsa",
            Geography::CombinedStatisticalArea => "combined statistical area",
            Geography::Place => "place",
        }
    }

    /// Response columns whose concatenation, in order, forms the GEOID.
    pub fn geoid_columns(&self) -> &'static [&'static str] {
        match self {
            Geography::Us => &["us"],
            Geography::Region => &["region"],
            Geography::Division => &["division"],
            Geography::State => &["state"],
            Geography::County => &["state", "county"],
            Geography::CountySubdivision => &["state", "county", "county subdivision"],
            Geography::Cbsa => &["metropolitan statistical area/micropolitan statistical area"],
            Geography::CombinedStatisticalArea => &["combined statistical area"],
            Geography::Place => &["state", "place"],
        }
    }

    /// Whether the level nests inside states, so a `state` filter makes sense.
    pub fn nests_in_state(&self) -> bool {
        matches!(
            self,
            Geography::State | Geography::County | Geography::CountySubdivision | Geography::Place
        )
    }
}

impl fmt::Display for Geography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Geography {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let geography = match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "us" | "nation" => Geography::Us,
            "region" => Geography::Region,
            "division" => Geography::Division,
            "state" => Geography::State,
            "county" => Geography::County,
            "county subdivision" | "cousub" => Geography::CountySubdivision,
            "cbsa" | "msa" | "metropolitan statistical area" => Geography::Cbsa,
            "combined statistical area" | "csa" => Geography::CombinedStatisticalArea,
            "place" => Geography::Place,
            other => return Err(format!("unknown geography '{other}'")),
        };
        Ok(geography)
    }
}

/// A breakdown category: the provider's raw code, or its decoded label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Code(u32),
    Label(String),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Code(code) => write!(f, "{code}"),
            Category::Label(label) => f.write_str(label),
        }
    }
}

/// One geography × variable estimate, long form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    #[serde(rename = "GEOID")]
    pub geoid: String,
    #[serde(rename = "NAME")]
    pub name: String,
    pub variable: String,
    pub value: Option<f64>,
    // Population estimates carry no margin of error.
    pub moe: Option<f64>,
}

/// One geography × breakdown combination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicsRecord {
    #[serde(rename = "GEOID")]
    pub geoid: String,
    #[serde(rename = "NAME")]
    pub name: String,
    pub categories: Vec<(Breakdown, Category)>,
    pub value: Option<f64>,
}

impl CharacteristicsRecord {
    pub fn category(&self, breakdown: Breakdown) -> Option<&Category> {
        self.categories
            .iter()
            .find(|(b, _)| *b == breakdown)
            .map(|(_, c)| c)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowVariable {
    #[serde(rename = "MOVEDIN")]
    MovedIn,
    #[serde(rename = "MOVEDOUT")]
    MovedOut,
    // MOVEDIN - MOVEDOUT, as published.
    #[serde(rename = "MOVEDNET")]
    MovedNet,
}

impl FlowVariable {
    pub const ALL: [FlowVariable; 3] = [
        FlowVariable::MovedIn,
        FlowVariable::MovedOut,
        FlowVariable::MovedNet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowVariable::MovedIn => "MOVEDIN",
            FlowVariable::MovedOut => "MOVEDOUT",
            FlowVariable::MovedNet => "MOVEDNET",
        }
    }

    /// Column holding the margin of error for this variable.
    pub fn moe_column(&self) -> &'static str {
        match self {
            FlowVariable::MovedIn => "MOVEDIN_M",
            FlowVariable::MovedOut => "MOVEDOUT_M",
            FlowVariable::MovedNet => "MOVEDNET_M",
        }
    }

    /// Only inflow is observable from a counterpart outside the US.
    pub fn observable_abroad(&self) -> bool {
        matches!(self, FlowVariable::MovedIn)
    }
}

impl FromStr for FlowVariable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowVariable::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown flows variable '{s}'"))
    }
}

impl fmt::Display for FlowVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A migration flow between the focal geography and a counterpart.
///
/// `geoid2` is `None` when the counterpart is a region outside the US
/// ("Asia", "Europe", ...). Outflow to those regions is not surveyed, so
/// such records never carry MOVEDOUT or MOVEDNET estimates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(rename = "GEOID1")]
    pub geoid1: String,
    #[serde(rename = "FULL1_NAME")]
    pub full1_name: String,
    #[serde(rename = "GEOID2")]
    pub geoid2: Option<String>,
    #[serde(rename = "FULL2_NAME")]
    pub full2_name: Option<String>,
    pub variable: FlowVariable,
    pub estimate: Option<f64>,
    pub moe: Option<f64>,
    pub categories: Vec<(FlowBreakdown, Category)>,
}

impl FlowRecord {
    pub fn is_abroad(&self) -> bool {
        self.geoid2.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geography_from_str() {
        assert_eq!("County".parse::<Geography>().unwrap(), Geography::County);
        assert_eq!("msa".parse::<Geography>().unwrap(), Geography::Cbsa);
        assert_eq!(
            "county_subdivision".parse::<Geography>().unwrap(),
            Geography::CountySubdivision
        );
        assert!("tract".parse::<Geography>().is_err());
        for geography in Geography::ALL {
            assert_eq!(geography.short_name().parse::<Geography>().unwrap(), geography);
        }
    }

    #[test]
    fn test_geoid_columns() {
        assert_eq!(Geography::County.geoid_columns(), &["state", "county"]);
        assert_eq!(Geography::Place.geoid_columns(), &["state", "place"]);
        assert_eq!(
            Geography::Cbsa.geoid_columns(),
            &["metropolitan statistical area/micropolitan statistical area"]
        );
        assert_eq!(
            Geography::CombinedStatisticalArea.geoid_columns(),
            &["combined statistical area"]
        );
    }

    #[test]
    fn test_flow_variable_parse() {
        assert_eq!("movednet".parse::<FlowVariable>().unwrap(), FlowVariable::MovedNet);
        assert!("MOVED".parse::<FlowVariable>().is_err());
        assert!(FlowVariable::MovedIn.observable_abroad());
        assert!(!FlowVariable::MovedOut.observable_abroad());
    }
}
