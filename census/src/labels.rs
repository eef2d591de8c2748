use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fixed code-to-label table for one dimension and vintage.
#[derive(Clone, Copy, Debug)]
pub struct LabelTable {
    dimension: &'static str,
    entries: &'static [(u32, &'static str)],
}

impl LabelTable {
    pub fn dimension(&self) -> &'static str {
        self.dimension
    }

    pub fn decode(&self, code: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    pub fn encode(&self, label: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(code, _)| *code)
    }

    pub fn entries(&self) -> &'static [(u32, &'static str)] {
        self.entries
    }
}

/// Breakdown dimensions of the population estimates characteristics product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Breakdown {
    #[serde(rename = "AGEGROUP")]
    AgeGroup,
    #[serde(rename = "SEX")]
    Sex,
    #[serde(rename = "RACE")]
    Race,
    #[serde(rename = "HISP")]
    Hisp,
}

impl Breakdown {
    pub const ALL: [Breakdown; 4] = [
        Breakdown::AgeGroup,
        Breakdown::Sex,
        Breakdown::Race,
        Breakdown::Hisp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Breakdown::AgeGroup => "AGEGROUP",
            Breakdown::Sex => "SEX",
            Breakdown::Race => "RACE",
            Breakdown::Hisp => "HISP",
        }
    }

    /// Code list published for `vintage`, or `None` if the vintage is not covered.
    pub fn labels(&self, vintage: u16) -> Option<LabelTable> {
        if !PEP_LABEL_VINTAGES.contains(&vintage) {
            return None;
        }
        let entries: &'static [(u32, &'static str)] = match self {
            Breakdown::AgeGroup => PEP_AGEGROUP,
            Breakdown::Sex => PEP_SEX,
            Breakdown::Race => PEP_RACE,
            Breakdown::Hisp => PEP_HISP,
        };
        Some(LabelTable {
            dimension: self.name(),
            entries,
        })
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Breakdown {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Breakdown::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown breakdown '{s}'"))
    }
}

/// Breakdown dimensions of the migration flows endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowBreakdown {
    #[serde(rename = "AGE")]
    Age,
    #[serde(rename = "SEX")]
    Sex,
    #[serde(rename = "RACE")]
    Race,
    #[serde(rename = "HSGP")]
    Hsgp,
}

impl FlowBreakdown {
    pub const ALL: [FlowBreakdown; 4] = [
        FlowBreakdown::Age,
        FlowBreakdown::Sex,
        FlowBreakdown::Race,
        FlowBreakdown::Hsgp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowBreakdown::Age => "AGE",
            FlowBreakdown::Sex => "SEX",
            FlowBreakdown::Race => "RACE",
            FlowBreakdown::Hsgp => "HSGP",
        }
    }

    /// Code list for the five-year release ending in `year`.
    pub fn labels(&self, year: u16) -> Option<LabelTable> {
        if !FLOWS_LABEL_YEARS.contains(&year) {
            return None;
        }
        let entries: &'static [(u32, &'static str)] = match self {
            FlowBreakdown::Age => FLOWS_AGE,
            FlowBreakdown::Sex => FLOWS_SEX,
            FlowBreakdown::Race => FLOWS_RACE,
            FlowBreakdown::Hsgp => FLOWS_HSGP,
        };
        Some(LabelTable {
            dimension: self.name(),
            entries,
        })
    }
}

impl fmt::Display for FlowBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FlowBreakdown {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowBreakdown::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown flows breakdown '{s}'"))
    }
}

pub const PEP_LABEL_VINTAGES: std::ops::RangeInclusive<u16> = 2015..=2023;
pub const FLOWS_LABEL_YEARS: std::ops::RangeInclusive<u16> = 2010..=2015;

const PEP_AGEGROUP: &[(u32, &str)] = &[
    (0, "All ages"),
    (1, "Age 0 to 4 years"),
    (2, "Age 5 to 9 years"),
    (3, "Age 10 to 14 years"),
    (4, "Age 15 to 19 years"),
    (5, "Age 20 to 24 years"),
    (6, "Age 25 to 29 years"),
    (7, "Age 30 to 34 years"),
    (8, "Age 35 to 39 years"),
    (9, "Age 40 to 44 years"),
    (10, "Age 45 to 49 years"),
    (11, "Age 50 to 54 years"),
    (12, "Age 55 to 59 years"),
    (13, "Age 60 to 64 years"),
    (14, "Age 65 to 69 years"),
    (15, "Age 70 to 74 years"),
    (16, "Age 75 to 79 years"),
    (17, "Age 80 to 84 years"),
    (18, "Age 85 years and older"),
    (19, "Under 18 years"),
    (20, "5 to 13 years"),
    (21, "14 to 17 years"),
    (22, "18 to 64 years"),
    (23, "18 to 24 years"),
    (24, "25 to 44 years"),
    (25, "45 to 64 years"),
    (26, "65 years and over"),
    (27, "85 years and over"),
    (28, "16 years and over"),
    (29, "18 years and over"),
    (30, "15 to 44 years"),
    (31, "Median age"),
];

const PEP_SEX: &[(u32, &str)] = &[(0, "Both sexes"), (1, "Male"), (2, "Female")];

const PEP_RACE: &[(u32, &str)] = &[
    (0, "All races"),
    (1, "White alone"),
    (2, "Black alone"),
    (3, "American Indian and Alaska Native alone"),
    (4, "Asian alone"),
    (5, "Native Hawaiian and Other Pacific Islander alone"),
    (6, "Two or more races"),
    (7, "White alone or in combination"),
    (8, "Black alone or in combination"),
    (9, "American Indian and Alaska Native alone or in combination"),
    (10, "Asian alone or in combination"),
    (11, "Native Hawaiian and Other Pacific Islander alone or in combination"),
];

const PEP_HISP: &[(u32, &str)] = &[
    (0, "Both Hispanic Origins"),
    (1, "Non-Hispanic"),
    (2, "Hispanic"),
];

const FLOWS_AGE: &[(u32, &str)] = &[
    (0, "All ages"),
    (1, "1 to 4 years"),
    (2, "5 to 17 years"),
    (3, "18 to 19 years"),
    (4, "20 to 24 years"),
    (5, "25 to 29 years"),
    (6, "30 to 34 years"),
    (7, "35 to 39 years"),
    (8, "40 to 44 years"),
    (9, "45 to 49 years"),
    (10, "50 to 54 years"),
    (11, "55 to 59 years"),
    (12, "60 to 64 years"),
    (13, "65 to 69 years"),
    (14, "70 to 74 years"),
    (15, "75 years and over"),
];

const FLOWS_SEX: &[(u32, &str)] = &[(0, "All sexes"), (1, "Male"), (2, "Female")];

const FLOWS_RACE: &[(u32, &str)] = &[
    (0, "All races"),
    (1, "White alone"),
    (2, "Black or African American alone"),
    (3, "Asian alone"),
    (4, "Other race alone or Two or more races"),
];

const FLOWS_HSGP: &[(u32, &str)] = &[
    (0, "All Hispanic origins"),
    (1, "Hispanic or Latino"),
    (2, "Not Hispanic or Latino"),
];
