use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use census::{Breakdown, FlowBreakdown, FlowVariable, Geography};

use crate::error::{PopError, Result};
use crate::fips::FipsCatalog;

pub const ESTIMATES_VINTAGES: RangeInclusive<u16> = 2015..=2023;
pub const FLOWS_YEARS: RangeInclusive<u16> = 2010..=2020;
/// Flows broken down by characteristics stop with the 2011-2015 release.
pub const FLOWS_BREAKDOWN_LAST_YEAR: u16 = 2015;

pub const DEFAULT_VINTAGE: u16 = 2023;
pub const DEFAULT_FLOWS_YEAR: u16 = 2018;

/// Column carrying the estimate in the characteristics product.
pub const CHARACTERISTICS_VALUE: &str = "POP";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Product {
    Population,
    Components,
    Characteristics,
    Housing,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::Population,
        Product::Components,
        Product::Characteristics,
        Product::Housing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Product::Population => "population",
            Product::Components => "components",
            Product::Characteristics => "characteristics",
            Product::Housing => "housing",
        }
    }

    /// Last path segment of the endpoint serving this product.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Product::Characteristics => "charagegroups",
            other => other.name(),
        }
    }

    pub fn supports(&self, geography: Geography) -> bool {
        use Geography::*;
        match self {
            Product::Population => true,
            Product::Components | Product::Characteristics => matches!(
                geography,
                Us | Region | Division | State | County | Cbsa | CombinedStatisticalArea
            ),
            Product::Housing => matches!(geography, Us | Region | Division | State | County),
        }
    }

    /// The fixed variable enumeration published for `vintage`.
    pub fn variables(&self, vintage: u16) -> &'static [&'static str] {
        let modern = vintage >= 2020;
        match (self, modern) {
            (Product::Population, false) => &["POP", "DENSITY"],
            (Product::Population, true) => &["POPESTIMATE"],
            (Product::Components, false) => &[
                "BIRTHS",
                "DEATHS",
                "NATURALINC",
                "INTERNATIONALMIG",
                "DOMESTICMIG",
                "NETMIG",
                "RESIDUAL",
                "RBIRTH",
                "RDEATH",
                "RNATURALINC",
                "RINTERNATIONALMIG",
                "RDOMESTICMIG",
                "RNETMIG",
            ],
            (Product::Components, true) => &[
                "BIRTHS",
                "DEATHS",
                "NATURALCHG",
                "INTERNATIONALMIG",
                "DOMESTICMIG",
                "NETMIG",
                "RESIDUAL",
                "RBIRTH",
                "RDEATH",
                "RNATURALCHG",
                "RINTERNATIONALMIG",
                "RDOMESTICMIG",
                "RNETMIG",
            ],
            (Product::Characteristics, _) => &[CHARACTERISTICS_VALUE],
            (Product::Housing, _) => &["HUEST"],
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Product::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown product '{s}'"))
    }
}

/// Rates per 1000 residents are named with an `R` prefix; `RESIDUAL` is a count.
pub fn is_rate_variable(name: &str) -> bool {
    name.starts_with('R') && name != "RESIDUAL"
}

/// What the normalizer needs to know about the query that produced a table.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Estimates(EstimatesShape),
    Flows(FlowsShape),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EstimatesShape {
    pub geography: Geography,
    pub product: Product,
    pub vintage: u16,
    pub variables: Vec<String>,
    pub breakdown: Vec<Breakdown>,
    pub breakdown_labels: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowsShape {
    pub geography: Geography,
    pub year: u16,
    pub variables: Vec<FlowVariable>,
    pub breakdown: Vec<FlowBreakdown>,
    pub breakdown_labels: bool,
}

/// One well-formed GET: endpoint path, ordered parameters, and the shape of the answer.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub shape: Shape,
}

impl Query {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parameters for a population estimates call.
#[derive(Clone, Debug)]
pub struct EstimatesRequest {
    pub geography: Geography,
    pub product: Product,
    pub vintage: u16,
    pub variables: Vec<String>,
    pub breakdown: Vec<Breakdown>,
    pub breakdown_labels: bool,
    pub state: Option<String>,
    pub county: Option<String>,
}

impl EstimatesRequest {
    pub fn new(geography: Geography, product: Product) -> Self {
        Self {
            geography,
            product,
            vintage: DEFAULT_VINTAGE,
            variables: Vec::new(),
            breakdown: Vec::new(),
            breakdown_labels: false,
            state: None,
            county: None,
        }
    }

    pub fn vintage(mut self, vintage: u16) -> Self {
        self.vintage = vintage;
        self
    }

    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn breakdown(mut self, breakdown: impl IntoIterator<Item = Breakdown>) -> Self {
        self.breakdown = breakdown.into_iter().collect();
        self
    }

    pub fn breakdown_labels(mut self, labels: bool) -> Self {
        self.breakdown_labels = labels;
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    pub fn build(&self, fips: &FipsCatalog) -> Result<Query> {
        if !ESTIMATES_VINTAGES.contains(&self.vintage) {
            return Err(PopError::invalid(format!(
                "vintage {} is not available; use {}-{}",
                self.vintage,
                ESTIMATES_VINTAGES.start(),
                ESTIMATES_VINTAGES.end()
            )));
        }
        if !self.product.supports(self.geography) {
            return Err(PopError::invalid(format!(
                "geography '{}' is not available for the {} product",
                self.geography, self.product
            )));
        }
        if !self.variables.is_empty() && !self.breakdown.is_empty() {
            return Err(PopError::invalid(
                "specify either variables or a breakdown, not both",
            ));
        }
        if !self.breakdown.is_empty() && self.product != Product::Characteristics {
            return Err(PopError::invalid(format!(
                "breakdown is only valid for the characteristics product, not {}",
                self.product
            )));
        }

        let known = self.product.variables(self.vintage);
        let variables: Vec<String> = if self.variables.is_empty() {
            known.iter().map(|v| v.to_string()).collect()
        } else {
            let mut variables: Vec<String> = Vec::new();
            for v in &self.variables {
                let v = v.trim().to_ascii_uppercase();
                if !known.contains(&v.as_str()) {
                    return Err(PopError::invalid(format!(
                        "'{v}' is not a {} variable for vintage {}",
                        self.product, self.vintage
                    )));
                }
                if !variables.contains(&v) {
                    variables.push(v);
                }
            }
            variables
        };
        let breakdown = dedup(&self.breakdown);

        let (for_clause, in_clause) = scope(
            self.geography,
            self.state.as_deref(),
            self.county.as_deref(),
            fips,
        )?;

        let mut get = vec!["NAME".to_string()];
        get.extend(variables.iter().cloned());
        get.extend(breakdown.iter().map(|b| b.name().to_string()));

        let mut params = vec![
            ("get".to_string(), get.join(",")),
            ("for".to_string(), for_clause),
        ];
        if let Some(in_clause) = in_clause {
            params.push(("in".to_string(), in_clause));
        }

        let query = Query {
            path: format!("{}/pep/{}", self.vintage, self.product.endpoint()),
            params,
            shape: Shape::Estimates(EstimatesShape {
                geography: self.geography,
                product: self.product,
                vintage: self.vintage,
                variables,
                breakdown,
                breakdown_labels: self.breakdown_labels,
            }),
        };
        tracing::debug!(path = %query.path, params = ?query.params, "built estimates query");
        Ok(query)
    }
}

/// Parameters for a migration flows call.
#[derive(Clone, Debug)]
pub struct FlowsRequest {
    pub geography: Geography,
    pub year: u16,
    pub variables: Vec<FlowVariable>,
    pub breakdown: Vec<FlowBreakdown>,
    pub breakdown_labels: bool,
    pub state: Option<String>,
    pub county: Option<String>,
    pub msa: Option<String>,
}

impl FlowsRequest {
    pub fn new(geography: Geography) -> Self {
        Self {
            geography,
            year: DEFAULT_FLOWS_YEAR,
            variables: Vec::new(),
            breakdown: Vec::new(),
            breakdown_labels: false,
            state: None,
            county: None,
            msa: None,
        }
    }

    pub fn year(mut self, year: u16) -> Self {
        self.year = year;
        self
    }

    pub fn variables(mut self, variables: impl IntoIterator<Item = FlowVariable>) -> Self {
        self.variables = variables.into_iter().collect();
        self
    }

    pub fn breakdown(mut self, breakdown: impl IntoIterator<Item = FlowBreakdown>) -> Self {
        self.breakdown = breakdown.into_iter().collect();
        self
    }

    pub fn breakdown_labels(mut self, labels: bool) -> Self {
        self.breakdown_labels = labels;
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    pub fn msa(mut self, msa: impl Into<String>) -> Self {
        self.msa = Some(msa.into());
        self
    }

    pub fn build(&self, fips: &FipsCatalog) -> Result<Query> {
        if !FLOWS_YEARS.contains(&self.year) {
            return Err(PopError::invalid(format!(
                "flows are not available for {}; use {}-{}",
                self.year,
                FLOWS_YEARS.start(),
                FLOWS_YEARS.end()
            )));
        }
        if !matches!(
            self.geography,
            Geography::County | Geography::CountySubdivision | Geography::Cbsa
        ) {
            return Err(PopError::invalid(format!(
                "geography '{}' is not available for flows; use county, county subdivision or cbsa",
                self.geography
            )));
        }
        if !self.variables.is_empty() && !self.breakdown.is_empty() {
            return Err(PopError::invalid(
                "specify either variables or a breakdown, not both",
            ));
        }
        if !self.breakdown.is_empty() && self.year > FLOWS_BREAKDOWN_LAST_YEAR {
            return Err(PopError::invalid(format!(
                "flows breakdowns are only available through {FLOWS_BREAKDOWN_LAST_YEAR}"
            )));
        }

        let (for_clause, in_clause) = if self.geography == Geography::Cbsa {
            if self.state.is_some() || self.county.is_some() {
                return Err(PopError::invalid(
                    "state and county filters do not apply to cbsa flows; use msa",
                ));
            }
            let msa = match self.msa.as_deref().map(str::trim) {
                Some(code) if code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit()) => code,
                Some(code) => {
                    return Err(PopError::invalid(format!(
                        "'{code}' is not a five-digit CBSA code"
                    )))
                }
                None => "*",
            };
            (format!("{}:{msa}", Geography::Cbsa.api_name()), None)
        } else {
            if self.msa.is_some() {
                return Err(PopError::invalid("msa only applies to cbsa flows"));
            }
            scope(
                self.geography,
                self.state.as_deref(),
                self.county.as_deref(),
                fips,
            )?
        };

        let variables = if self.variables.is_empty() {
            FlowVariable::ALL.to_vec()
        } else {
            // Keep the canonical MOVEDIN, MOVEDOUT, MOVEDNET order.
            FlowVariable::ALL
                .into_iter()
                .filter(|v| self.variables.contains(v))
                .collect()
        };
        let breakdown = dedup(&self.breakdown);

        let mut get: Vec<String> = ["GEOID1", "GEOID2", "FULL1_NAME", "FULL2_NAME"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for v in &variables {
            get.push(v.name().to_string());
            get.push(v.moe_column().to_string());
        }
        get.extend(breakdown.iter().map(|b| b.name().to_string()));

        let mut params = vec![
            ("get".to_string(), get.join(",")),
            ("for".to_string(), for_clause),
        ];
        if let Some(in_clause) = in_clause {
            params.push(("in".to_string(), in_clause));
        }

        let query = Query {
            path: format!("{}/acs/flows", self.year),
            params,
            shape: Shape::Flows(FlowsShape {
                geography: self.geography,
                year: self.year,
                variables,
                breakdown,
                breakdown_labels: self.breakdown_labels,
            }),
        };
        tracing::debug!(path = %query.path, params = ?query.params, "built flows query");
        Ok(query)
    }
}

fn dedup<T: PartialEq + Copy>(items: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(*item);
        }
    }
    out
}

/// Build the `for=` and optional `in=` clauses for a geography and its filters.
fn scope(
    geography: Geography,
    state: Option<&str>,
    county: Option<&str>,
    fips: &FipsCatalog,
) -> Result<(String, Option<String>)> {
    if county.is_some() && state.is_none() {
        return Err(PopError::invalid("a county filter requires a state"));
    }
    if state.is_some() && !geography.nests_in_state() {
        return Err(PopError::invalid(format!(
            "a state filter does not apply to geography '{geography}'"
        )));
    }
    if county.is_some()
        && !matches!(geography, Geography::County | Geography::CountySubdivision)
    {
        return Err(PopError::invalid(format!(
            "a county filter does not apply to geography '{geography}'"
        )));
    }
    if geography == Geography::CountySubdivision && state.is_none() {
        return Err(PopError::invalid("county subdivisions require a state"));
    }

    let state = state.map(|s| fips.resolve_state(s)).transpose()?;
    let county = match (state, county) {
        (Some(st), Some(c)) => Some(fips.resolve_county(st, c)?),
        _ => None,
    };

    let api = geography.api_name();
    let clauses = match geography {
        Geography::State => (format!("{api}:{}", state.unwrap_or("*")), None),
        Geography::County => (
            format!("{api}:{}", county.as_deref().unwrap_or("*")),
            state.map(|st| format!("state:{st}")),
        ),
        Geography::CountySubdivision | Geography::Place => {
            let in_clause = match (state, county) {
                (Some(st), Some(c)) => Some(format!("state:{st} county:{c}")),
                (Some(st), None) => Some(format!("state:{st}")),
                _ => None,
            };
            (format!("{api}:*"), in_clause)
        }
        _ => (format!("{api}:*"), None),
    };
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fips::tests::catalog;

    fn request_for(geography: Geography, product: Product) -> EstimatesRequest {
        let request = EstimatesRequest::new(geography, product);
        if geography == Geography::CountySubdivision {
            request.state("NY")
        } else {
            request
        }
    }

    #[test]
    fn test_variables_and_breakdown_conflict() {
        let fips = FipsCatalog::states_only();
        for geography in Geography::ALL {
            for product in Product::ALL {
                if !product.supports(geography) {
                    continue;
                }
                for vintage in ESTIMATES_VINTAGES {
                    let base = request_for(geography, product).vintage(vintage);
                    assert!(base.build(&fips).is_ok(), "{geography} {product} {vintage}");
                    let conflicting = base
                        .variables([product.variables(vintage)[0]])
                        .breakdown([Breakdown::Sex]);
                    assert!(
                        matches!(conflicting.build(&fips), Err(PopError::InvalidParameter(_))),
                        "{geography} {product} {vintage}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_flows_variables_and_breakdown_conflict() {
        let request = FlowsRequest::new(Geography::County)
            .year(2015)
            .variables([FlowVariable::MovedIn])
            .breakdown([FlowBreakdown::Sex]);
        assert!(matches!(
            request.build(&FipsCatalog::states_only()),
            Err(PopError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unsupported_geography() {
        let fips = FipsCatalog::states_only();
        let err = EstimatesRequest::new(Geography::Place, Product::Components)
            .build(&fips)
            .unwrap_err();
        assert!(matches!(err, PopError::InvalidParameter(_)));
        assert!(EstimatesRequest::new(Geography::Cbsa, Product::Housing)
            .build(&fips)
            .is_err());
        assert!(FlowsRequest::new(Geography::State).build(&fips).is_err());
    }

    #[test]
    fn test_vintage_and_year_ranges() {
        let fips = FipsCatalog::states_only();
        assert!(EstimatesRequest::new(Geography::State, Product::Population)
            .vintage(2010)
            .build(&fips)
            .is_err());
        assert!(FlowsRequest::new(Geography::County)
            .year(2021)
            .build(&fips)
            .is_err());
        assert!(FlowsRequest::new(Geography::County)
            .year(2018)
            .breakdown([FlowBreakdown::Age])
            .build(&fips)
            .is_err());
    }

    #[test]
    fn test_breakdown_requires_characteristics() {
        let err = EstimatesRequest::new(Geography::State, Product::Population)
            .breakdown([Breakdown::Race])
            .build(&FipsCatalog::states_only())
            .unwrap_err();
        assert!(matches!(err, PopError::InvalidParameter(_)));
    }

    #[test]
    fn test_unknown_variable() {
        let fips = FipsCatalog::states_only();
        assert!(EstimatesRequest::new(Geography::State, Product::Components)
            .vintage(2019)
            .variables(["NATURALCHG"])
            .build(&fips)
            .is_err());
        let query = EstimatesRequest::new(Geography::State, Product::Components)
            .vintage(2023)
            .variables(["naturalchg", "RNATURALCHG", "NATURALCHG"])
            .build(&fips)
            .unwrap();
        assert_eq!(query.param("get"), Some("NAME,NATURALCHG,RNATURALCHG"));
    }

    #[test]
    fn test_components_query() {
        let query = EstimatesRequest::new(Geography::State, Product::Components)
            .vintage(2023)
            .build(&FipsCatalog::states_only())
            .unwrap();
        assert_eq!(query.path, "2023/pep/components");
        assert_eq!(query.param("for"), Some("state:*"));
        assert_eq!(query.param("in"), None);
        let Shape::Estimates(shape) = &query.shape else {
            panic!("expected estimates shape");
        };
        assert_eq!(shape.variables.len(), 13);
        let rates: Vec<&String> = shape.variables.iter().filter(|v| is_rate_variable(v)).collect();
        assert_eq!(rates.len(), 6);
        assert!(rates.iter().all(|v| v.starts_with('R')));
        assert!(shape.variables.contains(&"RESIDUAL".to_string()));
    }

    #[test]
    fn test_characteristics_query() {
        let query = EstimatesRequest::new(Geography::County, Product::Characteristics)
            .vintage(2019)
            .breakdown([Breakdown::Sex, Breakdown::Hisp, Breakdown::Sex])
            .state("Texas")
            .build(&FipsCatalog::states_only())
            .unwrap();
        assert_eq!(query.path, "2019/pep/charagegroups");
        assert_eq!(query.param("get"), Some("NAME,POP,SEX,HISP"));
        assert_eq!(query.param("for"), Some("county:*"));
        assert_eq!(query.param("in"), Some("state:48"));
    }

    #[test]
    fn test_scope_filters() {
        let fips = catalog();
        let query = EstimatesRequest::new(Geography::CountySubdivision, Product::Population)
            .vintage(2019)
            .state("NY")
            .county("Westchester")
            .build(&fips)
            .unwrap();
        assert_eq!(query.param("for"), Some("county subdivision:*"));
        assert_eq!(query.param("in"), Some("state:36 county:119"));

        assert!(EstimatesRequest::new(Geography::County, Product::Population)
            .county("119")
            .build(&fips)
            .is_err());
        assert!(EstimatesRequest::new(Geography::Cbsa, Product::Population)
            .state("NY")
            .build(&fips)
            .is_err());
        assert!(EstimatesRequest::new(Geography::Place, Product::Population)
            .state("NY")
            .county("119")
            .build(&fips)
            .is_err());
        assert!(EstimatesRequest::new(Geography::CountySubdivision, Product::Population)
            .build(&fips)
            .is_err());
    }

    #[test]
    fn test_flows_query() {
        let query = FlowsRequest::new(Geography::County)
            .state("NY")
            .county("Westchester")
            .year(2018)
            .build(&catalog())
            .unwrap();
        assert_eq!(query.path, "2018/acs/flows");
        assert_eq!(
            query.param("get"),
            Some("GEOID1,GEOID2,FULL1_NAME,FULL2_NAME,MOVEDIN,MOVEDIN_M,MOVEDOUT,MOVEDOUT_M,MOVEDNET,MOVEDNET_M")
        );
        assert_eq!(query.param("for"), Some("county:119"));
        assert_eq!(query.param("in"), Some("state:36"));
    }

    #[test]
    fn test_flows_msa() {
        let fips = FipsCatalog::states_only();
        let query = FlowsRequest::new(Geography::Cbsa)
            .msa("35620")
            .variables([FlowVariable::MovedNet, FlowVariable::MovedIn])
            .build(&fips)
            .unwrap();
        assert_eq!(
            query.param("for"),
            Some("metropolitan statistical area/micropolitan statistical area:35620")
        );
        assert_eq!(
            query.param("get"),
            Some("GEOID1,GEOID2,FULL1_NAME,FULL2_NAME,MOVEDIN,MOVEDIN_M,MOVEDNET,MOVEDNET_M")
        );
        assert!(FlowsRequest::new(Geography::Cbsa).msa("NYC").build(&fips).is_err());
        assert!(FlowsRequest::new(Geography::County).msa("35620").build(&fips).is_err());
    }

    #[test]
    fn test_rate_variables() {
        assert!(is_rate_variable("RBIRTH"));
        assert!(is_rate_variable("RNETMIG"));
        assert!(!is_rate_variable("RESIDUAL"));
        assert!(!is_rate_variable("BIRTHS"));
    }
}
