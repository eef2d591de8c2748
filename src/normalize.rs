use std::collections::HashSet;

use census::{
    Category, CharacteristicsRecord, EstimateRecord, FlowRecord, Geography, LabelTable,
};

use crate::error::{PopError, Result};
use crate::getter::RawTable;
use crate::request::{EstimatesShape, FlowsShape, Product, CHARACTERISTICS_VALUE};

/// What to do with a breakdown code missing from the label table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownCodePolicy {
    /// Fail with `UnknownBreakdownCode`.
    #[default]
    Fail,
    /// Keep the raw code.
    PassThrough,
}

/// A normalized estimates table.
#[derive(Clone, Debug, PartialEq)]
pub enum EstimatesTable {
    Long(Vec<EstimateRecord>),
    Characteristics(Vec<CharacteristicsRecord>),
}

impl EstimatesTable {
    pub fn len(&self) -> usize {
        match self {
            EstimatesTable::Long(rows) => rows.len(),
            EstimatesTable::Characteristics(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn long(&self) -> Option<&[EstimateRecord]> {
        match self {
            EstimatesTable::Long(rows) => Some(rows),
            EstimatesTable::Characteristics(_) => None,
        }
    }

    pub fn characteristics(&self) -> Option<&[CharacteristicsRecord]> {
        match self {
            EstimatesTable::Characteristics(rows) => Some(rows),
            EstimatesTable::Long(_) => None,
        }
    }
}

// ACS annotation values standing in for "no estimate".
const ACS_ANNOTATIONS: [&str; 6] = [
    "-222222222",
    "-333333333",
    "-555555555",
    "-666666666",
    "-888888888",
    "-999999999",
];

pub fn normalize_estimates(
    raw: &RawTable,
    shape: &EstimatesShape,
    policy: UnknownCodePolicy,
) -> Result<EstimatesTable> {
    if shape.product == Product::Characteristics {
        return normalize_characteristics(raw, shape, policy).map(EstimatesTable::Characteristics);
    }
    if raw.is_empty() {
        return Ok(EstimatesTable::Long(Vec::new()));
    }

    let geoid = GeoidColumns::new(raw, shape.geography)?;
    let name = raw.column("NAME")?;
    let columns = shape
        .variables
        .iter()
        .map(|v| raw.column(v).map(|i| (v, i)))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.rows.len() * columns.len());
    for row in &raw.rows {
        let geoid = geoid.read(row)?;
        let name = required(row, name, "NAME")?;
        for (variable, i) in &columns {
            if !seen.insert((geoid.clone(), (*variable).clone())) {
                return Err(PopError::malformed(format!(
                    "duplicate row for GEOID {geoid}, variable {variable}"
                )));
            }
            records.push(EstimateRecord {
                geoid: geoid.clone(),
                name: name.to_string(),
                variable: (*variable).clone(),
                value: parse_value(row[*i].as_deref(), variable)?,
                moe: None,
            });
        }
    }
    tracing::debug!(rows = records.len(), product = %shape.product, "normalized estimates");
    Ok(EstimatesTable::Long(records))
}

fn normalize_characteristics(
    raw: &RawTable,
    shape: &EstimatesShape,
    policy: UnknownCodePolicy,
) -> Result<Vec<CharacteristicsRecord>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let geoid = GeoidColumns::new(raw, shape.geography)?;
    let name = raw.column("NAME")?;
    let value = raw.column(CHARACTERISTICS_VALUE)?;
    let dimensions = shape
        .breakdown
        .iter()
        .map(|b| raw.column(b.name()).map(|i| (*b, i, b.labels(shape.vintage))))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.rows.len());
    for row in &raw.rows {
        let geoid = geoid.read(row)?;
        let mut codes = Vec::with_capacity(dimensions.len());
        let mut categories = Vec::with_capacity(dimensions.len());
        for (breakdown, i, labels) in &dimensions {
            let code = parse_code(row[*i].as_deref(), breakdown.name())?;
            codes.push(code);
            let category = categorize(
                code,
                breakdown.name(),
                labels.as_ref(),
                shape.breakdown_labels,
                shape.vintage,
                policy,
            )?;
            categories.push((*breakdown, category));
        }
        if !seen.insert((geoid.clone(), codes)) {
            return Err(PopError::malformed(format!(
                "duplicate breakdown combination for GEOID {geoid}"
            )));
        }
        records.push(CharacteristicsRecord {
            geoid,
            name: required(row, name, "NAME")?.to_string(),
            categories,
            value: parse_value(row[value].as_deref(), CHARACTERISTICS_VALUE)?,
        });
    }
    tracing::debug!(rows = records.len(), "normalized characteristics");
    Ok(records)
}

pub fn normalize_flows(
    raw: &RawTable,
    shape: &FlowsShape,
    policy: UnknownCodePolicy,
) -> Result<Vec<FlowRecord>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let geoid1 = raw.column("GEOID1")?;
    let geoid2 = raw.column("GEOID2")?;
    let full1 = raw.column("FULL1_NAME")?;
    let full2 = raw.column("FULL2_NAME")?;
    let columns = shape
        .variables
        .iter()
        .map(|v| -> Result<_> { Ok((*v, raw.column(v.name())?, raw.column(v.moe_column())?)) })
        .collect::<Result<Vec<_>>>()?;
    let dimensions = shape
        .breakdown
        .iter()
        .map(|b| raw.column(b.name()).map(|i| (*b, i, b.labels(shape.year))))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.rows.len() * columns.len());
    for row in &raw.rows {
        let origin = required(row, geoid1, "GEOID1")?.to_string();
        let counterpart = cell(row, geoid2).map(str::to_string);
        let full1_name = required(row, full1, "FULL1_NAME")?.to_string();
        let full2_name = cell(row, full2).map(str::to_string);

        let mut codes = Vec::with_capacity(dimensions.len());
        let mut categories = Vec::with_capacity(dimensions.len());
        for (breakdown, i, labels) in &dimensions {
            let code = parse_code(row[*i].as_deref(), breakdown.name())?;
            codes.push(code);
            let category = categorize(
                code,
                breakdown.name(),
                labels.as_ref(),
                shape.breakdown_labels,
                shape.year,
                policy,
            )?;
            categories.push((*breakdown, category));
        }

        // Foreign regions have no GEOID2; their name tells them apart.
        // Rows with neither cannot be told apart, so they are not checked.
        let pair = counterpart.clone().or_else(|| full2_name.clone());

        for (variable, estimate, moe) in &columns {
            if let Some(pair) = &pair {
                if !seen.insert((origin.clone(), pair.clone(), *variable, codes.clone())) {
                    return Err(PopError::malformed(format!(
                        "duplicate flow {origin} -> {pair} for {variable}"
                    )));
                }
            }
            let mut estimate = parse_flow_value(row[*estimate].as_deref(), variable.name())?;
            let mut moe = parse_flow_value(row[*moe].as_deref(), variable.moe_column())?;
            if counterpart.is_none()
                && !variable.observable_abroad()
                && (estimate.is_some() || moe.is_some())
            {
                tracing::warn!(
                    origin = %origin,
                    counterpart = pair.as_deref().unwrap_or("abroad"),
                    variable = %variable,
                    "dropping value with no US counterpart"
                );
                estimate = None;
                moe = None;
            }
            records.push(FlowRecord {
                geoid1: origin.clone(),
                full1_name: full1_name.clone(),
                geoid2: counterpart.clone(),
                full2_name: full2_name.clone(),
                variable: *variable,
                estimate,
                moe,
                categories: categories.clone(),
            });
        }
    }
    tracing::debug!(rows = records.len(), "normalized flows");
    Ok(records)
}

/// Response columns that concatenate into a GEOID.
struct GeoidColumns(Vec<(usize, &'static str)>);

impl GeoidColumns {
    fn new(raw: &RawTable, geography: Geography) -> Result<Self> {
        geography
            .geoid_columns()
            .iter()
            .map(|name| raw.column(name).map(|i| (i, *name)))
            .collect::<Result<Vec<_>>>()
            .map(GeoidColumns)
    }

    fn read(&self, row: &[Option<String>]) -> Result<String> {
        let mut geoid = String::new();
        for (i, name) in &self.0 {
            geoid.push_str(required(row, *i, name)?);
        }
        Ok(geoid)
    }
}

fn cell(row: &[Option<String>], i: usize) -> Option<&str> {
    row[i].as_deref().filter(|s| !s.trim().is_empty())
}

fn required<'a>(row: &'a [Option<String>], i: usize, column: &str) -> Result<&'a str> {
    cell(row, i).ok_or_else(|| PopError::malformed(format!("null {column}")))
}

fn parse_value(cell: Option<&str>, column: &str) -> Result<Option<f64>> {
    match cell.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| PopError::malformed(format!("'{text}' in {column} is not a number"))),
    }
}

fn parse_flow_value(cell: Option<&str>, column: &str) -> Result<Option<f64>> {
    match cell.map(str::trim) {
        Some(text) if ACS_ANNOTATIONS.contains(&text) => Ok(None),
        other => parse_value(other, column),
    }
}

fn parse_code(cell: Option<&str>, dimension: &str) -> Result<u32> {
    let text = cell
        .map(str::trim)
        .ok_or_else(|| PopError::malformed(format!("null {dimension}")))?;
    text.parse()
        .map_err(|_| PopError::malformed(format!("'{text}' is not a {dimension} code")))
}

fn categorize(
    code: u32,
    dimension: &str,
    labels: Option<&LabelTable>,
    decode: bool,
    vintage: u16,
    policy: UnknownCodePolicy,
) -> Result<Category> {
    if !decode {
        return Ok(Category::Code(code));
    }
    match (labels.and_then(|t| t.decode(code)), policy) {
        (Some(label), _) => Ok(Category::Label(label.to_string())),
        (None, UnknownCodePolicy::PassThrough) => Ok(Category::Code(code)),
        (None, UnknownCodePolicy::Fail) => Err(PopError::UnknownBreakdownCode {
            dimension: dimension.to_string(),
            code,
            vintage,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use census::{Breakdown, FlowBreakdown, FlowVariable};

    fn raw(headers: &[&str], rows: &[&[Option<&str>]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        )
    }

    fn estimates_shape(product: Product, variables: &[&str]) -> EstimatesShape {
        EstimatesShape {
            geography: Geography::County,
            product,
            vintage: 2019,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            breakdown: Vec::new(),
            breakdown_labels: false,
        }
    }

    fn characteristics_shape(breakdown: &[Breakdown], labels: bool) -> EstimatesShape {
        EstimatesShape {
            breakdown: breakdown.to_vec(),
            breakdown_labels: labels,
            ..estimates_shape(Product::Characteristics, &["POP"])
        }
    }

    fn flows_shape() -> FlowsShape {
        FlowsShape {
            geography: Geography::County,
            year: 2018,
            variables: FlowVariable::ALL.to_vec(),
            breakdown: Vec::new(),
            breakdown_labels: false,
        }
    }

    const FLOW_HEADERS: &[&str] = &[
        "GEOID1", "GEOID2", "FULL1_NAME", "FULL2_NAME", "MOVEDIN", "MOVEDIN_M", "MOVEDOUT",
        "MOVEDOUT_M", "MOVEDNET", "MOVEDNET_M", "state", "county",
    ];

    #[test]
    fn test_long_estimates() {
        let table = raw(
            &["NAME", "POP", "DENSITY", "state", "county"],
            &[
                &[Some("Autauga County, Alabama"), Some("55869"), Some("93.9"), Some("01"), Some("001")],
                &[Some("Baldwin County, Alabama"), Some("223234"), None, Some("01"), Some("003")],
            ],
        );
        let shape = estimates_shape(Product::Population, &["POP", "DENSITY"]);
        let out = normalize_estimates(&table, &shape, UnknownCodePolicy::Fail).unwrap();
        let rows = out.long().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].geoid, "01001");
        assert_eq!(rows[0].variable, "POP");
        assert_eq!(rows[0].value, Some(55869.0));
        assert_eq!(rows[1].variable, "DENSITY");
        assert_eq!(rows[3].value, None);
        assert!(rows.iter().all(|r| r.moe.is_none()));

        let pairs: HashSet<_> = rows.iter().map(|r| (&r.geoid, &r.variable)).collect();
        assert_eq!(pairs.len(), rows.len());
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let table = raw(
            &["NAME", "HUEST", "state", "county"],
            &[
                &[Some("Autauga County, Alabama"), Some("24010"), Some("01"), Some("001")],
                &[Some("Autauga County, Alabama"), Some("24010"), Some("01"), Some("001")],
            ],
        );
        let shape = estimates_shape(Product::Housing, &["HUEST"]);
        assert!(matches!(
            normalize_estimates(&table, &shape, UnknownCodePolicy::Fail),
            Err(PopError::UpstreamRequestFailed(_))
        ));
    }

    #[test]
    fn test_missing_column_and_bad_number() {
        let shape = estimates_shape(Product::Housing, &["HUEST"]);
        let missing = raw(&["NAME", "state", "county"], &[&[Some("x"), Some("01"), Some("001")]]);
        assert!(normalize_estimates(&missing, &shape, UnknownCodePolicy::Fail).is_err());

        let bad = raw(
            &["NAME", "HUEST", "state", "county"],
            &[&[Some("x"), Some("lots"), Some("01"), Some("001")]],
        );
        assert!(matches!(
            normalize_estimates(&bad, &shape, UnknownCodePolicy::Fail),
            Err(PopError::UpstreamRequestFailed(_))
        ));
    }

    #[test]
    fn test_empty_table() {
        let shape = estimates_shape(Product::Population, &["POP"]);
        let out = normalize_estimates(&RawTable::default(), &shape, UnknownCodePolicy::Fail).unwrap();
        assert!(out.is_empty());
        assert!(normalize_flows(&RawTable::default(), &flows_shape(), UnknownCodePolicy::Fail)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_characteristics_codes_and_labels() {
        let table = raw(
            &["NAME", "POP", "SEX", "HISP", "state", "county"],
            &[
                &[Some("Kings County, New York"), Some("2559903"), Some("0"), Some("0"), Some("36"), Some("047")],
                &[Some("Kings County, New York"), Some("1213034"), Some("1"), Some("2"), Some("36"), Some("047")],
            ],
        );

        let coded = characteristics_shape(&[Breakdown::Sex, Breakdown::Hisp], false);
        let out = normalize_estimates(&table, &coded, UnknownCodePolicy::Fail).unwrap();
        let rows = out.characteristics().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].geoid, "36047");
        assert_eq!(rows[1].category(Breakdown::Sex), Some(&Category::Code(1)));
        assert_eq!(rows[1].value, Some(1213034.0));

        let labelled = characteristics_shape(&[Breakdown::Sex, Breakdown::Hisp], true);
        let out = normalize_estimates(&table, &labelled, UnknownCodePolicy::Fail).unwrap();
        let rows = out.characteristics().unwrap();
        assert_eq!(
            rows[0].category(Breakdown::Sex),
            Some(&Category::Label("Both sexes".to_string()))
        );
        assert_eq!(
            rows[1].category(Breakdown::Hisp),
            Some(&Category::Label("Hispanic".to_string()))
        );
        assert_eq!(rows[1].category(Breakdown::Race), None);
    }

    #[test]
    fn test_unknown_code_policy() {
        let table = raw(
            &["NAME", "POP", "RACE", "state", "county"],
            &[&[Some("Kings County, New York"), Some("12"), Some("42"), Some("36"), Some("047")]],
        );
        let shape = characteristics_shape(&[Breakdown::Race], true);

        let err = normalize_estimates(&table, &shape, UnknownCodePolicy::Fail).unwrap_err();
        match err {
            PopError::UnknownBreakdownCode { dimension, code, vintage } => {
                assert_eq!(dimension, "RACE");
                assert_eq!(code, 42);
                assert_eq!(vintage, 2019);
            }
            other => panic!("unexpected error: {other}"),
        }

        let out = normalize_estimates(&table, &shape, UnknownCodePolicy::PassThrough).unwrap();
        assert_eq!(
            out.characteristics().unwrap()[0].category(Breakdown::Race),
            Some(&Category::Code(42))
        );
    }

    #[test]
    fn test_flows_abroad_rows() {
        let table = raw(
            FLOW_HEADERS,
            &[
                &[
                    Some("36119"), Some("36005"), Some("Westchester County, New York"),
                    Some("Bronx County, New York"), Some("10462"), Some("1034"), Some("3163"),
                    Some("431"), Some("7299"), Some("1103"), Some("36"), Some("119"),
                ],
                &[
                    Some("36119"), None, Some("Westchester County, New York"), Some("Asia"),
                    Some("3010"), Some("454"), None, None, None, None, Some("36"), Some("119"),
                ],
                &[
                    Some("36119"), None, Some("Westchester County, New York"), Some("Europe"),
                    Some("1433"), Some("300"), Some("12"), Some("5"), Some("1421"), None,
                    Some("36"), Some("119"),
                ],
            ],
        );
        let rows = normalize_flows(&table, &flows_shape(), UnknownCodePolicy::Fail).unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[2].variable, FlowVariable::MovedNet);
        assert_eq!(rows[2].estimate, Some(7299.0));
        assert_eq!(rows[2].moe, Some(1103.0));

        for row in rows.iter().filter(|r| r.geoid2.is_none()) {
            if row.variable != FlowVariable::MovedIn {
                assert_eq!(row.estimate, None);
                assert_eq!(row.moe, None);
            }
        }
        assert_eq!(rows[6].full2_name.as_deref(), Some("Europe"));
        assert_eq!(rows[6].estimate, Some(1433.0));
    }

    #[test]
    fn test_flows_annotations_and_duplicates() {
        let row: &[Option<&str>] = &[
            Some("36119"), Some("36047"), Some("Westchester County, New York"),
            Some("Kings County, New York"), Some("-666666666"), Some("-222222222"), Some("0"),
            Some("13"), Some("0"), Some("13"), Some("36"), Some("119"),
        ];
        let rows = normalize_flows(&raw(FLOW_HEADERS, &[row]), &flows_shape(), UnknownCodePolicy::Fail)
            .unwrap();
        assert_eq!(rows[0].estimate, None);
        assert_eq!(rows[0].moe, None);
        assert_eq!(rows[1].estimate, Some(0.0));

        assert!(normalize_flows(
            &raw(FLOW_HEADERS, &[row, row]),
            &flows_shape(),
            UnknownCodePolicy::Fail
        )
        .is_err());
    }

    #[test]
    fn test_flows_unnamed_abroad_rows() {
        let row: &[Option<&str>] = &[
            Some("36119"), None, Some("Westchester County, New York"), None, Some("120"),
            Some("80"), None, None, None, None, Some("36"), Some("119"),
        ];
        let rows = normalize_flows(&raw(FLOW_HEADERS, &[row, row]), &flows_shape(), UnknownCodePolicy::Fail)
            .unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.geoid2.is_none() && r.full2_name.is_none()));
        assert_eq!(rows[3].estimate, Some(120.0));
    }

    #[test]
    fn test_flows_breakdown_labels() {
        let mut headers = FLOW_HEADERS.to_vec();
        headers.push("SEX");
        let table = raw(
            &headers,
            &[
                &[
                    Some("36119"), Some("36005"), Some("Westchester County, New York"),
                    Some("Bronx County, New York"), Some("5000"), Some("600"), Some("1500"),
                    Some("200"), Some("3500"), Some("650"), Some("36"), Some("119"), Some("01"),
                ],
                &[
                    Some("36119"), Some("36005"), Some("Westchester County, New York"),
                    Some("Bronx County, New York"), Some("5462"), Some("700"), Some("1663"),
                    Some("231"), Some("3799"), Some("703"), Some("36"), Some("119"), Some("02"),
                ],
            ],
        );
        let shape = FlowsShape {
            year: 2015,
            breakdown: vec![FlowBreakdown::Sex],
            breakdown_labels: true,
            ..flows_shape()
        };
        let rows = normalize_flows(&table, &shape, UnknownCodePolicy::Fail).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[0].categories,
            vec![(FlowBreakdown::Sex, Category::Label("Male".to_string()))]
        );
        assert_eq!(
            rows[5].categories,
            vec![(FlowBreakdown::Sex, Category::Label("Female".to_string()))]
        );
    }
}
