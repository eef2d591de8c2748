use std::io::Cursor;
use std::path::Path;

use polars::prelude::{CsvReader, DataFrame, SerReader};

use crate::error::{PopError, Result};

/// County reference file: `STATE,STATEFP,COUNTYFP,COUNTYNAME,CLASSFP`, no header.
pub const NATIONAL_COUNTY_URL: &str =
    "https://www2.census.gov/geo/docs/reference/codes/files/national_county.txt";

// (abbreviation, FIPS, name)
const STATES: &[(&str, &str, &str)] = &[
    ("AL", "01", "Alabama"),
    ("AK", "02", "Alaska"),
    ("AZ", "04", "Arizona"),
    ("AR", "05", "Arkansas"),
    ("CA", "06", "California"),
    ("CO", "08", "Colorado"),
    ("CT", "09", "Connecticut"),
    ("DE", "10", "Delaware"),
    ("DC", "11", "District of Columbia"),
    ("FL", "12", "Florida"),
    ("GA", "13", "Georgia"),
    ("HI", "15", "Hawaii"),
    ("ID", "16", "Idaho"),
    ("IL", "17", "Illinois"),
    ("IN", "18", "Indiana"),
    ("IA", "19", "Iowa"),
    ("KS", "20", "Kansas"),
    ("KY", "21", "Kentucky"),
    ("LA", "22", "Louisiana"),
    ("ME", "23", "Maine"),
    ("MD", "24", "Maryland"),
    ("MA", "25", "Massachusetts"),
    ("MI", "26", "Michigan"),
    ("MN", "27", "Minnesota"),
    ("MS", "28", "Mississippi"),
    ("MO", "29", "Missouri"),
    ("MT", "30", "Montana"),
    ("NE", "31", "Nebraska"),
    ("NV", "32", "Nevada"),
    ("NH", "33", "New Hampshire"),
    ("NJ", "34", "New Jersey"),
    ("NM", "35", "New Mexico"),
    ("NY", "36", "New York"),
    ("NC", "37", "North Carolina"),
    ("ND", "38", "North Dakota"),
    ("OH", "39", "Ohio"),
    ("OK", "40", "Oklahoma"),
    ("OR", "41", "Oregon"),
    ("PA", "42", "Pennsylvania"),
    ("RI", "44", "Rhode Island"),
    ("SC", "45", "South Carolina"),
    ("SD", "46", "South Dakota"),
    ("TN", "47", "Tennessee"),
    ("TX", "48", "Texas"),
    ("UT", "49", "Utah"),
    ("VT", "50", "Vermont"),
    ("VA", "51", "Virginia"),
    ("WA", "53", "Washington"),
    ("WV", "54", "West Virginia"),
    ("WI", "55", "Wisconsin"),
    ("WY", "56", "Wyoming"),
    ("PR", "72", "Puerto Rico"),
];

/// Two-digit FIPS codes of every state-level GEOID the estimates API reports.
pub fn state_codes() -> impl Iterator<Item = &'static str> {
    STATES.iter().map(|(_, fips, _)| *fips)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct County {
    pub state_fips: String,
    pub county_fips: String,
    pub name: String,
}

/// Resolves user-supplied state and county filters into FIPS codes.
#[derive(Clone, Debug, Default)]
pub struct FipsCatalog {
    counties: Vec<County>,
}

impl FipsCatalog {
    /// A catalog that only knows states; counties must be given as FIPS codes.
    pub fn states_only() -> Self {
        Self::default()
    }

    pub fn from_counties(counties: Vec<County>) -> Self {
        Self { counties }
    }

    /// Parse the contents of `national_county.txt`.
    pub fn from_national_county(data: &[u8]) -> Result<Self> {
        let df = CsvReader::new(Cursor::new(data))
            .has_header(false)
            .infer_schema(Some(0))
            .finish()?;
        Ok(Self::from_counties(counties_from_frame(&df)?))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_national_county(&std::fs::read(path)?)
    }

    /// Fetch and parse the county reference file.
    pub async fn download(url: &str) -> Result<Self> {
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PopError::UpstreamRequestFailed(format!("{url} returned {status}")));
        }
        Self::from_national_county(&response.bytes().await?)
    }

    pub fn counties(&self) -> &[County] {
        &self.counties
    }

    /// Accepts a two-digit FIPS code, a postal abbreviation or a full name.
    pub fn resolve_state(&self, state: &str) -> Result<&'static str> {
        let state = state.trim();
        STATES
            .iter()
            .find(|(abbr, fips, name)| {
                *fips == state || abbr.eq_ignore_ascii_case(state) || name.eq_ignore_ascii_case(state)
            })
            .map(|(_, fips, _)| *fips)
            .ok_or_else(|| PopError::invalid(format!("'{state}' is not a valid state")))
    }

    /// Accepts a three-digit FIPS code or a county name within `state_fips`.
    ///
    /// Names match case-insensitively, with or without the trailing
    /// "County"/"Parish"/... suffix.
    pub fn resolve_county(&self, state_fips: &str, county: &str) -> Result<String> {
        let county = county.trim();
        if county.len() == 3 && county.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(county.to_string());
        }
        if self.counties.is_empty() {
            return Err(PopError::invalid(format!(
                "county '{county}' is not a FIPS code and no county catalog is loaded"
            )));
        }

        let wanted = county.to_lowercase();
        let in_state = || self.counties.iter().filter(|c| c.state_fips == state_fips);
        let exact: Vec<&County> = in_state()
            .filter(|c| c.name.to_lowercase() == wanted)
            .collect();
        let matches = if exact.is_empty() {
            in_state()
                .filter(|c| {
                    let name = c.name.to_lowercase();
                    name.strip_prefix(&wanted)
                        .map_or(false, |rest| rest.starts_with(' '))
                })
                .collect()
        } else {
            exact
        };

        match matches.as_slice() {
            [one] => Ok(one.county_fips.clone()),
            [] => Err(PopError::invalid(format!(
                "'{county}' is not a valid county in state {state_fips}"
            ))),
            many => Err(PopError::invalid(format!(
                "'{county}' is ambiguous in state {state_fips}: {}",
                many.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

fn counties_from_frame(df: &DataFrame) -> Result<Vec<County>> {
    if df.width() < 4 {
        return Err(PopError::malformed(format!(
            "county reference file has {} columns, expected at least 4",
            df.width()
        )));
    }
    let columns = df.get_columns();
    let state_fips = columns[1].utf8()?;
    let county_fips = columns[2].utf8()?;
    let names = columns[3].utf8()?;

    let counties = state_fips
        .into_iter()
        .zip(county_fips.into_iter())
        .zip(names.into_iter())
        .filter_map(|((state, county), name)| {
            Some(County {
                state_fips: state?.trim().to_string(),
                county_fips: county?.trim().to_string(),
                name: name?.trim().to_string(),
            })
        })
        .collect();
    Ok(counties)
}
