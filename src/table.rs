use std::collections::{HashMap, HashSet};
use std::path::Path;

use census::{Category, CharacteristicsRecord, EstimateRecord, FlowRecord};
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, SerWriter, Series};

use crate::error::Result;
use crate::normalize::EstimatesTable;

/// Long schema: GEOID, NAME, variable, value, moe.
pub fn estimates_frame(rows: &[EstimateRecord]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("GEOID", rows.iter().map(|r| r.geoid.as_str()).collect::<Vec<_>>()),
        Series::new("NAME", rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()),
        Series::new("variable", rows.iter().map(|r| r.variable.as_str()).collect::<Vec<_>>()),
        Series::new("value", rows.iter().map(|r| r.value).collect::<Vec<_>>()),
        Series::new("moe", rows.iter().map(|r| r.moe).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

/// One row per GEOID, one column per variable, in first-seen order.
pub fn wide_frame(rows: &[EstimateRecord]) -> Result<DataFrame> {
    let mut geoids: Vec<(&str, &str)> = Vec::new();
    let mut seen_geoids: HashSet<&str> = HashSet::new();
    let mut variables: Vec<&str> = Vec::new();
    let mut seen_variables: HashSet<&str> = HashSet::new();
    let mut cells: HashMap<(&str, &str), Option<f64>> = HashMap::with_capacity(rows.len());
    for row in rows {
        if seen_geoids.insert(row.geoid.as_str()) {
            geoids.push((row.geoid.as_str(), row.name.as_str()));
        }
        if seen_variables.insert(row.variable.as_str()) {
            variables.push(row.variable.as_str());
        }
        cells.insert((row.geoid.as_str(), row.variable.as_str()), row.value);
    }

    let mut columns = vec![
        Series::new("GEOID", geoids.iter().map(|(g, _)| *g).collect::<Vec<_>>()),
        Series::new("NAME", geoids.iter().map(|(_, n)| *n).collect::<Vec<_>>()),
    ];
    for variable in &variables {
        let values: Vec<Option<f64>> = geoids
            .iter()
            .map(|(geoid, _)| cells.get(&(*geoid, *variable)).copied().flatten())
            .collect();
        columns.push(Series::new(variable, values));
    }
    Ok(DataFrame::new(columns)?)
}

/// A dimension's column: integers while every value is a code, text otherwise.
fn category_series<'a>(name: &str, categories: impl Iterator<Item = Option<&'a Category>>) -> Series {
    let categories: Vec<Option<&Category>> = categories.collect();
    if categories.iter().flatten().all(|c| matches!(c, Category::Code(_))) {
        let codes: Vec<Option<u32>> = categories
            .iter()
            .map(|c| match c {
                Some(Category::Code(code)) => Some(*code),
                _ => None,
            })
            .collect();
        Series::new(name, codes)
    } else {
        let labels: Vec<Option<String>> = categories
            .iter()
            .map(|c| c.map(|c| c.to_string()))
            .collect();
        Series::new(name, labels)
    }
}

/// Wide-by-breakdown schema: GEOID, NAME, one column per dimension, value.
pub fn characteristics_frame(rows: &[CharacteristicsRecord]) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new("GEOID", rows.iter().map(|r| r.geoid.as_str()).collect::<Vec<_>>()),
        Series::new("NAME", rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()),
    ];
    if let Some(first) = rows.first() {
        for (breakdown, _) in &first.categories {
            columns.push(category_series(
                breakdown.name(),
                rows.iter().map(|r| r.category(*breakdown)),
            ));
        }
    }
    columns.push(Series::new("value", rows.iter().map(|r| r.value).collect::<Vec<_>>()));
    Ok(DataFrame::new(columns)?)
}

/// Long flows schema with any breakdown dimensions appended.
pub fn flows_frame(rows: &[FlowRecord]) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new("GEOID1", rows.iter().map(|r| r.geoid1.as_str()).collect::<Vec<_>>()),
        Series::new("GEOID2", rows.iter().map(|r| r.geoid2.as_deref()).collect::<Vec<_>>()),
        Series::new("FULL1_NAME", rows.iter().map(|r| r.full1_name.as_str()).collect::<Vec<_>>()),
        Series::new("FULL2_NAME", rows.iter().map(|r| r.full2_name.as_deref()).collect::<Vec<_>>()),
        Series::new("variable", rows.iter().map(|r| r.variable.name()).collect::<Vec<_>>()),
        Series::new("estimate", rows.iter().map(|r| r.estimate).collect::<Vec<_>>()),
        Series::new("moe", rows.iter().map(|r| r.moe).collect::<Vec<_>>()),
    ];
    if let Some(first) = rows.first() {
        for (breakdown, _) in &first.categories {
            columns.push(category_series(
                breakdown.name(),
                rows.iter().map(|r| {
                    r.categories
                        .iter()
                        .find(|(b, _)| b == breakdown)
                        .map(|(_, c)| c)
                }),
            ));
        }
    }
    Ok(DataFrame::new(columns)?)
}

/// Frame for a normalized estimates table; `wide` pivots long tables by variable.
pub fn table_frame(table: &EstimatesTable, wide: bool) -> Result<DataFrame> {
    match table {
        EstimatesTable::Long(rows) if wide => wide_frame(rows),
        EstimatesTable::Long(rows) => estimates_frame(rows),
        EstimatesTable::Characteristics(rows) => characteristics_frame(rows),
    }
}

pub fn write_csv(path: impl AsRef<Path>, df: &mut DataFrame) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use census::{Breakdown, FlowBreakdown, FlowVariable};

    fn estimate(geoid: &str, variable: &str, value: Option<f64>) -> EstimateRecord {
        EstimateRecord {
            geoid: geoid.to_string(),
            name: format!("State {geoid}"),
            variable: variable.to_string(),
            value,
            moe: None,
        }
    }

    #[test]
    fn test_estimates_frame() {
        let rows = vec![
            estimate("01", "BIRTHS", Some(57761.0)),
            estimate("01", "RBIRTH", Some(11.8)),
            estimate("02", "BIRTHS", None),
        ];
        let df = estimates_frame(&rows).unwrap();
        assert_eq!(df.shape(), (3, 5));
        assert_eq!(df.get_column_names(), vec!["GEOID", "NAME", "variable", "value", "moe"]);
        assert_eq!(df.column("value").unwrap().f64().unwrap().get(1), Some(11.8));
        assert_eq!(df.column("moe").unwrap().null_count(), 3);
    }

    #[test]
    fn test_wide_frame() {
        let rows = vec![
            estimate("01", "BIRTHS", Some(57761.0)),
            estimate("01", "RBIRTH", Some(11.8)),
            estimate("02", "RBIRTH", Some(13.2)),
        ];
        let df = table_frame(&EstimatesTable::Long(rows), true).unwrap();
        assert_eq!(df.get_column_names(), vec!["GEOID", "NAME", "BIRTHS", "RBIRTH"]);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("BIRTHS").unwrap().f64().unwrap().get(1), None);
        assert_eq!(df.column("RBIRTH").unwrap().f64().unwrap().get(1), Some(13.2));
    }

    #[test]
    fn test_wide_frame_alignment() {
        let mut rows = Vec::new();
        for i in 0..500 {
            let geoid = format!("{i:05}");
            rows.push(estimate(&geoid, "NPOPCHG", Some(i as f64)));
        }
        // Second variable arrives in reverse GEOID order, with one gap.
        for i in (1..500).rev() {
            let geoid = format!("{i:05}");
            rows.push(estimate(&geoid, "BIRTHS", Some(i as f64 * 10.0)));
        }
        let df = wide_frame(&rows).unwrap();
        assert_eq!(df.get_column_names(), vec!["GEOID", "NAME", "NPOPCHG", "BIRTHS"]);
        assert_eq!(df.height(), 500);

        let geoids = df.column("GEOID").unwrap().utf8().unwrap();
        let names = df.column("NAME").unwrap().utf8().unwrap();
        let births = df.column("BIRTHS").unwrap().f64().unwrap();
        assert_eq!(geoids.get(0), Some("00000"));
        assert_eq!(births.get(0), None);
        assert_eq!(geoids.get(321), Some("00321"));
        assert_eq!(names.get(321), Some("State 00321"));
        assert_eq!(births.get(321), Some(3210.0));
        assert_eq!(df.column("NPOPCHG").unwrap().f64().unwrap().get(321), Some(321.0));
    }

    #[test]
    fn test_characteristics_frame() {
        let row = |sex: Category, value: f64| CharacteristicsRecord {
            geoid: "36047".to_string(),
            name: "Kings County, New York".to_string(),
            categories: vec![(Breakdown::Sex, sex)],
            value: Some(value),
        };

        let coded = vec![row(Category::Code(1), 10.0), row(Category::Code(2), 11.0)];
        let df = characteristics_frame(&coded).unwrap();
        assert_eq!(df.get_column_names(), vec!["GEOID", "NAME", "SEX", "value"]);
        assert_eq!(df.column("SEX").unwrap().u32().unwrap().get(1), Some(2));

        let labelled = vec![
            row(Category::Label("Male".to_string()), 10.0),
            row(Category::Code(9), 11.0),
        ];
        let df = characteristics_frame(&labelled).unwrap();
        let sex = df.column("SEX").unwrap().utf8().unwrap();
        assert_eq!(sex.get(0), Some("Male"));
        assert_eq!(sex.get(1), Some("9"));
    }

    #[test]
    fn test_flows_frame() {
        let rows = vec![FlowRecord {
            geoid1: "36119".to_string(),
            full1_name: "Westchester County, New York".to_string(),
            geoid2: None,
            full2_name: Some("Asia".to_string()),
            variable: FlowVariable::MovedIn,
            estimate: Some(3010.0),
            moe: Some(454.0),
            categories: vec![(FlowBreakdown::Age, Category::Code(4))],
        }];
        let df = flows_frame(&rows).unwrap();
        assert_eq!(df.width(), 8);
        assert_eq!(df.column("GEOID2").unwrap().null_count(), 1);
        assert_eq!(df.column("variable").unwrap().utf8().unwrap().get(0), Some("MOVEDIN"));
        assert_eq!(df.column("AGE").unwrap().u32().unwrap().get(0), Some(4));
    }

    #[test]
    fn test_write_csv() {
        let mut df = estimates_frame(&[estimate("01", "POP", Some(4903185.0))]).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        write_csv(file.path(), &mut df).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("GEOID,NAME,variable,value,moe"));
        assert!(text.contains("01,State 01,POP,"));
    }
}
