use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PopError, Result};
use crate::request::Query;

/// Raw tabular response: a header row plus rows of nullable cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, or a malformed-response error naming it.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PopError::malformed(format!("missing column '{name}'")))
    }

    /// Parse the API's JSON body: an array of arrays whose first row is the header.
    ///
    /// Cells may be strings, numbers or null.
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        let Value::Array(mut rows) = value else {
            return Err(PopError::malformed("body is not a JSON array"));
        };
        if rows.is_empty() {
            return Ok(Self::default());
        }

        let headers = match rows.remove(0) {
            Value::Array(cells) => cells
                .into_iter()
                .map(|cell| match cell {
                    Value::String(s) => Ok(s),
                    other => Err(PopError::malformed(format!("header cell {other} is not a string"))),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(PopError::malformed("header row is not an array")),
        };

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let Value::Array(cells) = row else {
                    return Err(PopError::malformed(format!("row {} is not an array", i + 1)));
                };
                if cells.len() != headers.len() {
                    return Err(PopError::malformed(format!(
                        "row {} has {} cells, header has {}",
                        i + 1,
                        cells.len(),
                        headers.len()
                    )));
                }
                Ok(cells.into_iter().map(cell_text).collect())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { headers, rows })
    }
}

fn cell_text(cell: Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Fetches one table for a built query.
#[async_trait]
pub trait Getter {
    async fn fetch(&self, query: &Query) -> Result<RawTable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let body = r#"[["NAME","POP","state"],["Alabama","4903185","01"],["Alaska",731545,"02"],["Nowhere",null,"99"]]"#;
        let table = RawTable::from_json(body).unwrap();
        assert_eq!(table.headers, vec!["NAME", "POP", "state"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1][1].as_deref(), Some("731545"));
        assert_eq!(table.rows[2][1], None);
        assert_eq!(table.column("state").unwrap(), 2);
        assert!(table.column("county").is_err());
    }

    #[test]
    fn test_from_json_empty() {
        assert!(RawTable::from_json("[]").unwrap().is_empty());
    }

    #[test]
    fn test_from_json_malformed() {
        for body in [
            r#"{"error": "unknown variable"}"#,
            r#"[["NAME","POP"],["Alabama"]]"#,
            r#"[[1,2],["a","b"]]"#,
            "error: unknown variable 'FOO'",
        ] {
            assert!(
                matches!(RawTable::from_json(body), Err(PopError::UpstreamRequestFailed(_))),
                "{body}"
            );
        }
    }
}
