use serde_json::{Number, Value};
use std::{collections::HashMap, fs, path::Path};

use crate::{
    encoding::Encoding,
    error::{MergeError, Result},
};

/// Cell spellings treated as missing, compared after trimming.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A decoded CSV file with normalized headers and typed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Reads `path` with the first encoding that both decodes the bytes and
/// yields a well-formed table.
pub fn read_csv<P: AsRef<Path>>(path: P, encodings: &[Encoding]) -> Result<(CsvTable, Encoding)> {
    let bytes = fs::read(path)?;
    let mut last_err = None;

    for &encoding in encodings {
        match encoding.decode(&bytes).and_then(|text| parse_table(&text)) {
            Ok(table) => return Ok((table, encoding)),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| MergeError::Config("no encodings configured".to_owned())))
}

pub fn parse_table(text: &str) -> Result<CsvTable> {
    // The CSV reader is buffered and skips blank lines on its own.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_headers = rdr.headers()?.clone();
    if raw_headers.is_empty() {
        return Err(MergeError::MissingHeader);
    }

    let headers: Vec<String> = dedupe_headers(&raw_headers)
        .iter()
        .enumerate()
        .map(|(index, header)| normalize_header(header, index))
        .collect();

    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.len() > headers.len() {
            return Err(MergeError::RaggedRow {
                line: record.position().map_or(0, |p| p.line()),
                expected: headers.len(),
                found: record.len(),
            });
        }

        let mut cells: Vec<Option<String>> = record.iter().map(clean_cell).collect();
        // Short rows are padded with missing values.
        cells.resize(headers.len(), None);
        raw_rows.push(cells);
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|column| ColumnKind::infer(raw_rows.iter().filter_map(|row| row[column].as_deref())))
        .collect();

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(cell, kind)| cell.map_or(Value::Null, |s| kind.convert(s)))
                .collect()
        })
        .collect();

    Ok(CsvTable { headers, rows })
}

/// Trims, lowercases and joins whitespace runs with `_`.
pub fn normalize_header(raw: &str, index: usize) -> String {
    let normalized = raw
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");

    if normalized.is_empty() {
        format!("unnamed:_{}", index)
    } else {
        normalized
    }
}

/// Names blank headers `Unnamed: {index}` and renames repeats of an identical
/// header to `{name}.1`, `{name}.2`, … so every column keeps its own field.
fn dedupe_headers(raw: &csv::StringRecord) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(raw.len());

    for (index, header) in raw.iter().enumerate() {
        let mut name = if header.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            header.to_owned()
        };

        let mut seen = counts.get(&name).copied().unwrap_or(0);
        while seen > 0 {
            counts.insert(name.clone(), seen + 1);
            name = format!("{}.{}", name, seen);
            seen = counts.get(&name).copied().unwrap_or(0);
        }
        counts.insert(name.clone(), seen + 1);
        names.push(name);
    }

    names
}

fn clean_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NA_VALUES.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Integer,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    fn infer<'a, I>(cells: I) -> Self
    where
        I: Iterator<Item = &'a str>,
    {
        let (mut integer, mut float, mut boolean) = (true, true, true);
        for cell in cells {
            integer &= cell.parse::<i64>().is_ok();
            float &= parse_finite(cell).is_some();
            boolean &= parse_bool(cell).is_some();
        }

        if integer {
            ColumnKind::Integer
        } else if float {
            ColumnKind::Float
        } else if boolean {
            ColumnKind::Bool
        } else {
            ColumnKind::Text
        }
    }

    fn convert(&self, cell: String) -> Value {
        match self {
            ColumnKind::Integer => cell
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(cell)),
            ColumnKind::Float => parse_finite(&cell)
                .and_then(Number::from_f64)
                .map_or(Value::String(cell), Value::Number),
            ColumnKind::Bool => parse_bool(&cell).map_or(Value::String(cell), Value::Bool),
            ColumnKind::Text => Value::String(cell),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_csv() {
        let (table, encoding) =
            read_csv("test-inputs/2024-01-05.csv", &[Encoding::Utf8Sig]).unwrap();

        assert_eq!(encoding, Encoding::Utf8Sig);
        assert_eq!(
            table.headers,
            vec!["phone_number", "call_date", "call_reason", "client_type", "agent_name"]
        );
        assert_eq!(table.rows.len(), 4);
        assert_eq!(
            table.rows[0],
            vec![
                json!("555-123-4567"),
                json!("01/05/2024 14:30"),
                json!("Billing"),
                json!("Residential"),
                json!("José Ramírez"),
            ]
        );
    }

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header("  Phone   Number ", 0), "phone_number");
        assert_eq!(normalize_header("Call\tDate", 1), "call_date");
        assert_eq!(normalize_header("   ", 4), "unnamed:_4");
    }

    #[test]
    fn na_spellings_become_null() {
        let table = parse_table("a,b,c\nN/A, NaN ,\nx,null,#N/A\n").unwrap();
        assert_eq!(table.rows[0], vec![Value::Null, Value::Null, Value::Null]);
        assert_eq!(table.rows[1], vec![json!("x"), Value::Null, Value::Null]);
    }

    #[test]
    fn columns_are_typed_as_a_whole() {
        let table = parse_table("ints,floats,mixed\n1,1.5,7\n 2 ,2,x\n,,\n").unwrap();
        assert_eq!(table.rows[0], vec![json!(1), json!(1.5), json!("7")]);
        assert_eq!(table.rows[1], vec![json!(2), json!(2.0), json!("x")]);
        assert_eq!(table.rows[2], vec![Value::Null, Value::Null, Value::Null]);
    }

    #[test]
    fn boolean_columns_become_json_booleans() {
        let table = parse_table("callback,mixed\nTrue,true\nFALSE,maybe\n,\n").unwrap();
        assert_eq!(table.rows[0], vec![json!(true), json!("true")]);
        assert_eq!(table.rows[1], vec![json!(false), json!("maybe")]);
        assert_eq!(table.rows[2], vec![Value::Null, Value::Null]);
    }

    #[test]
    fn repeated_headers_keep_every_column() {
        let table = parse_table("Name,Name,,Name.1\na,b,c,d\n").unwrap();
        assert_eq!(
            table.headers,
            vec!["name", "name.1", "unnamed:_2", "name.1.1"]
        );
        assert_eq!(
            table.rows[0],
            vec![json!("a"), json!("b"), json!("c"), json!("d")]
        );
    }

    #[test]
    fn short_rows_are_padded() {
        let table = parse_table("a,b,c\n1\n").unwrap();
        assert_eq!(table.rows[0], vec![json!(1), Value::Null, Value::Null]);
    }

    #[test]
    fn long_rows_fail_the_file() {
        let err = parse_table("a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(
            err,
            MergeError::RaggedRow {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(parse_table("").unwrap_err(), MergeError::MissingHeader));
    }

    #[test]
    fn falls_through_encodings_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.csv");
        fs::write(&path, b"name\ncaf\xE9\n").unwrap();

        let (table, encoding) =
            read_csv(&path, &[Encoding::Utf8Sig, Encoding::Windows1252]).unwrap();
        assert_eq!(encoding, Encoding::Windows1252);
        assert_eq!(table.rows[0], vec![json!("café")]);
    }
}
