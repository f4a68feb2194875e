use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    dates,
    error::{MergeError, Result},
    records::{read_csv, CsvTable},
};

pub const PHONE_FIELD: &str = "phone_number";
pub const CALL_DATE_FIELD: &str = "call_date";
const PHONE_DIGITS: usize = 10;

/// Normalized field names and the display labels they are published under.
/// Renamed fields move to the end of the record in this order.
const FIELD_RENAMES: &[(&str, &str)] = &[
    ("call_reason", "Call Reason"),
    ("client_type", "Client type"),
];

pub type Record = Map<String, Value>;

/// Records from one source file, keyed by record key in row order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Group {
    pub key: String,
    pub records: Map<String, Value>,
}

#[derive(Debug, Serialize, PartialEq, Default)]
pub struct CallsDocument {
    #[serde(serialize_with = "serialize_groups")]
    pub calls: Vec<Group>,
}

impl CallsDocument {
    #[cfg(test)]
    pub fn group(&self, key: &str) -> Option<&Group> {
        self.calls.iter().find(|g| g.key == key)
    }

    fn group_mut(&mut self, key: &str) -> &mut Group {
        let index = match self.calls.iter().position(|g| g.key == key) {
            Some(index) => index,
            None => {
                self.calls.push(Group {
                    key: key.to_owned(),
                    records: Map::new(),
                });
                self.calls.len() - 1
            }
        };
        &mut self.calls[index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub files_found: usize,
    pub files_merged: usize,
    pub files_skipped: usize,
    pub records_merged: usize,
}

/// Everything one run accumulates. Threaded through file and row processing.
#[derive(Debug, Default)]
pub struct MergeRun {
    pub document: CallsDocument,
    pub summary: MergeSummary,
}

/// Lists `*.csv` files (extension matched case-insensitively) sorted by
/// file name. A missing directory is fatal.
pub fn discover_csv_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MergeError::SourceDirMissing(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().to_lowercase().ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn merge_directory(config: &Config) -> Result<MergeRun> {
    let files = discover_csv_files(&config.input_dir)?;
    info!("Found {} CSV files in {}", files.len(), config.input_dir.display());

    let mut run = MergeRun::default();
    run.summary.files_found = files.len();

    for path in &files {
        merge_file(&mut run, path, config);
    }

    Ok(run)
}

/// Merges one file into `run`. Unreadable files are logged and skipped
/// without creating their group.
pub fn merge_file(run: &mut MergeRun, path: &Path, config: &Config) {
    let group_key = group_key(path);
    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    info!("Processing {} → {}", filename, group_key);

    let (table, encoding) = match read_csv(path, &config.encodings) {
        Ok(read) => read,
        Err(e) => {
            warn!("Could not read {}: {}", filename, e);
            run.summary.files_skipped += 1;
            return;
        }
    };
    debug!("Decoded {} as {}", filename, encoding.name());

    let merged = merge_table(run.document.group_mut(&group_key), &table, config);
    run.summary.files_merged += 1;
    run.summary.records_merged += merged;
}

/// Adds every row of `table` to `group` and returns the number of records
/// inserted.
pub fn merge_table(group: &mut Group, table: &CsvTable, config: &Config) -> usize {
    for row in &table.rows {
        let mut record = build_record(&table.headers, row.clone());
        let base_key = derive_key(&record, &group.key, group.records.len(), config);

        if let Some(call_date) = record.get_mut(CALL_DATE_FIELD) {
            if !call_date.is_null() {
                let formatted = dates::reformat(
                    call_date,
                    &config.input_date_format,
                    &config.output_date_format,
                );
                if formatted.is_null() {
                    debug!("Nulling unparseable call date {}", call_date);
                }
                *call_date = formatted;
            }
        }

        let key = unique_key(&group.records, base_key);
        group.records.insert(key, Value::Object(record));
    }

    table.rows.len()
}

/// Group key for a source file: its name without the final extension.
pub fn group_key(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pairs headers with cell values and applies the display renames.
pub fn build_record(headers: &[String], row: Vec<Value>) -> Record {
    let mut record = Record::new();
    let mut renamed: Vec<(&str, Value)> = Vec::new();

    for (header, value) in headers.iter().zip(row) {
        match FIELD_RENAMES.iter().find(|(from, _)| from == header) {
            Some(&(_, label)) => renamed.push((label, value)),
            None => {
                record.insert(header.clone(), value);
            }
        }
    }

    for &(_, label) in FIELD_RENAMES {
        if let Some(index) = renamed.iter().rposition(|(l, _)| *l == label) {
            let (_, value) = renamed.swap_remove(index);
            record.insert(label.to_owned(), value);
        }
    }

    record
}

/// `{phone digits}_{epoch millis}` when the record carries a usable phone and
/// call date, `{group}_{ordinal}` otherwise.
pub fn derive_key(record: &Record, group_key: &str, ordinal: usize, config: &Config) -> String {
    match phone_and_time_key(record, config) {
        Ok(key) => key,
        Err(reason) => {
            debug!("Positional key for {} row {}: {}", group_key, ordinal, reason);
            format!("{}_{}", group_key, ordinal)
        }
    }
}

fn phone_and_time_key(record: &Record, config: &Config) -> std::result::Result<String, String> {
    let phone = field_text(record, PHONE_FIELD).ok_or("no phone number")?;
    let raw_date = field_text(record, CALL_DATE_FIELD).ok_or("no call date")?;

    let dt = dates::parse_strict(&raw_date, &config.input_date_format).map_err(|e| e.to_string())?;
    let millis = dates::epoch_millis(dt, config.timezone).map_err(|e| e.to_string())?;

    let digits = trailing_digits(&phone, PHONE_DIGITS);
    if digits.is_empty() {
        return Err(format!("phone '{}' has no digits", phone));
    }

    Ok(format!("{}_{}", digits, millis))
}

fn field_text(record: &Record, field: &str) -> Option<String> {
    let text = match record.get(field)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_owned(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Keeps only ASCII digits and returns the last `max` of them.
pub fn trailing_digits(raw: &str, max: usize) -> String {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    digits[digits.len().saturating_sub(max)..].iter().collect()
}

/// Appends `_1`, `_2`, … to `base` until it is not a key of `records`.
pub fn unique_key(records: &Map<String, Value>, base: String) -> String {
    if !records.contains_key(&base) {
        return base;
    }

    (1..)
        .map(|suffix| format!("{}_{}", base, suffix))
        .find(|candidate| !records.contains_key(candidate))
        .unwrap_or(base)
}

fn serialize_groups<S>(groups: &Vec<Group>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for group in groups {
        map.serialize_entry(&group.key, &group.records)?;
    }
    map.end()
}
