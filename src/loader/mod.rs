//! Loader stage: reads each source dataset into a table keyed by county code.
//!
//! Every loader resolves its required columns once against the file header, so
//! downstream stages work with typed rows rather than column lookups.

pub mod agriculture;
pub mod demographics;
pub mod election;
pub mod geometry;

pub use agriculture::{load_agriculture, AgricultureRow};
pub use demographics::{load_demographics, DemographicRow};
pub use election::{load_election, ElectionRow};
pub use geometry::{load_geometry, GeometryRow};

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LoadError;
use crate::types::{CountyCode, SourceKind};

/// NASS suppression codes such as `(D)` (withheld) or `(Z)` (rounds to zero).
static WITHHELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\s*[A-Za-z]{1,3}\s*\)$").expect("withheld-code pattern is valid"));

/// Rows of one source, unique per county code and iterated in code order.
#[derive(Debug, Clone)]
pub struct KeyedTable<R> {
    dataset: SourceKind,
    rows: BTreeMap<CountyCode, R>,
}

impl<R> KeyedTable<R> {
    pub fn new(dataset: SourceKind) -> Self {
        Self {
            dataset,
            rows: BTreeMap::new(),
        }
    }

    /// Insert a row, rejecting a second row for the same county.
    pub fn insert(&mut self, code: CountyCode, row: R) -> Result<(), LoadError> {
        match self.rows.entry(code) {
            btree_map::Entry::Occupied(entry) => Err(LoadError::DuplicateCode {
                dataset: self.dataset,
                code: entry.key().clone(),
            }),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(row);
                Ok(())
            }
        }
    }

    pub fn dataset(&self) -> SourceKind {
        self.dataset
    }

    pub fn get(&self, code: &CountyCode) -> Option<&R> {
        self.rows.get(code)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CountyCode, &R)> {
        self.rows.iter()
    }
}

/// Header plus string cells, before any typing.
#[derive(Debug, Clone)]
pub(crate) struct RawTable {
    pub dataset: SourceKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a file as CSV, or as a JSON array of arrays when the extension is `.json`.
    pub fn read(dataset: SourceKind, path: &Path) -> Result<Self, LoadError> {
        let file = open_source(dataset, path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_reader(dataset, file)
        } else {
            Self::from_csv_reader(dataset, file)
        }
    }

    pub fn from_csv_reader<R: Read>(dataset: SourceKind, reader: R) -> Result<Self, LoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|err| LoadError::Csv { dataset, err })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|err| LoadError::Csv { dataset, err })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            dataset,
            headers,
            rows,
        })
    }

    /// The Census API response shape: first row is the header, cells are
    /// strings, numbers or null.
    pub fn from_json_reader<R: Read>(dataset: SourceKind, reader: R) -> Result<Self, LoadError> {
        let table: Vec<Vec<serde_json::Value>> =
            serde_json::from_reader(reader).map_err(|err| LoadError::Json { dataset, err })?;

        let mut table = table.into_iter();
        let headers = match table.next() {
            Some(header) => header
                .iter()
                .map(|cell| json_cell(dataset, cell))
                .collect::<Result<Vec<_>, _>>()?,
            None => {
                return Err(LoadError::Malformed {
                    dataset,
                    message: "JSON table has no header row".to_string(),
                })
            }
        };

        let mut rows = Vec::new();
        for (index, row) in table.enumerate() {
            if row.len() != headers.len() {
                return Err(LoadError::Malformed {
                    dataset,
                    message: format!(
                        "row {} has {} cells, header has {}",
                        index + 1,
                        row.len(),
                        headers.len()
                    ),
                });
            }
            rows.push(
                row.iter()
                    .map(|cell| json_cell(dataset, cell))
                    .collect::<Result<Vec<_>, _>>()?,
            );
        }

        Ok(Self {
            dataset,
            headers,
            rows,
        })
    }

    /// Index of a required column.
    pub fn column(&self, name: &str) -> Result<usize, LoadError> {
        self.optional_column(name).ok_or_else(|| LoadError::MissingColumn {
            dataset: self.dataset,
            column: name.to_string(),
        })
    }

    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn json_cell(dataset: SourceKind, cell: &serde_json::Value) -> Result<String, LoadError> {
    match cell {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(LoadError::Malformed {
            dataset,
            message: format!("unexpected JSON cell {other}"),
        }),
    }
}

pub(crate) fn open_source(dataset: SourceKind, path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => LoadError::NotFound {
            dataset,
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            dataset,
            path: path.to_path_buf(),
            err,
        },
    })
}

/// Parse a numeric cell. Blanks, suppression codes and non-finite values are
/// the missing marker; thousands separators are stripped.
pub(crate) fn parse_measure(
    dataset: SourceKind,
    row: usize,
    column: &str,
    raw: &str,
) -> Result<Option<f64>, LoadError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || WITHHELD.is_match(trimmed) {
        return Ok(None);
    }

    let cleaned = trimmed.replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(_) => Err(LoadError::InvalidNumber {
            dataset,
            row,
            column: column.to_string(),
            value: trimmed.to_string(),
        }),
    }
}

/// Cell text, `None` when blank.
pub(crate) fn optional_text(row: &[String], index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
