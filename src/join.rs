//! Joiner stage: left-outer join of every secondary table onto the agriculture
//! anchor. The anchor's rows define the output row set.

use std::collections::BTreeSet;

use geo::MultiPolygon;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::JoinError;
use crate::loader::{AgricultureRow, DemographicRow, ElectionRow, GeometryRow, KeyedTable};
use crate::types::{Column, CountyCode, SourceKind};

/// One county after joining. A `None` section means the source had no row for
/// this county (the missing marker), never a zero measurement.
#[derive(Debug, Clone)]
pub struct CountyRecord {
    pub code: CountyCode,
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    pub soybean_bushels: Option<f64>,
    pub election: Option<ElectionRow>,
    pub demographics: Option<DemographicRow>,
    pub geometry: Option<MultiPolygon<f64>>,
}

impl CountyRecord {
    fn from_anchor(code: &CountyCode, row: &AgricultureRow) -> Self {
        Self {
            code: code.clone(),
            state_name: row.state_name.clone(),
            county_name: row.county_name.clone(),
            soybean_bushels: row.soybean_bushels,
            election: None,
            demographics: None,
            geometry: None,
        }
    }
}

/// A secondary table row that can be merged into a [`CountyRecord`].
pub trait JoinRow {
    /// Columns this source contributes to the unified table.
    fn columns() -> &'static [Column];

    fn merge_into(&self, record: &mut CountyRecord);

    /// Shape kept for drawing when this row has no anchor county.
    fn outline(&self) -> Option<&MultiPolygon<f64>> {
        None
    }
}

impl JoinRow for ElectionRow {
    fn columns() -> &'static [Column] {
        &[Column::VotesDem, Column::VotesGop, Column::TotalVotes]
    }

    fn merge_into(&self, record: &mut CountyRecord) {
        if record.state_name.is_none() {
            record.state_name = self.state_name.clone();
        }
        if record.county_name.is_none() {
            record.county_name = self.county_name.clone();
        }
        record.election = Some(self.clone());
    }
}

impl JoinRow for DemographicRow {
    fn columns() -> &'static [Column] {
        &[Column::MedianIncome, Column::TotalPopulation]
    }

    fn merge_into(&self, record: &mut CountyRecord) {
        record.demographics = Some(self.clone());
    }
}

impl JoinRow for GeometryRow {
    fn columns() -> &'static [Column] {
        &[Column::Geometry]
    }

    fn merge_into(&self, record: &mut CountyRecord) {
        if record.county_name.is_none() {
            record.county_name = self.name.clone();
        }
        record.geometry = Some(self.shape.clone());
    }

    fn outline(&self) -> Option<&MultiPolygon<f64>> {
        Some(&self.shape)
    }
}

/// Match statistics for one joined source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMatch {
    pub dataset: SourceKind,
    /// Rows in the source table
    pub rows: usize,
    /// Anchor counties that found a row in this source
    pub matched: usize,
}

/// A boundary with no anchor county. Maps draw it as "no data" so the country
/// keeps its shape.
#[derive(Debug, Clone)]
pub struct BackgroundCounty {
    pub code: CountyCode,
    pub shape: MultiPolygon<f64>,
}

/// Joined county records in county-code order, plus the set of columns that
/// exist in this run.
#[derive(Debug, Clone)]
pub struct UnifiedTable {
    records: Vec<CountyRecord>,
    columns: BTreeSet<Column>,
    matches: Vec<SourceMatch>,
    background: Vec<BackgroundCounty>,
}

impl UnifiedTable {
    pub fn records(&self) -> &[CountyRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CountyRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    pub fn matches(&self) -> &[SourceMatch] {
        &self.matches
    }

    pub fn background(&self) -> &[BackgroundCounty] {
        &self.background
    }

    pub fn take_background(&mut self) -> Vec<BackgroundCounty> {
        std::mem::take(&mut self.background)
    }
}

/// Builds a [`UnifiedTable`] one source at a time.
///
/// ```ignore
/// let unified = Joiner::new(&agriculture)?
///     .join(&election)?
///     .join(&demographics)?
///     .join(&geometry)?
///     .finish();
/// ```
#[derive(Debug)]
pub struct Joiner {
    records: Vec<CountyRecord>,
    columns: BTreeSet<Column>,
    matches: Vec<SourceMatch>,
    background: Vec<BackgroundCounty>,
}

impl Joiner {
    pub fn new(anchor: &KeyedTable<AgricultureRow>) -> Result<Self, JoinError> {
        if anchor.is_empty() {
            return Err(JoinError::EmptyAnchor {
                dataset: anchor.dataset(),
            });
        }

        let records = anchor
            .iter()
            .map(|(code, row)| CountyRecord::from_anchor(code, row))
            .collect();

        Ok(Self {
            records,
            columns: BTreeSet::from([Column::SoybeanBushels]),
            matches: Vec::new(),
            background: Vec::new(),
        })
    }

    /// Left-join `table` onto the anchor rows.
    #[instrument(skip_all, fields(dataset = %table.dataset()))]
    pub fn join<R: JoinRow>(mut self, table: &KeyedTable<R>) -> Result<Self, JoinError> {
        let mut matched = 0usize;
        for record in &mut self.records {
            if let Some(row) = table.get(&record.code) {
                row.merge_into(record);
                matched += 1;
            }
        }

        if !table.is_empty() && matched == 0 {
            return Err(JoinError::NoOverlap {
                dataset: table.dataset(),
            });
        }

        info!(
            "Joined {}: {}/{} anchor counties matched, {} source rows without an anchor county",
            table.dataset(),
            matched,
            self.records.len(),
            table.len() - matched
        );

        // Records are in code order, so a binary search finds the anchor
        for (code, row) in table.iter() {
            let Some(shape) = row.outline() else {
                continue;
            };
            if self.records.binary_search_by(|r| r.code.cmp(code)).is_err() {
                self.background.push(BackgroundCounty {
                    code: code.clone(),
                    shape: shape.clone(),
                });
            }
        }

        self.columns.extend(R::columns().iter().copied());
        self.matches.push(SourceMatch {
            dataset: table.dataset(),
            rows: table.len(),
            matched,
        });
        Ok(self)
    }

    pub fn finish(self) -> UnifiedTable {
        UnifiedTable {
            records: self.records,
            columns: self.columns,
            matches: self.matches,
            background: self.background,
        }
    }
}
