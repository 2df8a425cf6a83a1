use std::path::Path;

use tracing::{debug, info, instrument};

use super::{optional_text, parse_measure, KeyedTable, RawTable};
use crate::constants::{NASS_COUNTY_ANSI, NASS_COUNTY_NAME, NASS_STATE_ANSI, NASS_STATE_NAME, NASS_VALUE};
use crate::error::LoadError;
use crate::types::{CountyCode, SourceKind};

/// One county's soybean production from the Census of Agriculture.
#[derive(Debug, Clone, PartialEq)]
pub struct AgricultureRow {
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    /// Bushels produced; `None` when withheld or not reported.
    pub soybean_bushels: Option<f64>,
}

/// Load a NASS Quick Stats CSV export of county soybean production.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_agriculture(path: &Path) -> Result<KeyedTable<AgricultureRow>, LoadError> {
    let raw = RawTable::read(SourceKind::Agriculture, path)?;
    let table = parse_agriculture(&raw)?;
    info!("Loaded {} counties of soybean production", table.len());
    Ok(table)
}

pub(crate) fn parse_agriculture(raw: &RawTable) -> Result<KeyedTable<AgricultureRow>, LoadError> {
    let dataset = raw.dataset;
    let state_idx = raw.column(NASS_STATE_ANSI)?;
    let county_idx = raw.column(NASS_COUNTY_ANSI)?;
    let value_idx = raw.column(NASS_VALUE)?;
    let state_name_idx = raw.optional_column(NASS_STATE_NAME);
    let county_name_idx = raw.optional_column(NASS_COUNTY_NAME);

    let mut table = KeyedTable::new(dataset);
    let mut skipped = 0usize;

    for (i, row) in raw.rows.iter().enumerate() {
        let line = i + 1;
        let state = &row[state_idx];
        let county = &row[county_idx];

        // State-level "OTHER (COMBINED) COUNTIES" roll-ups carry no county code.
        if county.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let code = CountyCode::from_parts(state, county).ok_or_else(|| LoadError::InvalidCode {
            dataset,
            row: line,
            value: format!("{state}/{county}"),
        })?;

        let soybean_bushels = parse_measure(dataset, line, NASS_VALUE, &row[value_idx])?;

        table.insert(
            code,
            AgricultureRow {
                state_name: optional_text(row, state_name_idx),
                county_name: optional_text(row, county_name_idx),
                soybean_bushels,
            },
        )?;
    }

    if skipped > 0 {
        debug!("Skipped {} rows without a county code", skipped);
    }

    Ok(table)
}
