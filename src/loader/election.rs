use std::path::Path;

use tracing::{info, instrument};

use super::{optional_text, parse_measure, KeyedTable, RawTable};
use crate::constants::{
    ELECTION_COUNTY_NAME, ELECTION_FIPS, ELECTION_STATE_NAME, ELECTION_TOTAL_VOTES, ELECTION_VOTES_DEM,
    ELECTION_VOTES_GOP,
};
use crate::error::LoadError;
use crate::types::{CountyCode, SourceKind};

/// Presidential vote counts for one county.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionRow {
    pub state_name: Option<String>,
    pub county_name: Option<String>,
    pub votes_dem: Option<f64>,
    pub votes_gop: Option<f64>,
    pub total_votes: Option<f64>,
}

/// Load county-level presidential results.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_election(path: &Path) -> Result<KeyedTable<ElectionRow>, LoadError> {
    let raw = RawTable::read(SourceKind::Election, path)?;
    let table = parse_election(&raw)?;
    info!("Loaded {} counties of election results", table.len());
    Ok(table)
}

pub(crate) fn parse_election(raw: &RawTable) -> Result<KeyedTable<ElectionRow>, LoadError> {
    let dataset = raw.dataset;
    let fips_idx = raw.column(ELECTION_FIPS)?;
    let dem_idx = raw.column(ELECTION_VOTES_DEM)?;
    let gop_idx = raw.column(ELECTION_VOTES_GOP)?;
    let total_idx = raw.column(ELECTION_TOTAL_VOTES)?;
    let state_name_idx = raw.optional_column(ELECTION_STATE_NAME);
    let county_name_idx = raw.optional_column(ELECTION_COUNTY_NAME);

    let mut table = KeyedTable::new(dataset);
    for (i, row) in raw.rows.iter().enumerate() {
        let line = i + 1;
        let code = CountyCode::parse(&row[fips_idx]).ok_or_else(|| LoadError::InvalidCode {
            dataset,
            row: line,
            value: row[fips_idx].clone(),
        })?;

        table.insert(
            code,
            ElectionRow {
                state_name: optional_text(row, state_name_idx),
                county_name: optional_text(row, county_name_idx),
                votes_dem: parse_measure(dataset, line, ELECTION_VOTES_DEM, &row[dem_idx])?,
                votes_gop: parse_measure(dataset, line, ELECTION_VOTES_GOP, &row[gop_idx])?,
                total_votes: parse_measure(dataset, line, ELECTION_TOTAL_VOTES, &row[total_idx])?,
            },
        )?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(csv: &str) -> RawTable {
        RawTable::from_csv_reader(SourceKind::Election, csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_pads_county_fips() {
        let table = parse_election(&raw(
            "state_name,county_fips,county_name,votes_gop,votes_dem,total_votes,per_gop,per_dem\n\
             Alabama,1001,Autauga County,20484,7439,28281,0.724,0.263\n",
        ))
        .unwrap();

        let row = table.get(&CountyCode::parse("01001").unwrap()).unwrap();
        assert_eq!(row.votes_dem, Some(7439.0));
        assert_eq!(row.votes_gop, Some(20484.0));
        assert_eq!(row.total_votes, Some(28281.0));
        assert_eq!(row.state_name.as_deref(), Some("Alabama"));
    }

    #[test]
    fn test_invalid_fips_is_load_error() {
        let err = parse_election(&raw(
            "county_fips,votes_gop,votes_dem,total_votes\n\
             ABCDE,1,2,3\n",
        ))
        .unwrap_err();
        assert!(matches!(err, LoadError::InvalidCode { row: 1, .. }));
    }

    #[test]
    fn test_missing_key_column_is_load_error() {
        let err = parse_election(&raw("fips,votes_gop,votes_dem,total_votes\n01001,1,2,3\n")).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "county_fips"));
    }

    #[test]
    fn test_blank_counts_are_missing() {
        let table = parse_election(&raw(
            "county_fips,votes_gop,votes_dem,total_votes\n\
             02013,,,\n",
        ))
        .unwrap();
        let row = table.get(&CountyCode::parse("02013").unwrap()).unwrap();
        assert_eq!(row.total_votes, None);
    }
}
