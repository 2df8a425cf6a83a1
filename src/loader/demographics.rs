use std::path::Path;

use tracing::{info, instrument};

use super::{parse_measure, KeyedTable, RawTable};
use crate::constants::{
    ACS_BACHELORS, ACS_BLACK, ACS_COUNTY, ACS_HISPANIC, ACS_JAM_VALUES, ACS_MEDIAN_INCOME, ACS_POP_25_PLUS,
    ACS_STATE, ACS_TOTAL_POPULATION, ACS_WHITE,
};
use crate::error::LoadError;
use crate::types::{CountyCode, SourceKind};

/// ACS 5-year estimates for one county. Counts are people, income is dollars.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DemographicRow {
    pub median_income: Option<f64>,
    pub population_25_plus: Option<f64>,
    pub bachelors: Option<f64>,
    pub total_population: Option<f64>,
    pub white: Option<f64>,
    pub black: Option<f64>,
    pub hispanic: Option<f64>,
}

/// Load an ACS extract, either the raw API JSON response or a CSV with the
/// same variable columns.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_demographics(path: &Path) -> Result<KeyedTable<DemographicRow>, LoadError> {
    let raw = RawTable::read(SourceKind::Demographics, path)?;
    let table = parse_demographics(&raw)?;
    info!("Loaded {} counties of ACS estimates", table.len());
    Ok(table)
}

pub(crate) fn parse_demographics(raw: &RawTable) -> Result<KeyedTable<DemographicRow>, LoadError> {
    let dataset = raw.dataset;
    let state_idx = raw.column(ACS_STATE)?;
    let county_idx = raw.column(ACS_COUNTY)?;
    let column = |name: &'static str| raw.column(name).map(|idx| (name, idx));
    let income = column(ACS_MEDIAN_INCOME)?;
    let pop25 = column(ACS_POP_25_PLUS)?;
    let bachelors = column(ACS_BACHELORS)?;
    let total = column(ACS_TOTAL_POPULATION)?;
    let white = column(ACS_WHITE)?;
    let black = column(ACS_BLACK)?;
    let hispanic = column(ACS_HISPANIC)?;

    let mut table = KeyedTable::new(dataset);
    for (i, row) in raw.rows.iter().enumerate() {
        let line = i + 1;
        let code = CountyCode::from_parts(&row[state_idx], &row[county_idx]).ok_or_else(|| {
            LoadError::InvalidCode {
                dataset,
                row: line,
                value: format!("{}/{}", row[state_idx], row[county_idx]),
            }
        })?;

        let estimate = |(name, idx): (&str, usize)| -> Result<Option<f64>, LoadError> {
            Ok(parse_measure(dataset, line, name, &row[idx])?.filter(|v| !is_jam_value(*v)))
        };

        table.insert(
            code,
            DemographicRow {
                median_income: estimate(income)?,
                population_25_plus: estimate(pop25)?,
                bachelors: estimate(bachelors)?,
                total_population: estimate(total)?,
                white: estimate(white)?,
                black: estimate(black)?,
                hispanic: estimate(hispanic)?,
            },
        )?;
    }

    Ok(table)
}

fn is_jam_value(value: f64) -> bool {
    ACS_JAM_VALUES.contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"["B19013_001E","B15003_001E","B15003_022E","B03002_001E","B03002_003E","B03002_004E","B03002_012E","state","county"]"#;

    fn parse_json(rows: &str) -> Result<KeyedTable<DemographicRow>, LoadError> {
        let json = format!("[{HEADER},{rows}]");
        let raw = RawTable::from_json_reader(SourceKind::Demographics, json.as_bytes()).unwrap();
        parse_demographics(&raw)
    }

    #[test]
    fn test_parses_acs_api_response() {
        let table = parse_json(r#"["68315","39000","7100","59000","43000","11000","2000","01","001"]"#).unwrap();

        let row = table.get(&CountyCode::parse("01001").unwrap()).unwrap();
        assert_eq!(row.median_income, Some(68_315.0));
        assert_eq!(row.total_population, Some(59_000.0));
        assert_eq!(row.hispanic, Some(2_000.0));
    }

    #[test]
    fn test_jam_values_become_missing() {
        let table = parse_json(r#"["-666666666","100","10","200","150","30","20","48","301"]"#).unwrap();
        let row = table.get(&CountyCode::parse("48301").unwrap()).unwrap();
        assert_eq!(row.median_income, None);
        assert_eq!(row.white, Some(150.0));
    }

    #[test]
    fn test_other_negative_values_pass_through() {
        let table = parse_json(r#"["50000","100","10","-5","150","30","20","48","301"]"#).unwrap();
        let row = table.get(&CountyCode::parse("48301").unwrap()).unwrap();
        assert_eq!(row.total_population, Some(-5.0));
    }

    #[test]
    fn test_missing_variable_is_load_error() {
        let json = r#"[["B19013_001E","state","county"],["50000","19","153"]]"#;
        let raw = RawTable::from_json_reader(SourceKind::Demographics, json.as_bytes()).unwrap();
        let err = parse_demographics(&raw).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { .. }));
    }

    #[test]
    fn test_reads_csv_variant() {
        let csv = "B19013_001E,B15003_001E,B15003_022E,B03002_001E,B03002_003E,B03002_004E,B03002_012E,state,county\n\
                   71000,500,100,800,600,100,50,19,153\n";
        let raw = RawTable::from_csv_reader(SourceKind::Demographics, csv.as_bytes()).unwrap();
        let table = parse_demographics(&raw).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(&CountyCode::parse("19153").unwrap()).unwrap().bachelors,
            Some(100.0)
        );
    }
}
