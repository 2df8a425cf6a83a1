use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-digit county identifier (2-digit state code + 3-digit county code).
/// The only join key across every source table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountyCode(String);

impl CountyCode {
    /// Parse a full county code, zero-padding values that lost their leading
    /// zeros (`1001` -> `01001`). Spreadsheet float artifacts (`1001.0`) are
    /// tolerated.
    pub fn parse(raw: &str) -> Option<Self> {
        pad_digits(raw, 5).map(CountyCode)
    }

    /// Build a code from separate state and county parts, padding each.
    pub fn from_parts(state: &str, county: &str) -> Option<Self> {
        let state = pad_digits(state, 2)?;
        let county = pad_digits(county, 3)?;
        Some(CountyCode(format!("{state}{county}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state code prefix.
    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for CountyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn pad_digits(raw: &str, width: usize) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.len() > width || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{trimmed:0>width$}"))
}

/// The four input datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    Agriculture,
    Election,
    Demographics,
    Geometry,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Agriculture => "agriculture",
            SourceKind::Election => "election",
            SourceKind::Demographics => "demographics",
            SourceKind::Geometry => "geometry",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every column of the unified county table, raw and derived.
///
/// Visualization specs refer to columns by [`Column::name`]; resolution happens
/// once, before any drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    SoybeanBushels,
    ProductionIntensity,
    VotesDem,
    VotesGop,
    TotalVotes,
    DemShare,
    GopShare,
    MedianIncome,
    TotalPopulation,
    PctWhite,
    PctBlack,
    PctHispanic,
    PctBachelors,
    PoliticalLean,
    MajorityRace,
    IncomeQuartile,
    Geometry,
}

impl Column {
    pub const ALL: [Column; 17] = [
        Column::SoybeanBushels,
        Column::ProductionIntensity,
        Column::VotesDem,
        Column::VotesGop,
        Column::TotalVotes,
        Column::DemShare,
        Column::GopShare,
        Column::MedianIncome,
        Column::TotalPopulation,
        Column::PctWhite,
        Column::PctBlack,
        Column::PctHispanic,
        Column::PctBachelors,
        Column::PoliticalLean,
        Column::MajorityRace,
        Column::IncomeQuartile,
        Column::Geometry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::SoybeanBushels => "soybean_bushels",
            Column::ProductionIntensity => "production_intensity",
            Column::VotesDem => "votes_dem",
            Column::VotesGop => "votes_gop",
            Column::TotalVotes => "total_votes",
            Column::DemShare => "dem_share",
            Column::GopShare => "gop_share",
            Column::MedianIncome => "median_household_income",
            Column::TotalPopulation => "total_population",
            Column::PctWhite => "pct_white",
            Column::PctBlack => "pct_black",
            Column::PctHispanic => "pct_hispanic",
            Column::PctBachelors => "pct_bachelors_degree",
            Column::PoliticalLean => "political_lean",
            Column::MajorityRace => "majority_race",
            Column::IncomeQuartile => "income_quartile",
            Column::Geometry => "geometry",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_category(self) -> bool {
        matches!(
            self,
            Column::PoliticalLean | Column::MajorityRace | Column::IncomeQuartile
        )
    }

    /// Human-readable axis/legend label
    pub fn label(self) -> &'static str {
        match self {
            Column::SoybeanBushels => "Soybean Production (Bushels)",
            Column::ProductionIntensity => "Production Intensity",
            Column::VotesDem => "Democratic Votes",
            Column::VotesGop => "Republican Votes",
            Column::TotalVotes => "Total Votes",
            Column::DemShare => "Democratic Vote Share",
            Column::GopShare => "Republican Vote Share",
            Column::MedianIncome => "Median Household Income ($)",
            Column::TotalPopulation => "Total Population",
            Column::PctWhite => "White (Non-Hispanic) Share",
            Column::PctBlack => "Black (Non-Hispanic) Share",
            Column::PctHispanic => "Hispanic Share",
            Column::PctBachelors => "Bachelor's Degree Share (25+)",
            Column::PoliticalLean => "County Majority Vote",
            Column::MajorityRace => "County Majority Demographic",
            Column::IncomeQuartile => "Income Quartile",
            Column::Geometry => "Geometry",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which party carried a county
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PoliticalLean {
    Democratic,
    Republican,
}

/// Largest of the three tracked population groups in a county
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Race {
    White,
    Black,
    Hispanic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IncomeQuartile {
    Low,
    LowerMid,
    UpperMid,
    High,
}

impl PoliticalLean {
    pub const ALL: [PoliticalLean; 2] = [PoliticalLean::Democratic, PoliticalLean::Republican];

    pub fn label(self) -> &'static str {
        match self {
            PoliticalLean::Democratic => "Democratic",
            PoliticalLean::Republican => "Republican",
        }
    }
}

impl Race {
    pub const ALL: [Race; 3] = [Race::White, Race::Black, Race::Hispanic];

    pub fn label(self) -> &'static str {
        match self {
            Race::White => "White",
            Race::Black => "Black",
            Race::Hispanic => "Hispanic",
        }
    }
}

impl IncomeQuartile {
    pub const ALL: [IncomeQuartile; 4] = [
        IncomeQuartile::Low,
        IncomeQuartile::LowerMid,
        IncomeQuartile::UpperMid,
        IncomeQuartile::High,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IncomeQuartile::Low => "Low Income",
            IncomeQuartile::LowerMid => "Lower-Mid",
            IncomeQuartile::UpperMid => "Upper-Mid",
            IncomeQuartile::High => "High Income",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        IncomeQuartile::ALL.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_county_code_pads_short_values() {
        assert_eq!(CountyCode::parse("1001").unwrap().as_str(), "01001");
        assert_eq!(CountyCode::parse(" 19153 ").unwrap().as_str(), "19153");
        assert_eq!(CountyCode::parse("1001.0").unwrap().as_str(), "01001");
    }

    #[test]
    fn test_county_code_rejects_garbage() {
        assert!(CountyCode::parse("").is_none());
        assert!(CountyCode::parse("123456").is_none());
        assert!(CountyCode::parse("12a45").is_none());
        assert!(CountyCode::parse("-1001").is_none());
    }

    #[test]
    fn test_county_code_from_parts() {
        let code = CountyCode::from_parts("1", "1").unwrap();
        assert_eq!(code.as_str(), "01001");
        assert_eq!(code.state_code(), "01");
        assert!(CountyCode::from_parts("19", "").is_none());
        assert!(CountyCode::from_parts("190", "1").is_none());
    }

    #[test]
    fn test_column_names_round_trip() {
        for column in Column::ALL {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name("yield_per_acre"), None);
    }
}
