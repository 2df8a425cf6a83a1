//! Aggregator stage: per-county derived metrics and category labels, plus the
//! production allocation summaries.
//!
//! Missing inputs propagate as `None`; only structurally impossible values
//! (negative counts, party votes above the total) raise [`DerivationError`].

pub(crate) mod stats;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::DerivationError;
use crate::join::{BackgroundCounty, CountyRecord, UnifiedTable};
use crate::types::{Column, CountyCode, IncomeQuartile, PoliticalLean, Race};

/// How soybean output is normalised into `production_intensity`. Fixed once per
/// deployment through the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityScale {
    /// `ln(1 + bushels) / ln(1 + max bushels)`; tames the heavy right tail.
    #[default]
    LogMax,
    /// Share of reporting counties producing at most this much.
    PercentileRank,
}

/// A joined county plus everything computed from it. Never mutated after the
/// Aggregator returns.
#[derive(Debug, Clone)]
pub struct DerivedRecord {
    pub county: CountyRecord,
    pub production_intensity: Option<f64>,
    pub dem_share: Option<f64>,
    pub gop_share: Option<f64>,
    pub pct_white: Option<f64>,
    pub pct_black: Option<f64>,
    pub pct_hispanic: Option<f64>,
    pub pct_bachelors: Option<f64>,
    pub political_lean: Option<PoliticalLean>,
    pub majority_race: Option<Race>,
    pub income_quartile: Option<IncomeQuartile>,
}

impl DerivedRecord {
    pub fn code(&self) -> &CountyCode {
        &self.county.code
    }

    /// Numeric value of `column`; `None` for the missing marker and for
    /// non-numeric columns.
    pub fn metric(&self, column: Column) -> Option<f64> {
        let election = self.county.election.as_ref();
        let demographics = self.county.demographics.as_ref();
        match column {
            Column::SoybeanBushels => self.county.soybean_bushels,
            Column::ProductionIntensity => self.production_intensity,
            Column::VotesDem => election.and_then(|e| e.votes_dem),
            Column::VotesGop => election.and_then(|e| e.votes_gop),
            Column::TotalVotes => election.and_then(|e| e.total_votes),
            Column::DemShare => self.dem_share,
            Column::GopShare => self.gop_share,
            Column::MedianIncome => demographics.and_then(|d| d.median_income),
            Column::TotalPopulation => demographics.and_then(|d| d.total_population),
            Column::PctWhite => self.pct_white,
            Column::PctBlack => self.pct_black,
            Column::PctHispanic => self.pct_hispanic,
            Column::PctBachelors => self.pct_bachelors,
            Column::PoliticalLean | Column::MajorityRace | Column::IncomeQuartile | Column::Geometry => None,
        }
    }

    /// Label of a category column for this county.
    pub fn category(&self, column: Column) -> Option<&'static str> {
        match column {
            Column::PoliticalLean => self.political_lean.map(PoliticalLean::label),
            Column::MajorityRace => self.majority_race.map(Race::label),
            Column::IncomeQuartile => self.income_quartile.map(IncomeQuartile::label),
            _ => None,
        }
    }
}

/// All labels a category column can take, in display order.
pub fn category_labels(column: Column) -> Vec<&'static str> {
    match column {
        Column::PoliticalLean => PoliticalLean::ALL.iter().map(|c| c.label()).collect(),
        Column::MajorityRace => Race::ALL.iter().map(|c| c.label()).collect(),
        Column::IncomeQuartile => IncomeQuartile::ALL.iter().map(|c| c.label()).collect(),
        _ => Vec::new(),
    }
}

/// Total of a metric within one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub category: &'static str,
    pub total: f64,
    /// Share of the grand total; `None` when the grand total is zero.
    pub share: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DerivedTable {
    records: Vec<DerivedRecord>,
    columns: BTreeSet<Column>,
    intensity: IntensityScale,
    background: Vec<BackgroundCounty>,
}

impl DerivedTable {
    pub fn records(&self) -> &[DerivedRecord] {
        &self.records
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

    pub fn intensity_scale(&self) -> IntensityScale {
        self.intensity
    }

    /// Boundaries with no anchor county, drawn as "no data" on maps.
    pub fn background(&self) -> &[BackgroundCounty] {
        &self.background
    }

    /// Sum `metric` per label of `category`. Counties missing either value are
    /// left out of every sum.
    pub fn allocation(&self, category: Column, metric: Column) -> Vec<Allocation> {
        let labels = category_labels(category);
        let mut totals = vec![0.0; labels.len()];

        for record in &self.records {
            let (Some(label), Some(value)) = (record.category(category), record.metric(metric)) else {
                continue;
            };
            if let Some(slot) = labels.iter().position(|l| *l == label) {
                totals[slot] += value;
            }
        }

        let grand_total: f64 = totals.iter().sum();
        labels
            .into_iter()
            .zip(totals)
            .map(|(category, total)| Allocation {
                category,
                total,
                share: (grand_total > 0.0).then(|| total / grand_total),
            })
            .collect()
    }
}

/// Computes every derived column from a unified table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    intensity: IntensityScale,
}

impl Aggregator {
    pub fn new(intensity: IntensityScale) -> Self {
        Self { intensity }
    }

    #[instrument(skip_all, fields(counties = table.len(), intensity = ?self.intensity))]
    pub fn derive(&self, mut table: UnifiedTable) -> Result<DerivedTable, DerivationError> {
        let mut columns = table.columns().clone();
        let background = table.take_background();
        let records = table.into_records();

        for record in &records {
            validate(record)?;
        }

        let production = stats::sorted_values(records.iter().filter_map(|r| r.soybean_bushels));
        let incomes = stats::sorted_values(
            records
                .iter()
                .filter_map(|r| r.demographics.as_ref().and_then(|d| d.median_income)),
        );
        let income_edges = income_quartile_edges(&incomes);

        let derived: Vec<DerivedRecord> = records
            .into_iter()
            .map(|county| self.derive_record(county, &production, income_edges.as_deref()))
            .collect();

        columns.insert(Column::ProductionIntensity);
        if columns.contains(&Column::VotesDem) {
            columns.extend([Column::DemShare, Column::GopShare, Column::PoliticalLean]);
        }
        if columns.contains(&Column::TotalPopulation) {
            columns.extend([
                Column::PctWhite,
                Column::PctBlack,
                Column::PctHispanic,
                Column::PctBachelors,
                Column::MajorityRace,
                Column::IncomeQuartile,
            ]);
        }

        info!("Derived metrics for {} counties", derived.len());
        Ok(DerivedTable {
            records: derived,
            columns,
            intensity: self.intensity,
            background,
        })
    }

    fn derive_record(
        &self,
        county: CountyRecord,
        production: &[f64],
        income_edges: Option<&[f64]>,
    ) -> DerivedRecord {
        let production_intensity = county
            .soybean_bushels
            .and_then(|bushels| intensity(self.intensity, production, bushels));

        let (dem_share, gop_share) = match &county.election {
            Some(e) => (share(e.votes_dem, e.total_votes), share(e.votes_gop, e.total_votes)),
            None => (None, None),
        };
        let political_lean = dem_share.map(|s| {
            if s > 0.5 {
                PoliticalLean::Democratic
            } else {
                PoliticalLean::Republican
            }
        });

        let demographics = county.demographics.as_ref();
        let total_population = demographics.and_then(|d| d.total_population);
        let pct_white = share(demographics.and_then(|d| d.white), total_population);
        let pct_black = share(demographics.and_then(|d| d.black), total_population);
        let pct_hispanic = share(demographics.and_then(|d| d.hispanic), total_population);
        let pct_bachelors = share(
            demographics.and_then(|d| d.bachelors),
            demographics.and_then(|d| d.population_25_plus),
        );
        let majority_race = demographics.and_then(|d| majority(&[
            (Race::White, d.white),
            (Race::Black, d.black),
            (Race::Hispanic, d.hispanic),
        ]));
        let income_quartile = match (income_edges, demographics.and_then(|d| d.median_income)) {
            (Some(edges), Some(income)) => IncomeQuartile::from_index(stats::bin_index(edges, income)),
            _ => None,
        };

        DerivedRecord {
            county,
            production_intensity,
            dem_share,
            gop_share,
            pct_white,
            pct_black,
            pct_hispanic,
            pct_bachelors,
            political_lean,
            majority_race,
            income_quartile,
        }
    }
}

/// `part / total`, defined only when both exist and the total is positive.
fn share(part: Option<f64>, total: Option<f64>) -> Option<f64> {
    match (part, total) {
        (Some(part), Some(total)) if total > 0.0 => Some(part / total),
        _ => None,
    }
}

fn intensity(scale: IntensityScale, sorted_production: &[f64], bushels: f64) -> Option<f64> {
    match scale {
        IntensityScale::LogMax => {
            let max = sorted_production.last().copied().unwrap_or(0.0);
            if max > 0.0 {
                Some(bushels.ln_1p() / max.ln_1p())
            } else {
                Some(0.0)
            }
        }
        IntensityScale::PercentileRank => stats::percentile_rank(sorted_production, bushels),
    }
}

/// Largest present count; ties resolve to the earlier entry.
fn majority(groups: &[(Race, Option<f64>)]) -> Option<Race> {
    let mut best: Option<(Race, f64)> = None;
    for (race, count) in groups {
        if let Some(count) = count {
            if best.map_or(true, |(_, top)| *count > top) {
                best = Some((*race, *count));
            }
        }
    }
    best.map(|(race, _)| race)
}

/// Quartile cut points, or `None` when duplicate edges make quartiles
/// meaningless.
fn income_quartile_edges(sorted_incomes: &[f64]) -> Option<Vec<f64>> {
    let edges = stats::quantile_edges(sorted_incomes, 4)?;
    if edges.windows(2).all(|pair| pair[0] < pair[1]) {
        Some(edges)
    } else {
        warn!(
            "Not enough distinct income values ({} counties) to compute quartiles",
            sorted_incomes.len()
        );
        None
    }
}

fn validate(record: &CountyRecord) -> Result<(), DerivationError> {
    let code = &record.code;
    non_negative(code, "soybean_bushels", record.soybean_bushels)?;

    if let Some(e) = &record.election {
        non_negative(code, "votes_dem", e.votes_dem)?;
        non_negative(code, "votes_gop", e.votes_gop)?;
        non_negative(code, "total_votes", e.total_votes)?;
        within_total(code, "votes_dem", e.votes_dem, "total_votes", e.total_votes)?;
        within_total(code, "votes_gop", e.votes_gop, "total_votes", e.total_votes)?;
    }

    if let Some(d) = &record.demographics {
        non_negative(code, "median_household_income", d.median_income)?;
        non_negative(code, "total_population", d.total_population)?;
        non_negative(code, "population_25_plus", d.population_25_plus)?;
        non_negative(code, "bachelors", d.bachelors)?;
        non_negative(code, "white_population", d.white)?;
        non_negative(code, "black_population", d.black)?;
        non_negative(code, "hispanic_population", d.hispanic)?;
    }

    Ok(())
}

fn non_negative(code: &CountyCode, field: &'static str, value: Option<f64>) -> Result<(), DerivationError> {
    match value {
        Some(value) if value < 0.0 => Err(DerivationError::Negative {
            code: code.clone(),
            field,
            value,
        }),
        _ => Ok(()),
    }
}

fn within_total(
    code: &CountyCode,
    field: &'static str,
    value: Option<f64>,
    total_field: &'static str,
    total: Option<f64>,
) -> Result<(), DerivationError> {
    match (value, total) {
        (Some(value), Some(total)) if value > total => Err(DerivationError::Inconsistent {
            code: code.clone(),
            field,
            value,
            total_field,
            total,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::Joiner;
    use crate::loader::{AgricultureRow, DemographicRow, ElectionRow, KeyedTable};
    use crate::types::SourceKind;

    fn code(raw: &str) -> CountyCode {
        CountyCode::parse(raw).unwrap()
    }

    struct Fixture {
        agriculture: KeyedTable<AgricultureRow>,
        election: KeyedTable<ElectionRow>,
        demographics: KeyedTable<DemographicRow>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                agriculture: KeyedTable::new(SourceKind::Agriculture),
                election: KeyedTable::new(SourceKind::Election),
                demographics: KeyedTable::new(SourceKind::Demographics),
            }
        }

        fn county(mut self, raw: &str, bushels: Option<f64>, votes: (f64, f64, f64), people: [f64; 4]) -> Self {
            self.agriculture
                .insert(
                    code(raw),
                    AgricultureRow {
                        state_name: None,
                        county_name: None,
                        soybean_bushels: bushels,
                    },
                )
                .unwrap();
            self.election
                .insert(
                    code(raw),
                    ElectionRow {
                        state_name: None,
                        county_name: None,
                        votes_dem: Some(votes.0),
                        votes_gop: Some(votes.1),
                        total_votes: Some(votes.2),
                    },
                )
                .unwrap();
            let [total, white, black, hispanic] = people;
            self.demographics
                .insert(
                    code(raw),
                    DemographicRow {
                        median_income: Some(50_000.0 + total),
                        population_25_plus: Some(total / 2.0),
                        bachelors: Some(total / 8.0),
                        total_population: Some(total),
                        white: Some(white),
                        black: Some(black),
                        hispanic: Some(hispanic),
                    },
                )
                .unwrap();
            self
        }

        fn derive(&self, scale: IntensityScale) -> Result<DerivedTable, DerivationError> {
            let unified = Joiner::new(&self.agriculture)
                .unwrap()
                .join(&self.election)
                .unwrap()
                .join(&self.demographics)
                .unwrap()
                .finish();
            Aggregator::new(scale).derive(unified)
        }
    }

    fn three_counties() -> Fixture {
        Fixture::new()
            .county("19001", Some(1_000.0), (600.0, 380.0, 1_000.0), [2_000.0, 1_500.0, 300.0, 200.0])
            .county("19003", Some(0.0), (150.0, 250.0, 400.0), [1_000.0, 200.0, 700.0, 100.0])
            .county("19005", None, (0.0, 0.0, 0.0), [4_000.0, 1_000.0, 1_000.0, 2_000.0])
    }

    #[test]
    fn test_hand_computed_shares() {
        let table = three_counties().derive(IntensityScale::LogMax).unwrap();
        let [a, b, c] = [&table.records()[0], &table.records()[1], &table.records()[2]];

        assert_eq!(a.dem_share, Some(0.6));
        assert_eq!(a.gop_share, Some(0.38));
        assert_eq!(a.pct_white, Some(0.75));
        assert_eq!(a.pct_black, Some(0.15));
        assert_eq!(a.pct_hispanic, Some(0.1));
        assert_eq!(a.pct_bachelors, Some(0.25));
        assert_eq!(a.political_lean, Some(PoliticalLean::Democratic));
        assert_eq!(a.majority_race, Some(Race::White));

        assert_eq!(b.dem_share, Some(0.375));
        assert_eq!(b.pct_black, Some(0.7));
        assert_eq!(b.political_lean, Some(PoliticalLean::Republican));
        assert_eq!(b.majority_race, Some(Race::Black));

        assert_eq!(c.pct_hispanic, Some(0.5));
        assert_eq!(c.majority_race, Some(Race::Hispanic));
    }

    #[test]
    fn test_zero_total_votes_yield_missing_marker() {
        let table = three_counties().derive(IntensityScale::LogMax).unwrap();
        let c = &table.records()[2];

        assert_eq!(c.dem_share, None);
        assert_eq!(c.gop_share, None);
        assert_eq!(c.political_lean, None);
        assert_eq!(c.metric(Column::DemShare), None);
    }

    #[test]
    fn test_log_max_intensity() {
        let table = three_counties().derive(IntensityScale::LogMax).unwrap();
        assert_eq!(table.records()[0].production_intensity, Some(1.0));
        assert_eq!(table.records()[1].production_intensity, Some(0.0));
        assert_eq!(table.records()[2].production_intensity, None);
    }

    #[test]
    fn test_percentile_rank_intensity() {
        let table = three_counties().derive(IntensityScale::PercentileRank).unwrap();
        assert_eq!(table.records()[0].production_intensity, Some(1.0));
        assert_eq!(table.records()[1].production_intensity, Some(0.5));
        assert_eq!(table.records()[2].production_intensity, None);
        assert_eq!(table.intensity_scale(), IntensityScale::PercentileRank);
    }

    #[test]
    fn test_negative_population_is_derivation_error() {
        let fixture = Fixture::new().county("19001", Some(1.0), (1.0, 1.0, 2.0), [-10.0, 1.0, 1.0, 1.0]);
        let err = fixture.derive(IntensityScale::LogMax).unwrap_err();
        assert!(matches!(err, DerivationError::Negative { field: "total_population", .. }));
    }

    #[test]
    fn test_party_votes_above_total_is_derivation_error() {
        let fixture = Fixture::new().county("19001", Some(1.0), (1_200.0, 200.0, 1_000.0), [10.0, 1.0, 1.0, 1.0]);
        let err = fixture.derive(IntensityScale::LogMax).unwrap_err();
        assert!(matches!(err, DerivationError::Inconsistent { field: "votes_dem", .. }));
    }

    #[test]
    fn test_derived_columns_follow_joined_sources() {
        let table = three_counties().derive(IntensityScale::LogMax).unwrap();
        assert!(table.has_column(Column::ProductionIntensity));
        assert!(table.has_column(Column::DemShare));
        assert!(table.has_column(Column::MajorityRace));
        assert!(!table.has_column(Column::Geometry));
    }

    #[test]
    fn test_duplicate_income_edges_leave_quartiles_missing() {
        let table = Fixture::new()
            .county("19001", Some(1.0), (1.0, 1.0, 2.0), [100.0, 50.0, 0.0, 0.0])
            .county("19003", Some(2.0), (1.0, 1.0, 2.0), [100.0, 50.0, 0.0, 0.0])
            .county("19005", Some(3.0), (1.0, 1.0, 2.0), [100.0, 50.0, 0.0, 0.0])
            .derive(IntensityScale::LogMax)
            .unwrap();
        assert!(table.records().iter().all(|r| r.income_quartile.is_none()));
    }

    #[test]
    fn test_income_quartiles() {
        let mut fixture = Fixture::new();
        for (i, raw) in ["19001", "19003", "19005", "19007", "19009", "19011", "19013", "19015"]
            .iter()
            .enumerate()
        {
            let total = (i as f64 + 1.0) * 1_000.0;
            fixture = fixture.county(raw, Some(10.0), (1.0, 1.0, 2.0), [total, total, 0.0, 0.0]);
        }
        let table = fixture.derive(IntensityScale::LogMax).unwrap();
        let quartiles: Vec<_> = table.records().iter().map(|r| r.income_quartile).collect();

        assert_eq!(quartiles[0], Some(IncomeQuartile::Low));
        assert_eq!(quartiles[1], Some(IncomeQuartile::Low));
        assert_eq!(quartiles[2], Some(IncomeQuartile::LowerMid));
        assert_eq!(quartiles[5], Some(IncomeQuartile::UpperMid));
        assert_eq!(quartiles[7], Some(IncomeQuartile::High));
    }

    #[test]
    fn test_allocation_by_income_quartile() {
        let mut fixture = Fixture::new();
        for (i, raw) in ["19001", "19003", "19005", "19007", "19009", "19011", "19013", "19015"]
            .iter()
            .enumerate()
        {
            let total = (i as f64 + 1.0) * 1_000.0;
            let bushels = (i as f64 + 1.0) * 10.0;
            fixture = fixture.county(raw, Some(bushels), (1.0, 1.0, 2.0), [total, total, 0.0, 0.0]);
        }
        let table = fixture.derive(IntensityScale::LogMax).unwrap();

        let by_income = table.allocation(Column::IncomeQuartile, Column::SoybeanBushels);
        let labels: Vec<&str> = by_income.iter().map(|a| a.category).collect();
        assert_eq!(labels, vec!["Low Income", "Lower-Mid", "Upper-Mid", "High Income"]);

        let totals: Vec<f64> = by_income.iter().map(|a| a.total).collect();
        assert_eq!(totals, vec![30.0, 70.0, 110.0, 150.0]);
        for (allocation, expected) in by_income.iter().zip([30.0, 70.0, 110.0, 150.0]) {
            let share = allocation.share.unwrap();
            assert!((share - expected / 360.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_allocation_excludes_missing_production() {
        let table = three_counties().derive(IntensityScale::LogMax).unwrap();
        let by_lean = table.allocation(Column::PoliticalLean, Column::SoybeanBushels);

        assert_eq!(by_lean.len(), 2);
        assert_eq!(by_lean[0].category, "Democratic");
        assert_eq!(by_lean[0].total, 1_000.0);
        assert_eq!(by_lean[0].share, Some(1.0));
        assert_eq!(by_lean[1].category, "Republican");
        assert_eq!(by_lean[1].total, 0.0);
        assert_eq!(by_lean[1].share, Some(0.0));

        let by_race = table.allocation(Column::MajorityRace, Column::SoybeanBushels);
        assert_eq!(by_race[2].category, "Hispanic");
        assert_eq!(by_race[2].total, 0.0);
    }
}
