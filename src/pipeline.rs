use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::derive::{Aggregator, DerivedTable};
use crate::error::{RenderError, Result};
use crate::join::{Joiner, SourceMatch};
use crate::loader::{load_agriculture, load_demographics, load_election, load_geometry};
use crate::types::Column;

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub counties: usize,
    pub matches: Vec<SourceMatch>,
    pub images: Vec<PathBuf>,
}

pub struct Pipeline;

impl Pipeline {
    /// Load, join, derive and render once. Any stage failure aborts the run.
    #[instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
    pub fn run(config: &Config) -> Result<PipelineResult> {
        let started = Instant::now();

        let inputs = &config.inputs;
        let agriculture = load_agriculture(&inputs.agriculture)?;
        let election = load_election(&inputs.election)?;
        let demographics = load_demographics(&inputs.demographics)?;
        let geometry = load_geometry(&inputs.geometry)?;

        let unified = Joiner::new(&agriculture)?
            .join(&election)?
            .join(&demographics)?
            .join(&geometry)?
            .finish();
        let matches = unified.matches().to_vec();

        let derived = Aggregator::new(config.derive.intensity).derive(unified)?;
        log_allocations(&derived);

        // Resolve every visualization before the first file is written
        let renderer = config.renderer();
        let specs = config.visualizations();
        let prepared = specs
            .iter()
            .map(|spec| renderer.prepare(&derived, spec))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        fs::create_dir_all(&config.output_dir).map_err(|err| RenderError::Io {
            path: config.output_dir.clone(),
            err,
        })?;

        let images = prepared
            .iter()
            .map(|image| renderer.write(image, &config.output_dir))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(
            "Pipeline finished: {} counties, {} images in {:.2}s",
            derived.len(),
            images.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(PipelineResult {
            counties: derived.len(),
            matches,
            images,
        })
    }
}

/// Categories whose share of total production is logged after every run.
const SUMMARY_CATEGORIES: [Column; 3] = [Column::PoliticalLean, Column::IncomeQuartile, Column::MajorityRace];

fn log_allocations(table: &DerivedTable) {
    for category in SUMMARY_CATEGORIES {
        if !table.has_column(category) {
            warn!("Skipping {} allocation: column not available", category);
            continue;
        }
        for allocation in table.allocation(category, Column::SoybeanBushels) {
            match allocation.share {
                Some(share) => info!(
                    "{} {}: {:.0} bushels ({:.1}%)",
                    category,
                    allocation.category,
                    allocation.total,
                    share * 100.0
                ),
                None => info!("{} {}: no reported production", category, allocation.category),
            }
        }
    }
}
