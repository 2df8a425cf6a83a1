//! Renderer stage: turns the derived table plus a [`VisualizationSpec`] into
//! exactly one image file.
//!
//! Every column lookup and colour scale is resolved in [`Renderer::prepare`]
//! before anything touches the disk. [`Renderer::write`] draws into a temp file
//! next to its destination and only persists it under the final name once
//! drawing succeeded.
//!
//! Text is set in DejaVu Sans, compiled into the binary and registered with
//! plotters on first use, so output never depends on the host's fonts.

pub mod chart;
pub mod color;
pub mod map;

use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use once_cell::sync::Lazy;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::constants::{NO_DATA_COLOR, SOYBEAN_GREENS};
use crate::derive::{category_labels, stats, DerivedRecord, DerivedTable};
use crate::error::RenderError;
use crate::types::{Column, CountyCode};

use chart::{Bar, PointGroup, ScatterAxes};
use color::{category_color, category_ramp, parse_hex};
use map::{LegendEntry, MapFeature};

pub(crate) const FONT: &str = "sans-serif";

static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

// plotters' own defaults (axis labels, captions) also ask for "sans-serif"
static FONT_READY: Lazy<bool> = Lazy::new(|| register_font(FONT, FontStyle::Normal, BUNDLED_FONT).is_ok());

fn ensure_font() -> Result<(), RenderError> {
    if *FONT_READY {
        Ok(())
    } else {
        Err(RenderError::Backend("bundled font could not be loaded".to_string()))
    }
}

pub(crate) fn backend_err<E>(err: DrawingAreaErrorKind<E>) -> RenderError
where
    E: std::error::Error + Send + Sync,
{
    RenderError::Backend(err.to_string())
}

/// One image to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    pub title: String,
    /// File name inside the output directory; the extension picks the format.
    pub file: String,
    pub chart: Chart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    /// Counties shaded by one metric.
    Choropleth { metric: String, scale: ColorScale },
    Scatter {
        x: String,
        y: String,
        #[serde(default)]
        hue: Option<String>,
        #[serde(default)]
        log_y: bool,
    },
    /// Sum of `metric` per label of `category`.
    Bar { category: String, metric: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorScale {
    /// Equal-count bins over the positive values, one per palette colour.
    Quantiles { palette: Vec<String> },
    /// Hue from a category label, lightness from the metric relative to its
    /// maximum. Counties with no or zero production stay grey.
    ShadeByCategory {
        category: String,
        #[serde(default = "default_min_intensity")]
        min_intensity: f64,
    },
}

fn default_min_intensity() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Svg,
    Png,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok(ImageFormat::Svg),
            Some(ext) if ext.eq_ignore_ascii_case("png") => Ok(ImageFormat::Png),
            _ => Err(RenderError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }
}

/// The stock visualisation set: production map, politics and race overlays,
/// and the income scatter. `allocation_charts` adds the two bar charts.
pub fn default_visualizations(format: ImageFormat, allocation_charts: bool) -> Vec<VisualizationSpec> {
    let file = |stem: &str| format!("{stem}.{}", format.extension());
    let mut specs = vec![
        VisualizationSpec {
            title: "US Soybean Production by County".to_string(),
            file: file("output_soybean_map"),
            chart: Chart::Choropleth {
                metric: Column::SoybeanBushels.name().to_string(),
                scale: ColorScale::Quantiles {
                    palette: SOYBEAN_GREENS.iter().map(|c| c.to_string()).collect(),
                },
            },
        },
        VisualizationSpec {
            title: "Soybean Production Intensity by County Political Lean".to_string(),
            file: file("map_politics_soy"),
            chart: Chart::Choropleth {
                metric: Column::ProductionIntensity.name().to_string(),
                scale: ColorScale::ShadeByCategory {
                    category: Column::PoliticalLean.name().to_string(),
                    min_intensity: 0.1,
                },
            },
        },
        VisualizationSpec {
            title: "Soybean Production Intensity by County Majority Demographic".to_string(),
            file: file("map_race_soy"),
            chart: Chart::Choropleth {
                metric: Column::ProductionIntensity.name().to_string(),
                scale: ColorScale::ShadeByCategory {
                    category: Column::MajorityRace.name().to_string(),
                    min_intensity: 0.2,
                },
            },
        },
        VisualizationSpec {
            title: "Median Household Income vs Soybean Production".to_string(),
            file: file("output_economic_scatter"),
            chart: Chart::Scatter {
                x: Column::MedianIncome.name().to_string(),
                y: Column::SoybeanBushels.name().to_string(),
                hue: Some(Column::PoliticalLean.name().to_string()),
                log_y: true,
            },
        },
    ];

    if allocation_charts {
        specs.push(VisualizationSpec {
            title: "Soybean Production by County Political Lean".to_string(),
            file: file("output_political_allocation"),
            chart: Chart::Bar {
                category: Column::PoliticalLean.name().to_string(),
                metric: Column::SoybeanBushels.name().to_string(),
            },
        });
        specs.push(VisualizationSpec {
            title: "Soybean Production by County Majority Demographic".to_string(),
            file: file("output_demographic_dist"),
            chart: Chart::Bar {
                category: Column::MajorityRace.name().to_string(),
                metric: Column::SoybeanBushels.name().to_string(),
            },
        });
    }
    specs
}

/// Everything needed to draw one image, computed up front.
enum Plot<'a> {
    Map {
        features: Vec<MapFeature<'a>>,
        legend: Vec<LegendEntry>,
        legend_title: &'static str,
    },
    Scatter {
        groups: Vec<PointGroup>,
        x_desc: String,
        y_desc: String,
        log_y: bool,
    },
    Bars {
        bars: Vec<Bar>,
        y_desc: &'static str,
    },
}

/// A visualization with every column and colour resolved, ready to draw.
pub struct PreparedImage<'a> {
    title: &'a str,
    file: &'a str,
    format: ImageFormat,
    plot: Plot<'a>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    width: u32,
    height: u32,
    excluded_states: Vec<String>,
}

impl Renderer {
    pub fn new(width: u32, height: u32, excluded_states: Vec<String>) -> Self {
        Self {
            width,
            height,
            excluded_states,
        }
    }

    /// Draw `spec` into `output_dir`, returning the written path.
    pub fn render(
        &self,
        table: &DerivedTable,
        spec: &VisualizationSpec,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        let image = self.prepare(table, spec)?;
        self.write(&image, output_dir)
    }

    /// Resolve columns, colours and geometry for `spec` without writing.
    pub fn prepare<'a>(
        &self,
        table: &'a DerivedTable,
        spec: &'a VisualizationSpec,
    ) -> Result<PreparedImage<'a>, RenderError> {
        let format = ImageFormat::from_path(Path::new(&spec.file))?;
        ensure_font()?;
        let plot = self.plan(table, spec)?;
        Ok(PreparedImage {
            title: &spec.title,
            file: &spec.file,
            format,
            plot,
        })
    }

    #[instrument(skip_all, fields(file = %image.file))]
    pub fn write(&self, image: &PreparedImage<'_>, output_dir: &Path) -> Result<PathBuf, RenderError> {
        let format = image.format;
        let target = output_dir.join(image.file);

        let io_err = |err: std::io::Error| RenderError::Io {
            path: target.clone(),
            err,
        };
        let tmp = tempfile::Builder::new()
            .prefix(".soymap-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(output_dir)
            .map_err(io_err)?;
        debug!("Drawing into {}", tmp.path().display());

        let size = (self.width, self.height);
        match format {
            ImageFormat::Svg => {
                let root = SVGBackend::new(tmp.path(), size).into_drawing_area();
                draw(&root, image.title, &image.plot)?;
                root.present().map_err(backend_err)?;
            }
            ImageFormat::Png => {
                let root = BitMapBackend::new(tmp.path(), size).into_drawing_area();
                draw(&root, image.title, &image.plot)?;
                root.present().map_err(backend_err)?;
            }
        }

        tmp.persist(&target).map_err(|e| io_err(e.error))?;
        info!("Wrote {}", target.display());
        Ok(target)
    }

    fn plan<'a>(&self, table: &'a DerivedTable, spec: &VisualizationSpec) -> Result<Plot<'a>, RenderError> {
        match &spec.chart {
            Chart::Choropleth { metric, scale } => {
                let metric = resolve_metric(table, metric)?;
                if !table.has_column(Column::Geometry) {
                    return Err(RenderError::MissingGeometry(spec.title.clone()));
                }
                let records: Vec<&DerivedRecord> = table
                    .records()
                    .iter()
                    .filter(|r| !self.is_excluded(r.code()))
                    .collect();
                let (fills, legend, legend_title) = match scale {
                    ColorScale::Quantiles { palette } => quantile_fills(&records, metric, palette)?,
                    ColorScale::ShadeByCategory {
                        category,
                        min_intensity,
                    } => {
                        let category = resolve_category(table, category)?;
                        category_fills(&records, metric, category, *min_intensity)?
                    }
                };
                let no_data = parse_hex(NO_DATA_COLOR)?;
                let background = table
                    .background()
                    .iter()
                    .filter(|b| !self.is_excluded(&b.code))
                    .map(|b| MapFeature {
                        shape: &b.shape,
                        fill: no_data,
                    });
                let counties = records.into_iter().zip(fills).filter_map(|(record, fill)| {
                    record
                        .county
                        .geometry
                        .as_ref()
                        .map(|shape| MapFeature { shape, fill })
                });
                let features = background.chain(counties).collect();
                Ok(Plot::Map {
                    features,
                    legend,
                    legend_title,
                })
            }
            Chart::Scatter { x, y, hue, log_y } => {
                let x = resolve_metric(table, x)?;
                let y = resolve_metric(table, y)?;
                let hue = hue.as_deref().map(|h| resolve_category(table, h)).transpose()?;
                let groups = scatter_groups(table.records(), x, y, hue, *log_y);
                if groups.is_empty() {
                    return Err(RenderError::NoData(y.name().to_string()));
                }
                let y_desc = if *log_y {
                    format!("{} (log scale)", y.label())
                } else {
                    y.label().to_string()
                };
                Ok(Plot::Scatter {
                    groups,
                    x_desc: x.label().to_string(),
                    y_desc,
                    log_y: *log_y,
                })
            }
            Chart::Bar { category, metric } => {
                let category = resolve_category(table, category)?;
                let metric = resolve_metric(table, metric)?;
                let bars = table
                    .allocation(category, metric)
                    .into_iter()
                    .map(|a| Bar {
                        label: a.category.to_string(),
                        value: a.total,
                        share: a.share,
                        color: category_color(Some(a.category)),
                    })
                    .collect();
                Ok(Plot::Bars {
                    bars,
                    y_desc: metric.label(),
                })
            }
        }
    }

    fn is_excluded(&self, code: &CountyCode) -> bool {
        let state = code.state_code();
        self.excluded_states.iter().any(|s| s == state)
    }
}

fn draw<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    title: &str,
    plot: &Plot<'_>,
) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(backend_err)?;
    let area = root.titled(title, (FONT, 28)).map_err(backend_err)?;
    match plot {
        Plot::Map {
            features,
            legend,
            legend_title,
        } => map::draw_map(&area, features, legend, legend_title),
        Plot::Scatter {
            groups,
            x_desc,
            y_desc,
            log_y,
        } => chart::draw_scatter(
            &area,
            groups,
            &ScatterAxes {
                x_desc,
                y_desc,
                log_y: *log_y,
            },
        ),
        Plot::Bars { bars, y_desc } => chart::draw_bars(&area, bars, y_desc),
    }
}

fn resolve(table: &DerivedTable, name: &str) -> Result<Column, RenderError> {
    let column = Column::from_name(name).ok_or_else(|| RenderError::UnknownColumn(name.to_string()))?;
    if !table.has_column(column) {
        return Err(RenderError::MissingColumn {
            column: name.to_string(),
        });
    }
    Ok(column)
}

fn resolve_metric(table: &DerivedTable, name: &str) -> Result<Column, RenderError> {
    let column = resolve(table, name)?;
    if column.is_category() || column == Column::Geometry {
        return Err(RenderError::NotAMetric(name.to_string()));
    }
    Ok(column)
}

fn resolve_category(table: &DerivedTable, name: &str) -> Result<Column, RenderError> {
    let column = resolve(table, name)?;
    if !column.is_category() {
        return Err(RenderError::NotACategory(name.to_string()));
    }
    Ok(column)
}

type Fills = (Vec<RGBColor>, Vec<LegendEntry>, &'static str);

fn quantile_fills(records: &[&DerivedRecord], metric: Column, palette: &[String]) -> Result<Fills, RenderError> {
    if palette.is_empty() {
        return Err(RenderError::InvalidScale("quantile palette is empty".to_string()));
    }
    let colors = palette.iter().map(|c| parse_hex(c)).collect::<Result<Vec<_>, _>>()?;
    let no_data = parse_hex(NO_DATA_COLOR)?;

    let positive = stats::sorted_values(records.iter().filter_map(|r| r.metric(metric)).filter(|v| *v > 0.0));
    let edges = stats::quantile_edges(&positive, colors.len())
        .ok_or_else(|| RenderError::NoData(metric.name().to_string()))?;

    let fills = records
        .iter()
        .map(|r| match r.metric(metric) {
            Some(value) if value > 0.0 => colors[stats::bin_index(&edges, value).min(colors.len() - 1)],
            _ => no_data,
        })
        .collect();

    let mut legend: Vec<LegendEntry> = colors
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let label = format!(
                "{} - {}",
                chart::format_quantity(edges[i]),
                chart::format_quantity(edges[i + 1])
            );
            (*color, label)
        })
        .collect();
    legend.push((no_data, "No data".to_string()));

    Ok((fills, legend, metric.label()))
}

fn category_fills(
    records: &[&DerivedRecord],
    metric: Column,
    category: Column,
    min_intensity: f64,
) -> Result<Fills, RenderError> {
    let no_data = parse_hex(NO_DATA_COLOR)?;
    let max = records
        .iter()
        .filter_map(|r| r.metric(metric))
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);

    let fills = records
        .iter()
        .map(|r| {
            let producing = r.metric(Column::SoybeanBushels).map_or(false, |b| b > 0.0);
            match r.metric(metric) {
                Some(value) if producing && value > 0.0 && max > 0.0 => {
                    let t = (value / max).clamp(min_intensity, 1.0);
                    category_ramp(r.category(category)).at(t)
                }
                _ => no_data,
            }
        })
        .collect();

    let mut legend: Vec<LegendEntry> = category_labels(category)
        .into_iter()
        .map(|label| (category_ramp(Some(label)).at(0.8), label.to_string()))
        .collect();
    legend.push((no_data, "No production".to_string()));

    Ok((fills, legend, category.label()))
}

fn scatter_groups(
    records: &[DerivedRecord],
    x: Column,
    y: Column,
    hue: Option<Column>,
    log_y: bool,
) -> Vec<PointGroup> {
    let point = |r: &DerivedRecord| {
        let (x, y) = (r.metric(x)?, r.metric(y)?);
        if log_y {
            (y > 0.0).then(|| (x, y.log10()))
        } else {
            Some((x, y))
        }
    };

    let groups: Vec<PointGroup> = match hue {
        None => vec![PointGroup {
            label: y.label().to_string(),
            color: category_color(None),
            points: records.iter().filter_map(point).collect(),
        }],
        Some(hue) => {
            let mut labels: Vec<Option<&'static str>> = category_labels(hue).into_iter().map(Some).collect();
            labels.push(None);
            labels
                .into_iter()
                .map(|label| PointGroup {
                    label: label.unwrap_or("Unknown").to_string(),
                    color: category_color(label),
                    points: records
                        .iter()
                        .filter(|r| r.category(hue) == label)
                        .filter_map(point)
                        .collect(),
                })
                .collect()
        }
    };

    groups.into_iter().filter(|g| !g.points.is_empty()).collect()
}
