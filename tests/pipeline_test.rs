use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use soymap::config::Config;
use soymap::error::Stage;
use soymap::pipeline::Pipeline;
use soymap::render::{Chart, ImageFormat, VisualizationSpec};
use soymap::types::SourceKind;
use tempfile::tempdir;

const AGRICULTURE: &str = "\
state_name,state_ansi,county_ansi,county_name,Value
IOWA,19,001,ADAIR,\"1,250,000\"
IOWA,19,003,ADAMS,\"840,000\"
IOWA,19,005,ALLAMAKEE,(D)
IOWA,19,007,APPANOOSE,\"410,500\"
IOWA,19,,OTHER (COMBINED) COUNTIES,\"95,000\"
ALASKA,2,013,ALEUTIANS EAST,0
";

// 19007 has no election row
const ELECTION: &str = "\
state_name,county_fips,county_name,votes_gop,votes_dem,total_votes
Iowa,19001,Adair County,2917,1197,4200
Iowa,19003,Adams County,1677,565,2300
Iowa,19005,Allamakee County,0,0,0
Alaska,2013,Aleutians East Borough,425,300,750
";

const DEMOGRAPHICS: &str = r#"[
["NAME","B19013_001E","B15003_001E","B15003_022E","B03002_001E","B03002_003E","B03002_004E","B03002_012E","state","county"],
["Adair County, Iowa","61250","5400","700","7400","7100","40","150","19","001"],
["Adams County, Iowa","55300","2700","310","3600","3450","20","60","19","003"],
["Allamakee County, Iowa","58100","10300","1200","14000","12400","100","1300","19","005"],
["Appanoose County, Iowa","-666666666","8800","900","12300","11800","120","250","19","007"],
["Aleutians East Borough, Alaska","71000","2500","300","3400","400","300","500","02","013"]
]"#;

fn square(geoid: &str, lon: f64, lat: f64) -> String {
    format!(
        r#"{{"type":"Feature","properties":{{"GEOID":"{geoid}"}},"geometry":{{"type":"Polygon","coordinates":[[[{lon},{lat}],[{e},{lat}],[{e},{n}],[{lon},{n}],[{lon},{lat}]]]}}}}"#,
        e = lon + 0.4,
        n = lat + 0.3,
    )
}

fn geometry() -> String {
    let features = [
        square("19001", -94.5, 41.2),
        square("19003", -94.7, 40.9),
        square("19005", -91.5, 43.2),
        square("19007", -92.9, 40.6),
        square("02013", -161.0, 55.0),
    ];
    format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
}

/// Writes the four source files and returns a config pointing at them.
fn fixture(dir: &Path) -> Result<Config> {
    let data = dir.join("data");
    fs::create_dir_all(&data)?;
    fs::write(data.join("soybeans.csv"), AGRICULTURE)?;
    fs::write(data.join("election.csv"), ELECTION)?;
    fs::write(data.join("acs.json"), DEMOGRAPHICS)?;
    fs::write(data.join("counties.geojson"), geometry())?;

    let mut config = Config::default();
    config.output_dir = dir.join("out");
    config.inputs.agriculture = data.join("soybeans.csv");
    config.inputs.election = data.join("election.csv");
    config.inputs.demographics = data.join("acs.json");
    config.inputs.geometry = data.join("counties.geojson");
    config.render.width = 640;
    config.render.height = 400;
    Ok(config)
}

fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[test]
fn test_default_run_writes_four_images() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = fixture(temp_dir.path())?;

    let result = Pipeline::run(&config)?;

    // Anchor defines the row set: the roll-up row is skipped, every other row kept
    assert_eq!(result.counties, 5);
    assert_eq!(result.images.len(), 4);
    assert_eq!(
        file_names(&config.output_dir)?,
        vec![
            "map_politics_soy.svg",
            "map_race_soy.svg",
            "output_economic_scatter.svg",
            "output_soybean_map.svg",
        ]
    );

    let election = result
        .matches
        .iter()
        .find(|m| m.dataset == SourceKind::Election)
        .expect("election match stats");
    assert_eq!(election.rows, 4);
    assert_eq!(election.matched, 4);

    let map = fs::read_to_string(config.output_dir.join("output_soybean_map.svg"))?;
    assert!(map.contains("US Soybean Production by County"));
    Ok(())
}

#[test]
fn test_rerun_is_byte_identical() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = fixture(temp_dir.path())?;

    let first: Vec<(PathBuf, Vec<u8>)> = Pipeline::run(&config)?
        .images
        .into_iter()
        .map(|path| {
            let bytes = fs::read(&path).unwrap_or_default();
            (path, bytes)
        })
        .collect();
    let second = Pipeline::run(&config)?;

    assert_eq!(first.len(), second.images.len());
    for (path, bytes) in &first {
        assert!(!bytes.is_empty());
        assert_eq!(&fs::read(path)?, bytes, "{} changed between runs", path.display());
    }
    Ok(())
}

#[test]
fn test_png_format_with_allocation_charts() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = fixture(temp_dir.path())?;
    config.render.format = ImageFormat::Png;
    config.render.allocation_charts = true;

    let result = Pipeline::run(&config)?;

    assert_eq!(result.images.len(), 6);
    let names = file_names(&config.output_dir)?;
    assert!(names.iter().all(|n| n.ends_with(".png")));
    assert!(names.contains(&"output_political_allocation.png".to_string()));
    assert!(names.contains(&"output_demographic_dist.png".to_string()));
    Ok(())
}

#[test]
fn test_missing_source_fails_load_stage() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = fixture(temp_dir.path())?;
    config.inputs.election = temp_dir.path().join("data/nope.csv");

    let err = Pipeline::run(&config).unwrap_err();

    assert_eq!(err.stage(), Stage::Load);
    assert!(err.to_string().starts_with("load stage failed"));
    assert!(!config.output_dir.exists());
    Ok(())
}

#[test]
fn test_unknown_metric_fails_render_stage() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = fixture(temp_dir.path())?;
    config.visualizations = Some(vec![VisualizationSpec {
        title: "Yield".to_string(),
        file: "yield.svg".to_string(),
        chart: Chart::Scatter {
            x: "median_household_income".to_string(),
            y: "soybean_yield".to_string(),
            hue: None,
            log_y: false,
        },
    }]);

    let err = Pipeline::run(&config).unwrap_err();

    assert_eq!(err.stage(), Stage::Render);
    assert!(err.to_string().contains("soybean_yield"));
    assert!(!config.output_dir.exists());
    Ok(())
}

#[test]
fn test_bad_later_visualization_writes_no_images() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = fixture(temp_dir.path())?;
    let mut specs = config.visualizations();
    specs.truncate(1);
    specs.push(VisualizationSpec {
        title: "Yield".to_string(),
        file: "yield.svg".to_string(),
        chart: Chart::Bar {
            category: "political_lean".to_string(),
            metric: "yield".to_string(),
        },
    });
    config.visualizations = Some(specs);

    let err = Pipeline::run(&config).unwrap_err();
    assert_eq!(err.stage(), Stage::Render);
    assert!(!config.output_dir.exists());

    // Same failure with an output directory left over from an earlier run
    fs::create_dir_all(&config.output_dir)?;
    let err = Pipeline::run(&config).unwrap_err();
    assert_eq!(err.stage(), Stage::Render);
    assert!(file_names(&config.output_dir)?.is_empty());
    Ok(())
}

#[test]
fn test_map_keeps_boundaries_without_production() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = fixture(temp_dir.path())?;
    let features = geometry();
    let features = features.strip_suffix("]}").unwrap_or(&features);
    // Boundary with no soybean row
    let geojson = format!("{features},{}]}}", square("32003", -117.0, 38.0));
    fs::write(&config.inputs.geometry, geojson)?;

    let result = Pipeline::run(&config)?;

    assert_eq!(result.counties, 5);
    let map = fs::read_to_string(config.output_dir.join("output_soybean_map.svg"))?;
    // four Iowa counties plus 32003; Alaska stays off the map
    assert_eq!(map.matches("<polygon").count(), 5);
    Ok(())
}

#[test]
fn test_disjoint_codes_fail_join_stage() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = fixture(temp_dir.path())?;
    fs::write(
        &config.inputs.election,
        "county_fips,votes_gop,votes_dem,total_votes\n48001,10,5,15\n",
    )?;

    let err = Pipeline::run(&config).unwrap_err();

    assert_eq!(err.stage(), Stage::Join);
    Ok(())
}
