//! Source column names, census sentinels and output defaults.

// USDA NASS Quick Stats export (agriculture)
pub const NASS_STATE_ANSI: &str = "state_ansi";
pub const NASS_COUNTY_ANSI: &str = "county_ansi";
pub const NASS_STATE_NAME: &str = "state_name";
pub const NASS_COUNTY_NAME: &str = "county_name";
pub const NASS_VALUE: &str = "Value";

// County-level presidential results (election)
pub const ELECTION_FIPS: &str = "county_fips";
pub const ELECTION_STATE_NAME: &str = "state_name";
pub const ELECTION_COUNTY_NAME: &str = "county_name";
pub const ELECTION_VOTES_DEM: &str = "votes_dem";
pub const ELECTION_VOTES_GOP: &str = "votes_gop";
pub const ELECTION_TOTAL_VOTES: &str = "total_votes";

// ACS 5-year detailed tables (demographics)
pub const ACS_STATE: &str = "state";
pub const ACS_COUNTY: &str = "county";
pub const ACS_MEDIAN_INCOME: &str = "B19013_001E";
pub const ACS_POP_25_PLUS: &str = "B15003_001E";
pub const ACS_BACHELORS: &str = "B15003_022E";
pub const ACS_TOTAL_POPULATION: &str = "B03002_001E";
pub const ACS_WHITE: &str = "B03002_003E";
pub const ACS_BLACK: &str = "B03002_004E";
pub const ACS_HISPANIC: &str = "B03002_012E";

/// ACS annotation values standing in for "no estimate available".
pub const ACS_JAM_VALUES: [f64; 6] = [
    -666_666_666.0,
    -999_999_999.0,
    -888_888_888.0,
    -555_555_555.0,
    -333_333_333.0,
    -222_222_222.0,
];

// Census cartographic boundary files (geometry)
pub const GEO_GEOID: &str = "GEOID";
pub const GEO_STATEFP: &str = "STATEFP";
pub const GEO_COUNTYFP: &str = "COUNTYFP";
pub const GEO_NAME: &str = "NAME";

/// Alaska, Hawaii and Puerto Rico; dropped from maps to keep the lower 48 legible.
pub const DEFAULT_EXCLUDED_STATES: [&str; 3] = ["02", "15", "72"];

pub const DEFAULT_CONFIG_FILE: &str = "soymap.toml";
pub const CONFIG_ENV_VAR: &str = "SOYMAP_CONFIG";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Light grey for counties without production data
pub const NO_DATA_COLOR: &str = "#f0f0f0";

/// Five-step green ramp for the production quantile map
pub const SOYBEAN_GREENS: [&str; 5] = ["#c7e9c0", "#74c476", "#41ab5d", "#238b45", "#005a32"];
