use serde::{Deserialize, Serialize};

use super::*;

/// Histogram shape and the percentiles to report on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "m")]
    pub m: u32,
    #[serde(default = "r")]
    pub r: u32,
    #[serde(default = "n")]
    pub n: u32,
    #[serde(default = "percentiles")]
    pub percentiles: Vec<f64>,
}

// 2 unit resolution, linear up to 1023, max value just over a million
fn m() -> u32 {
    1
}

fn r() -> u32 {
    10
}

fn n() -> u32 {
    20
}

fn percentiles() -> Vec<f64> {
    vec![25., 50., 75., 90., 95., 99., 99.9]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            m: m(),
            r: r(),
            n: n(),
            percentiles: percentiles(),
        }
    }
}

impl Config {
    pub fn histo(&self) -> Result<Histo> {
        Histo::new(self.m, self.r, self.n)
    }

    /// A profile sized to and loaded with `percentiles`.
    pub fn profile(&self) -> Result<PercentileProfile> {
        let mut profile = PercentileProfile::new(self.percentiles.len())?;
        profile.set(&self.percentiles)?;
        Ok(profile)
    }
}

#[test]
fn defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());

    let histo = config.histo().unwrap();
    assert_eq!(histo.bucket_count(), (20 - 10 + 2) * 256);
    let profile = config.profile().unwrap();
    assert_eq!(profile.len(), 7);
    assert_eq!(profile.capacity(), 7);
}

#[test]
fn from_toml() {
    let config: Config = toml::from_str(
        r#"
        m = 0
        r = 4
        n = 4
        percentiles = [50.0, 90.0, 100.0]
        "#,
    )
    .unwrap();

    let histo = config.histo().unwrap();
    let mut profile = config.profile().unwrap();
    for value in 1..=10 {
        histo.record(value, 1).unwrap();
    }
    histo.report_multi(&mut profile).unwrap();
    assert_eq!(profile.results(), &[5, 9, 10][..]);
    assert_eq!((profile.min(), profile.max()), (1, 10));
}

#[test]
fn invalid_config() {
    let config: Config = toml::from_str("m = 5\nr = 5").unwrap();
    assert_eq!(config.histo().unwrap_err(), Error::Shape { m: 5, r: 5, n: 20 });

    let config: Config = toml::from_str("percentiles = [90.0, 50.0]").unwrap();
    assert_eq!(config.profile().unwrap_err(), Error::Order);
}
