//! Flat configuration bundle (SPEC_FULL.md §4.10/§6): every tunable named
//! throughout §4, plus a tolerant `key = value` file loader grounded on
//! `cvdi.hpp`'s `Config` class in the reference implementation, which warns
//! on an unrecognised key instead of failing.

use std::io::BufRead;
use std::path::Path;

use crate::area::AreaFitterConfig;
use crate::critical::{StopDetectorConfig, TurnAroundConfig};
use crate::error::{AppError, Result};
use crate::matcher::MatcherConfig;
use crate::privacy::PrivacyConfig;

/// The full set of keys a batch run may be tuned with, mirroring the
/// defaults named in SPEC_FULL.md §4.3-§4.9.
#[derive(Debug, Clone)]
pub struct Config {
    pub save_mm: bool,
    pub plot_kml: bool,
    pub count_points: bool,

    pub fit_ext: f64,
    pub map_fit_scale: f64,
    pub n_heading_groups: u32,
    pub min_edge_trip_points: u32,

    pub ta_max_q_size: usize,
    pub ta_area_width: f64,
    pub ta_max_speed: f64,
    pub ta_heading_delta: f64,

    pub stop_max_time: i64,
    pub stop_min_distance: f64,
    pub stop_max_speed: f64,

    pub min_direct_distance: f64,
    pub max_direct_distance: f64,
    pub min_manhattan_distance: f64,
    pub max_manhattan_distance: f64,
    pub min_out_degree: u64,
    pub max_out_degree: u64,
    pub rand_direct_distance: f64,
    pub rand_manhattan_distance: f64,
    pub rand_out_degree: f64,

    pub kml_stride: usize,
    pub kml_suppress_di: bool,

    pub gps_sigma: f64,
    pub gps_sigma_azimuth: f64,
    pub match_radius: f64,
    pub max_route_dist: f64,
    pub beta_lambda: f64,
    pub shorten_turns: bool,

    pub thread_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        let matcher = MatcherConfig::default();
        let area = AreaFitterConfig::default();
        let ta = TurnAroundConfig::default();
        let stop = StopDetectorConfig::default();
        let privacy = PrivacyConfig::default();

        Config {
            save_mm: false,
            plot_kml: false,
            count_points: true,

            fit_ext: area.fit_ext,
            map_fit_scale: area.map_fit_scale,
            n_heading_groups: area.n_heading_groups,
            min_edge_trip_points: area.min_edge_trip_points,

            ta_max_q_size: ta.max_q,
            ta_area_width: ta.area_width,
            ta_max_speed: ta.max_speed,
            ta_heading_delta: ta.heading_delta,

            stop_max_time: stop.max_time_us,
            stop_min_distance: stop.min_distance,
            stop_max_speed: stop.max_speed,

            min_direct_distance: privacy.min_direct_distance,
            max_direct_distance: privacy.max_direct_distance,
            min_manhattan_distance: privacy.min_manhattan_distance,
            max_manhattan_distance: privacy.max_manhattan_distance,
            min_out_degree: privacy.min_out_degree,
            max_out_degree: privacy.max_out_degree,
            rand_direct_distance: privacy.rand_direct_distance,
            rand_manhattan_distance: privacy.rand_manhattan_distance,
            rand_out_degree: privacy.rand_out_degree,

            kml_stride: 1,
            kml_suppress_di: true,

            gps_sigma: matcher.sigma_z,
            gps_sigma_azimuth: matcher.sigma_a,
            match_radius: matcher.radius,
            max_route_dist: matcher.max_route_distance,
            beta_lambda: matcher.lambda,
            shorten_turns: matcher.shorten_turns,

            thread_count: default_thread_count(),
        }
    }
}

/// `hardware_threads + hardware_threads/2`, per SPEC_FULL.md §5.
pub fn default_thread_count() -> usize {
    let cores = num_cpus::get().max(1);
    cores + cores / 2
}

impl Config {
    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            sigma_z: self.gps_sigma,
            sigma_a: self.gps_sigma_azimuth,
            radius: self.match_radius,
            lambda: self.beta_lambda,
            max_route_distance: self.max_route_dist,
            shorten_turns: self.shorten_turns,
            ..MatcherConfig::default()
        }
    }

    pub fn area_config(&self) -> AreaFitterConfig {
        AreaFitterConfig {
            fit_ext: self.fit_ext,
            map_fit_scale: self.map_fit_scale,
            n_heading_groups: self.n_heading_groups,
            min_edge_trip_points: self.min_edge_trip_points,
        }
    }

    pub fn stop_config(&self) -> StopDetectorConfig {
        StopDetectorConfig {
            max_time_us: self.stop_max_time,
            min_distance: self.stop_min_distance,
            max_speed: self.stop_max_speed,
            ..StopDetectorConfig::default()
        }
    }

    pub fn turnaround_config(&self) -> TurnAroundConfig {
        TurnAroundConfig {
            max_q: self.ta_max_q_size,
            area_width: self.ta_area_width,
            max_speed: self.ta_max_speed,
            heading_delta: self.ta_heading_delta,
        }
    }

    pub fn privacy_config(&self) -> PrivacyConfig {
        PrivacyConfig {
            min_direct_distance: self.min_direct_distance,
            max_direct_distance: self.max_direct_distance,
            min_manhattan_distance: self.min_manhattan_distance,
            max_manhattan_distance: self.max_manhattan_distance,
            min_out_degree: self.min_out_degree,
            max_out_degree: self.max_out_degree,
            rand_direct_distance: self.rand_direct_distance,
            rand_manhattan_distance: self.rand_manhattan_distance,
            rand_out_degree: self.rand_out_degree,
        }
    }
}

fn apply_key(cfg: &mut Config, key: &str, value: &str, line_no: usize) {
    macro_rules! set_f64 {
        ($field:ident) => {
            match value.parse::<f64>() {
                Ok(v) => cfg.$field = v,
                Err(_) => log::warn!("config line {}: invalid number for {}: {:?}", line_no, key, value),
            }
        };
    }
    macro_rules! set_u64 {
        ($field:ident) => {
            match value.parse::<u64>() {
                Ok(v) => cfg.$field = v,
                Err(_) => log::warn!("config line {}: invalid integer for {}: {:?}", line_no, key, value),
            }
        };
    }
    macro_rules! set_usize {
        ($field:ident) => {
            match value.parse::<usize>() {
                Ok(v) => cfg.$field = v,
                Err(_) => log::warn!("config line {}: invalid integer for {}: {:?}", line_no, key, value),
            }
        };
    }
    macro_rules! set_bool {
        ($field:ident) => {
            match value.parse::<bool>() {
                Ok(v) => cfg.$field = v,
                Err(_) => log::warn!("config line {}: invalid boolean for {}: {:?}", line_no, key, value),
            }
        };
    }
    macro_rules! set_u32 {
        ($field:ident) => {
            match value.parse::<u32>() {
                Ok(v) => cfg.$field = v,
                Err(_) => log::warn!("config line {}: invalid integer for {}: {:?}", line_no, key, value),
            }
        };
    }

    match key {
        "save_mm" => set_bool!(save_mm),
        "plot_kml" => set_bool!(plot_kml),
        "count_points" => set_bool!(count_points),
        "fit_ext" => set_f64!(fit_ext),
        "scale_map_fit" | "map_fit_scale" => set_f64!(map_fit_scale),
        "n_heading_groups" => set_u32!(n_heading_groups),
        "min_edge_trip_points" => set_u32!(min_edge_trip_points),
        "ta_max_q_size" => set_usize!(ta_max_q_size),
        "ta_area_width" => set_f64!(ta_area_width),
        "ta_max_speed" => set_f64!(ta_max_speed),
        "ta_heading_delta" => set_f64!(ta_heading_delta),
        "stop_max_time" => match value.parse::<i64>() {
            Ok(v) => cfg.stop_max_time = v,
            Err(_) => log::warn!("config line {}: invalid integer for {}: {:?}", line_no, key, value),
        },
        "stop_min_distance" => set_f64!(stop_min_distance),
        "stop_max_speed" => set_f64!(stop_max_speed),
        "min_direct_distance" => set_f64!(min_direct_distance),
        "max_direct_distance" => set_f64!(max_direct_distance),
        "min_manhattan_distance" => set_f64!(min_manhattan_distance),
        "max_manhattan_distance" => set_f64!(max_manhattan_distance),
        "min_out_degree" => set_u64!(min_out_degree),
        "max_out_degree" => set_u64!(max_out_degree),
        "rand_direct_distance" => set_f64!(rand_direct_distance),
        "rand_manhattan_distance" => set_f64!(rand_manhattan_distance),
        "rand_out_degree" => set_f64!(rand_out_degree),
        "kml_stride" => set_usize!(kml_stride),
        "kml_suppress_di" => set_bool!(kml_suppress_di),
        "gps_sigma" => set_f64!(gps_sigma),
        "gps_sigma_azimuth" => set_f64!(gps_sigma_azimuth),
        "match_radius" => set_f64!(match_radius),
        "max_route_dist" => set_f64!(max_route_dist),
        "beta_lambda" => set_f64!(beta_lambda),
        "shorten_turns" => set_bool!(shorten_turns),
        "thread_count" => set_usize!(thread_count),
        _ => log::warn!("config line {}: ignoring unrecognised key {:?}", line_no, key),
    }
}

/// Load a `key = value` config file, `#`-prefixed comments and blank lines
/// ignored. Unrecognised keys and malformed values are warned about and
/// skipped rather than treated as fatal, per SPEC_FULL.md §4.10.
pub fn load(path: &Path) -> Result<Config> {
    let file = std::fs::File::open(path).map_err(AppError::from)?;
    let mut cfg = Config::default();

    for (i, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(AppError::from)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("config line {}: missing '=', ignoring: {:?}", i + 1, line);
            continue;
        };
        apply_key(&mut cfg, key.trim(), value.trim(), i + 1);
    }

    Ok(cfg)
}
