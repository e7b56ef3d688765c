// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Multi-source configuration for the simulator binary.
//!
//! Settings are merged in priority order: command-line arguments, then
//! `TESSERA_*` environment variables, then an optional TOML file given
//! with `--conf-file`, then the [`SimConfig`] defaults. The CLI only
//! carries the most common knobs; the TOML file and environment can set
//! every field of [`SimConfig`].

use std::path::PathBuf;

use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tessera_engine::sim_error;
use tessera_engine::types::SimError;
use tessera_models::cache::CacheConfig;
use tessera_models::coherence::CoherenceConfig;
use tessera_models::core_model::CoreConfig;

/// The fully merged simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    pub num_tiles: usize,
    /// Interconnect traversal latency in ticks.
    pub net_delay_ticks: usize,
    /// Buffered messages per tile on the interconnect's egress side.
    pub net_buffer_capacity: usize,
    pub requests_per_core: usize,
    pub max_outstanding: usize,
    /// Lines in the shared window the cores hammer.
    pub num_lines: usize,
    pub write_percent: u8,
    /// Ticks each core keeps the simulation open after its quota, so
    /// in-flight protocol traffic can settle.
    pub drain_ticks: u64,
    pub seed: u64,
    pub l1_num_lines: usize,
    pub l1_associativity: usize,
    pub l2_num_lines: usize,
    pub l2_associativity: usize,
    pub dram_latency: u64,
    pub log_level: String,
    /// Record trace events (enter/exit of tracked messages).
    pub trace: bool,
    /// Per-entity log level overrides, each of the form `regex=level`.
    pub log_filters: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_tiles: 4,
            net_delay_ticks: 2,
            net_buffer_capacity: 16,
            requests_per_core: 256,
            max_outstanding: 4,
            num_lines: 64,
            write_percent: 30,
            drain_ticks: 200,
            seed: 1,
            l1_num_lines: 64,
            l1_associativity: 2,
            l2_num_lines: 256,
            l2_associativity: 4,
            dram_latency: 16,
            log_level: "warn".to_string(),
            trace: false,
            log_filters: Vec::new(),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(about = "Tessera - a cycle-accurate tiled-multicore coherence simulator")]
pub struct Cli {
    /// Number of tiles in the simulated system
    #[arg(long)]
    num_tiles: Option<usize>,

    /// Memory requests each core issues before finishing
    #[arg(long)]
    requests_per_core: Option<usize>,

    /// Requests each core keeps in flight
    #[arg(long)]
    max_outstanding: Option<usize>,

    /// Lines in the shared address window the cores target
    #[arg(long)]
    num_lines: Option<usize>,

    /// Percentage of core requests that are writes
    #[arg(long)]
    write_percent: Option<u8>,

    /// Seed for traffic generation and arbitration shuffling
    #[arg(short, long)]
    seed: Option<u64>,

    /// Default log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Record trace events
    #[arg(long)]
    trace: bool,

    /// Per-entity log level override of the form 'regex=level'
    ///
    /// May be given multiple times; the first matching filter wins.
    #[arg(long = "log-filter")]
    log_filters: Vec<String>,

    /// Path to a TOML configuration file
    ///
    /// The file may set any field of the configuration; values from the
    /// command line and environment take priority over it.
    #[arg(long)]
    conf_file: Option<PathBuf>,
}

impl SimConfig {
    /// Parse and merge all configuration sources.
    pub fn load() -> Result<Self, SimError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, SimError> {
        let mut sources = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = &cli.conf_file {
            if !path.is_file() {
                sim_error!(format!(
                    "configuration file '{}' not found",
                    path.display()
                ));
            }
            sources = sources.merge(Toml::file(path));
        }
        let mut cfg: Self = sources
            .merge(Env::prefixed("TESSERA_"))
            .extract()
            .map_err(|e| SimError(e.to_string()))?;
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_cli(&mut self, cli: Cli) {
        if let Some(v) = cli.num_tiles {
            self.num_tiles = v;
        }
        if let Some(v) = cli.requests_per_core {
            self.requests_per_core = v;
        }
        if let Some(v) = cli.max_outstanding {
            self.max_outstanding = v;
        }
        if let Some(v) = cli.num_lines {
            self.num_lines = v;
        }
        if let Some(v) = cli.write_percent {
            self.write_percent = v;
        }
        if let Some(v) = cli.seed {
            self.seed = v;
        }
        if let Some(v) = cli.log_level {
            self.log_level = v;
        }
        if cli.trace {
            self.trace = true;
        }
        if !cli.log_filters.is_empty() {
            self.log_filters = cli.log_filters;
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.num_tiles == 0 {
            sim_error!("num_tiles must be at least one");
        }
        if self.max_outstanding == 0 {
            sim_error!("max_outstanding must be at least one");
        }
        if self.num_lines == 0 {
            sim_error!("num_lines must be at least one");
        }
        if self.write_percent > 100 {
            sim_error!("write_percent must be between 0 and 100");
        }
        Ok(())
    }

    /// The engine configuration shared by every tile; `id`, `num_nodes`
    /// and `dram_node` are filled in per tile.
    pub fn engine_template(&self) -> CoherenceConfig {
        let defaults = CoherenceConfig::default();
        CoherenceConfig {
            l1: CacheConfig {
                num_lines: self.l1_num_lines,
                associativity: self.l1_associativity,
                ..defaults.l1
            },
            l2: CacheConfig {
                num_lines: self.l2_num_lines,
                associativity: self.l2_associativity,
                ..defaults.l2
            },
            dram: tessera_models::dram::DramConfig {
                latency: self.dram_latency,
                ..defaults.dram
            },
            ..defaults
        }
    }

    /// Traffic configuration for the core on tile `index`.
    pub fn core_config(&self, index: usize) -> CoreConfig {
        CoreConfig {
            num_requests: self.requests_per_core,
            max_outstanding: self.max_outstanding,
            num_lines: self.num_lines,
            write_percent: self.write_percent,
            drain_ticks: self.drain_ticks,
            seed: self.seed.wrapping_add(index as u64),
            ..CoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    fn parse(args: &[&str]) -> Result<SimConfig, SimError> {
        let mut argv = vec!["tessera-sim"];
        argv.extend_from_slice(args);
        SimConfig::from_cli(Cli::parse_from(argv))
    }

    #[test]
    #[serial(tessera_env)]
    fn defaults_with_no_sources() {
        let cfg = parse(&[]).unwrap();
        let defaults = SimConfig::default();
        assert_eq!(cfg.num_tiles, defaults.num_tiles);
        assert_eq!(cfg.requests_per_core, defaults.requests_per_core);
        assert_eq!(cfg.seed, defaults.seed);
        assert_eq!(cfg.log_level, "warn");
        assert!(!cfg.trace);
    }

    #[test]
    #[serial(tessera_env)]
    fn cli_overrides_defaults() {
        let cfg = parse(&["--num-tiles", "8", "--write-percent", "55", "--trace"]).unwrap();
        assert_eq!(cfg.num_tiles, 8);
        assert_eq!(cfg.write_percent, 55);
        assert!(cfg.trace);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.max_outstanding, SimConfig::default().max_outstanding);
    }

    #[test]
    #[serial(tessera_env)]
    fn env_overrides_defaults() {
        unsafe { env::set_var("TESSERA_SEED", "99") };
        let cfg = parse(&[]);
        unsafe { env::remove_var("TESSERA_SEED") };
        assert_eq!(cfg.unwrap().seed, 99);
    }

    #[test]
    #[serial(tessera_env)]
    fn conf_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_tiles = 2\nl1_num_lines = 16").unwrap();
        let cfg = parse(&["--conf-file", file.path().to_str().unwrap()]).unwrap();
        assert_eq!(cfg.num_tiles, 2);
        assert_eq!(cfg.l1_num_lines, 16);
        assert_eq!(cfg.engine_template().l1.num_lines, 16);
    }

    #[test]
    #[serial(tessera_env)]
    fn source_priority() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_tiles = 2\nseed = 7\ndrain_ticks = 50").unwrap();
        unsafe {
            env::set_var("TESSERA_NUM_TILES", "8");
            env::set_var("TESSERA_SEED", "70");
        }
        let cfg = parse(&[
            "--conf-file",
            file.path().to_str().unwrap(),
            "--num-tiles",
            "16",
        ]);
        unsafe {
            env::remove_var("TESSERA_NUM_TILES");
            env::remove_var("TESSERA_SEED");
        }
        let cfg = cfg.unwrap();
        // CLI beats environment, environment beats the file, and fields
        // only the file sets still land.
        assert_eq!(cfg.num_tiles, 16);
        assert_eq!(cfg.seed, 70);
        assert_eq!(cfg.drain_ticks, 50);
    }

    #[test]
    #[serial(tessera_env)]
    fn missing_conf_file_is_an_error() {
        assert!(parse(&["--conf-file", "/no/such/file.toml"]).is_err());
    }

    #[test]
    #[serial(tessera_env)]
    fn invalid_values_are_rejected() {
        assert!(parse(&["--write-percent", "101"]).is_err());
        assert!(parse(&["--num-tiles", "0"]).is_err());
    }

    #[test]
    #[serial(tessera_env)]
    fn per_core_seeds_differ() {
        let cfg = parse(&["--seed", "10"]).unwrap();
        assert_eq!(cfg.core_config(0).seed, 10);
        assert_eq!(cfg.core_config(3).seed, 13);
    }
}
