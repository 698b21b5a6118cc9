//! YAML configuration of a simulation run.
use std::fs;
use std::io;

use ringcast_core::config::NodeConfig;
use ringcast_transport::connections::DummyConfig;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_PATH: &str = "~/.ringcast/config.yaml";
pub const DEFAULT_NODES: usize = 16;
pub const DEFAULT_BROADCASTS: usize = 4;
pub const DEFAULT_DIRECTED: usize = 8;
pub const DEFAULT_ROUNDS: usize = 64;

/// Everything a simulation needs. Missing fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Shared by every simulated node.
    pub node: NodeConfig,
    /// Behaviour of the in-memory links.
    pub network: DummyConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ring members to create.
    pub nodes: usize,
    /// Broadcasts from random originators after convergence.
    pub broadcasts: usize,
    /// Directed messages between random pairs after convergence.
    pub directed: usize,
    /// Upper bound of stabilize rounds before giving up on convergence.
    pub rounds: usize,
    /// Seed of the id and traffic generator.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_NODES,
            broadcasts: DEFAULT_BROADCASTS,
            directed: DEFAULT_DIRECTED,
            rounds: DEFAULT_ROUNDS,
            seed: 0,
        }
    }
}

impl Config {
    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }
}
