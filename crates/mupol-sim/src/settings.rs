//! Settings read from a JSON file, overridden by command line flags.

use std::{fs, path::Path};

use anyhow::Context;
use mupol::config::DispatchConfig;
use serde::Deserialize;

use crate::generator::Options;

/// The contents of a `--config` file, both sections are optional.
///
/// ```json
/// {
///   "dispatch": { "bit_length": 10, "dummy_node": 1023, "dummy_freighter_id": 1023 },
///   "problem": { "num_orders": 8, "random_seed": 3 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub dispatch: DispatchConfig,
    pub problem: Options,
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Replaces `target` with the value of a flag that was given explicitly.
pub fn set<T>(target: &mut T, flag: Option<T>) {
    if let Some(value) = flag {
        *target = value;
    }
}
