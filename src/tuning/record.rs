use crate::configuration::Configuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Final configuration of a run plus what produced it, written once at shutdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuningRecord {
    pub configuration: Configuration,
    /// Run parameters such as box size, cutoff or iteration count.
    pub parameters: BTreeMap<String, String>,
    pub command_line: Vec<String>,
}

impl TuningRecord {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            parameters: BTreeMap::new(),
            command_line: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }

    pub fn with_command_line<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_line = args.into_iter().map(Into::into).collect();
        self
    }

    /// Flat key/value view: configuration first, then parameters, then the command line.
    pub fn to_key_values(&self) -> Vec<(String, String)> {
        let c = &self.configuration;
        let mut out = vec![
            ("container".to_string(), c.container.to_string()),
            ("cell-size-factor".to_string(), c.cell_size_factor.to_string()),
            ("traversal".to_string(), c.traversal.to_string()),
            ("data-layout".to_string(), c.data_layout.to_string()),
            ("newton3".to_string(), c.newton3.to_string()),
        ];
        if let Some(n) = c.cluster_size {
            out.push(("cluster-size".to_string(), n.to_string()));
        }
        out.extend(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        out.push(("command-line".to_string(), self.command_line.join(" ")));
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl fmt::Display for TuningRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.to_key_values() {
            writeln!(f, "{k:<20}: {v}")?;
        }
        Ok(())
    }
}
