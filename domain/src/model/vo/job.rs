use std::collections::HashMap;

use serde::Deserialize;
use typed_builder::TypedBuilder;

/// What to run and with which resources. A submitted job keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TypedBuilder)]
pub struct JobDescription {
    /// Job name shown by the scheduler
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,
    #[builder(setter(into))]
    pub executable: String,
    #[serde(default)]
    #[builder(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub working_directory: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub stdin: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub stdout: Option<String>,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub stderr: Option<String>,
    /// Queue to submit to, the scheduler default when absent
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub queue_name: Option<String>,
    #[serde(default = "JobDescription::default_count")]
    #[builder(default = 1)]
    pub node_count: u32,
    #[serde(default = "JobDescription::default_count")]
    #[builder(default = 1)]
    pub processes_per_node: u32,
    /// Maximum wall-clock time (s)
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub max_wall_time: Option<u64>,
}

impl JobDescription {
    pub fn default_count() -> u32 {
        1
    }

    /// Number of scheduler slots the job occupies.
    pub fn slots(&self) -> u64 {
        u64::from(self.node_count) * u64::from(self.processes_per_node)
    }
}
