use crate::{
    cleaning_stage::{CleaningOptions, DatePolicy},
    types::Year,
};
use serde::{Deserialize, Serialize};

/// Year the retention budget is computed for when nothing else is given.
pub const DEFAULT_ANALYSIS_YEAR: Year = 2013;

/// Run-level settings. Every field has a default, so a config file only
/// needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Order CSV to extract from.
    pub input_path:         Option<String>,
    /// Directory for stage outputs and the run log. `None` keeps
    /// everything in memory.
    pub output_dir:         Option<String>,
    pub analysis_year:      Year,
    pub unparseable_dates:  DatePolicy,
    /// Write the risk summary as currency / percent strings.
    pub format_risk_output: bool,
    /// Run the customer branch and the product branch on separate threads.
    pub parallel_branches:  bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path:         None,
            output_dir:         None,
            analysis_year:      DEFAULT_ANALYSIS_YEAR,
            unparseable_dates:  DatePolicy::Drop,
            format_risk_output: true,
            parallel_branches:  true,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {path}: {e}"))?;
        Ok(config)
    }

    /// In-memory config for unit and integration tests: no files, and
    /// branches run sequentially so log order is stable.
    pub fn default_test() -> Self {
        Self {
            parallel_branches: false,
            ..Self::default()
        }
    }

    pub fn cleaning_options(&self) -> CleaningOptions {
        CleaningOptions {
            unparseable_dates: self.unparseable_dates,
        }
    }
}
