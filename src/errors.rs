use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("sample failure: {0}")]
    SampleFailure(String),
    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),
    #[error("baseline not found: {0}")]
    BaselineNotFound(String),
    #[error("scenario {scenario} failed: all {failures} samples failed (last error: {last_error})")]
    ScenarioExecution {
        scenario: String,
        failures: usize,
        last_error: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("target error: {0}")]
    Target(String),
}

impl HarnessError {
    pub fn invalid_scenario<T: Into<String>>(msg: T) -> Self {
        HarnessError::InvalidScenario(msg.into())
    }

    pub fn sample_failure<T: Into<String>>(msg: T) -> Self {
        HarnessError::SampleFailure(msg.into())
    }

    pub fn insufficient_samples<T: Into<String>>(msg: T) -> Self {
        HarnessError::InsufficientSamples(msg.into())
    }

    pub fn baseline_not_found<T: Into<String>>(msg: T) -> Self {
        HarnessError::BaselineNotFound(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        HarnessError::Storage(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        HarnessError::Serialization(msg.into())
    }

    pub fn target<T: Into<String>>(msg: T) -> Self {
        HarnessError::Target(msg.into())
    }

    /// Missing baselines are recoverable: the caller decides whether to
    /// establish one or skip the regression check.
    pub fn is_baseline_not_found(&self) -> bool {
        matches!(self, HarnessError::BaselineNotFound(_))
    }
}
