//! Error taxonomy shared by the backtester and the deep-test procedures.

use thiserror::Error;

use crate::data::LoaderError;

#[derive(Error, Debug)]
pub enum DeepTestError {
    /// Position series and bar table disagree on their index.
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// NaN/infinite values where not permitted, non-monotonic timestamps,
    /// positions outside [-1, 1].
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Invalid grid, zero-length window, bad block length, zero iterations.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Config file error: {0}")]
    ConfigFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeepTestError {
    pub fn alignment(msg: impl Into<String>) -> Self {
        Self::Alignment(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DeepTestError>;
