//! Errors surfaced by the transit data-source boundary.

use std::fmt;

/// Errors encountered while talking to the fleet data API.
#[derive(Debug)]
pub enum DataSourceError {
    Http(reqwest::Error),
    Json(reqwest::Error),
    Api(String),
    /// All retry attempts were exhausted.
    Unavailable {
        attempts: u32,
    },
}

impl From<reqwest::Error> for DataSourceError {
    fn from(err: reqwest::Error) -> Self {
        DataSourceError::Http(err)
    }
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::Http(err) => write!(f, "http error: {err}"),
            DataSourceError::Json(err) => write!(f, "invalid json response: {err}"),
            DataSourceError::Api(msg) => write!(f, "api error: {msg}"),
            DataSourceError::Unavailable { attempts } => {
                write!(f, "data source unavailable after {attempts} attempts")
            }
        }
    }
}
