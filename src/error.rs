use miette::Diagnostic;
use thiserror::Error;

/// A feed's raw bytes could not be turned into XML at all, even after the
/// preamble-stripping and ampersand-repair preprocessing in [`crate::parser`].
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("feed {source_feed} is not well-formed XML after preprocessing: {reason}")]
    MalformedXml { source_feed: String, reason: String },
}

/// Failure modes of a single feed-file read, upstream of parsing.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadFailure {
    #[error("error reading feed file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reading feed file {path} timed out")]
    Timeout { path: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Raised by the historical-throughput loader; does not affect the vessel
/// update breaker (cross-reference analysis is best-effort, per §4.10 step 5).
#[derive(Debug, Error, Diagnostic)]
pub enum ThroughputLoadError {
    #[error("error reading historical throughput file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing historical throughput CSV row {row}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },
}

/// Errors surfaced while loading the layered configuration.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to load configuration")]
pub struct ConfigError(#[from] pub figment::Error);
