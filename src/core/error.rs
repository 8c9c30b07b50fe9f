use thiserror::Error;

/// Batch-boundary rejections. Raised before any pipeline is scheduled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("missing required field: urls")]
    MissingUrls,

    #[error("urls must be an array of strings")]
    NotAnArray,

    #[error("urls[{index}] is not a string")]
    NonStringItem { index: usize },

    #[error("too many urls: {count} unique (max {max})")]
    TooManyUrls { count: usize, max: usize },
}
