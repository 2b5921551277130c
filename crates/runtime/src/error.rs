use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

/// Why a round ended in the failed state.
///
/// The conversation log keeps every message appended before the failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("incomplete model output due to the token limit")]
    ModelTruncated,

    #[error("omitted content due to a content filter flag")]
    ContentFiltered,

    #[error("deprecated function call attempted")]
    DeprecatedCallShape,

    #[error("unknown finish condition: {0}")]
    UnknownFinishCondition(String),

    #[error("round limit of {0} model calls exceeded")]
    RoundLimitExceeded(usize),

    #[error("round cancelled")]
    Cancelled,

    #[error("model call timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, Error>;
