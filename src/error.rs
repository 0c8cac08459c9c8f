use std::path::PathBuf;

use thiserror::Error;

/// A fetch parameter outside its known domain.
///
/// Raised before any network call is made; never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidParameter {
    #[error("invalid dataset type `{0}`")]
    Dataset(String),

    #[error("invalid position `{0}`")]
    Position(String),

    #[error("invalid season `{0}`")]
    Season(i32),

    #[error("invalid week `{week}` for season `{season}`")]
    Week { season: i32, week: i32 },

    #[error("invalid number of weeks `{weeks}` (ceiling is {max})")]
    WeekCount { weeks: i32, max: u32 },
}

impl InvalidParameter {
    pub fn field(&self) -> &'static str {
        match self {
            InvalidParameter::Dataset(_) => "dataset",
            InvalidParameter::Position(_) => "position",
            InvalidParameter::Season(_) => "season",
            InvalidParameter::Week { .. } => "week",
            InvalidParameter::WeekCount { .. } => "weeks",
        }
    }
}

#[derive(Debug, Error)]
#[error("raw cache file missing: {}", .path.display())]
pub struct MissingRawFile {
    pub path: PathBuf,
}
