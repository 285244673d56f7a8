use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// Identifier of the administrative principal that performed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(i64);

impl ActorId {
    /// Creates an actor identifier, rejecting non-positive values.
    pub fn new(value: i64) -> AppResult<Self> {
        if value <= 0 {
            return Err(AppError::Validation(format!(
                "actor id must be positive, got {value}"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for ActorId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
