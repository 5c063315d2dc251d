use scheduling_domain::ID;

use crate::error::SchedulingError;

/// Empty struct used to namespace guard functions.
pub struct Guard {}

impl Guard {
    /// Guard function to check if the provided ID is malformed.
    pub fn against_malformed_id(val: String) -> Result<ID, SchedulingError> {
        val.parse()
            .map_err(|e| SchedulingError::Validation(format!("{e}")))
    }
}
