//! ID generation utilities.

use uuid::Uuid;

/// ID generator for jobs.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new random UUID v4 job id.
    ///
    /// Job ids only need uniqueness for the lifetime of their result slot,
    /// so a random v4 is sufficient; there is no ordering requirement.
    #[must_use]
    pub fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
