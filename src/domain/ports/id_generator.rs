//! Task id generation, injected so tests can substitute deterministic ids.

use uuid::Uuid;

/// Produces an opaque, collision-resistant task id for each dispatch.
pub trait TaskIdGenerator: Send + Sync {
    /// Generate the next id.
    fn generate(&self) -> String;
}

/// Default generator backed by UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTaskIdGenerator;

impl TaskIdGenerator for UuidTaskIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_generator_produces_unique_ids() {
        let generator = UuidTaskIdGenerator;
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generator.generate()));
        }
    }
}
