//! Built-in migrations, in the order they run.

mod channel_partitions;
mod rebuild_version_index;

use crate::migration::Migration;

/// The registry applied by [`crate::MigrationEngine::new`].
pub fn builtin() -> Vec<Migration> {
    vec![
        Migration::new("0001_channel_partitions", channel_partitions::run),
        Migration::new("0002_rebuild_version_index", rebuild_version_index::run),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique_and_ordered() {
        let names: Vec<&str> = builtin().iter().map(|m| m.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
