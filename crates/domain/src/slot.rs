use slotgate_core::{AppError, AppResult};

/// Fixed-size pool of mutually exclusive slots named `<prefix>-<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPool {
    prefix: String,
    max_slots: u32,
}

impl SlotPool {
    /// Creates a slot pool.
    ///
    /// The prefix must be usable as the leading part of a Kubernetes object
    /// name: lowercase alphanumerics, `-` and `.`, starting and ending with an
    /// alphanumeric character.
    pub fn new(prefix: impl Into<String>, max_slots: u32) -> AppResult<Self> {
        let prefix = prefix.into();
        let trimmed = prefix.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "slot prefix must not be empty".to_owned(),
            ));
        }

        let valid_chars = trimmed.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '-'
                || character == '.'
        });
        let valid_edges = trimmed
            .chars()
            .next()
            .is_some_and(|character| character.is_ascii_alphanumeric())
            && trimmed
                .chars()
                .last()
                .is_some_and(|character| character.is_ascii_alphanumeric());

        if !valid_chars || !valid_edges {
            return Err(AppError::Validation(format!(
                "slot prefix '{trimmed}' must contain only lowercase alphanumerics, '-' or '.' and start and end with an alphanumeric"
            )));
        }

        if max_slots == 0 {
            return Err(AppError::Validation(
                "max_slots must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            prefix: trimmed.to_owned(),
            max_slots,
        })
    }

    /// Returns the configured name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Returns the pool size.
    #[must_use]
    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Returns the shared prefix of every slot name, including the separator.
    #[must_use]
    pub fn name_prefix(&self) -> String {
        format!("{}-", self.prefix)
    }

    /// Returns the slot name for one index inside the pool.
    pub fn slot_name(&self, index: u32) -> AppResult<String> {
        if index >= self.max_slots {
            return Err(AppError::Validation(format!(
                "slot index {index} is outside the pool of {} slots",
                self.max_slots
            )));
        }

        Ok(format!("{}-{index}", self.prefix))
    }

    /// Returns every slot name in ascending index order.
    pub fn slot_names(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        (0..self.max_slots).map(|index| (index, format!("{}-{index}", self.prefix)))
    }

    /// Parses the index out of a slot name carrying this pool's prefix.
    ///
    /// Returns indices beyond `max_slots` too, so leases left behind by a
    /// larger pool configuration stay visible. Only the canonical spelling
    /// produced by [`SlotPool::slot_name`] parses; `slot-01` is foreign.
    #[must_use]
    pub fn index_of(&self, slot_name: &str) -> Option<u32> {
        slot_name
            .strip_prefix(self.name_prefix().as_str())
            .filter(|suffix| {
                !suffix.is_empty() && suffix.chars().all(|character| character.is_ascii_digit())
            })
            .filter(|suffix| *suffix == "0" || !suffix.starts_with('0'))
            .and_then(|suffix| suffix.parse::<u32>().ok())
    }

    /// Returns true when the index falls inside the pool.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        index < self.max_slots
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::SlotPool;

    #[test]
    fn slot_names_are_prefix_and_index() {
        let pool = SlotPool::new("slot", 2).unwrap_or_else(|_| unreachable!());
        let names: Vec<String> = pool.slot_names().map(|(_, name)| name).collect();
        assert_eq!(names, vec!["slot-0".to_owned(), "slot-1".to_owned()]);
    }

    #[test]
    fn slot_name_rejects_index_outside_pool() {
        let pool = SlotPool::new("slot", 2).unwrap_or_else(|_| unreachable!());
        assert!(pool.slot_name(2).is_err());
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(SlotPool::new("slot", 0).is_err());
    }

    #[test]
    fn uppercase_prefix_is_rejected() {
        assert!(SlotPool::new("Slot", 2).is_err());
        assert!(SlotPool::new("slot-", 2).is_err());
        assert!(SlotPool::new("  ", 2).is_err());
    }

    #[test]
    fn index_of_ignores_foreign_names() {
        let pool = SlotPool::new("ci-slot", 3).unwrap_or_else(|_| unreachable!());
        assert_eq!(pool.index_of("ci-slot-7"), Some(7));
        assert_eq!(pool.index_of("ci-slot-"), None);
        assert_eq!(pool.index_of("ci-slot-x1"), None);
        assert_eq!(pool.index_of("other-1"), None);
    }

    #[test]
    fn index_of_rejects_zero_padded_suffixes() {
        let pool = SlotPool::new("slot", 3).unwrap_or_else(|_| unreachable!());
        assert_eq!(pool.index_of("slot-0"), Some(0));
        assert_eq!(pool.index_of("slot-01"), None);
        assert_eq!(pool.index_of("slot-00"), None);
    }

    proptest! {
        #[test]
        fn index_of_inverts_slot_name(max_slots in 1_u32..64, offset in 0_u32..64) {
            let pool = SlotPool::new("slot", max_slots).unwrap_or_else(|_| unreachable!());
            let index = offset % max_slots;
            let name = pool.slot_name(index).unwrap_or_else(|_| unreachable!());
            prop_assert_eq!(pool.index_of(name.as_str()), Some(index));
        }
    }
}
