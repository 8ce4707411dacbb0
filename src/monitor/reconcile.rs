//! Reconciliation plan
//!
//! Diff of the previously observed destinations against the current ones:
//! - present now, absent before → start
//! - absent now, present before → stop
//! - present in both, fingerprint changed → reload
//!
//! A destination observed without a fingerprint (registered but not yet
//! scanned) adopts the current fingerprint without a reload.

use std::collections::BTreeMap;

/// Content fingerprint of one destination's configuration
pub type Fingerprint = String;

/// Observed destinations; `None` means "known, fingerprint not observed yet"
pub type Observation = BTreeMap<String, Option<Fingerprint>>;

/// Actions one reconciliation tick must fire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub reload: Vec<String>,
}

impl ReconcilePlan {
    /// Diff two observations.
    pub fn diff(previous: &Observation, current: &Observation) -> Self {
        let mut plan = Self::default();

        for (destination, fingerprint) in current {
            match previous.get(destination) {
                None => plan.start.push(destination.clone()),
                Some(Some(old)) => {
                    if matches!(fingerprint, Some(new) if new != old) {
                        plan.reload.push(destination.clone());
                    }
                }
                Some(None) => {}
            }
        }

        plan.stop = previous
            .keys()
            .filter(|d| !current.contains_key(*d))
            .cloned()
            .collect();

        plan
    }

    /// Whether nothing has to happen
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty() && self.reload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(entries: &[(&str, Option<&str>)]) -> Observation {
        entries
            .iter()
            .map(|(d, f)| (d.to_string(), f.map(String::from)))
            .collect()
    }

    #[test]
    fn test_add_remove_unchanged() {
        let previous = observation(&[("B", Some("1")), ("C", Some("1"))]);
        let current = observation(&[("A", Some("1")), ("B", Some("1"))]);

        let plan = ReconcilePlan::diff(&previous, &current);
        assert_eq!(plan.start, vec!["A"]);
        assert_eq!(plan.stop, vec!["C"]);
        assert!(plan.reload.is_empty());
    }

    #[test]
    fn test_changed_fingerprint_reloads() {
        let previous = observation(&[("B", Some("1")), ("C", Some("1"))]);
        let current = observation(&[("A", Some("1")), ("B", Some("2"))]);

        let plan = ReconcilePlan::diff(&previous, &current);
        assert_eq!(plan.start, vec!["A"]);
        assert_eq!(plan.stop, vec!["C"]);
        assert_eq!(plan.reload, vec!["B"]);
    }

    #[test]
    fn test_unobserved_fingerprint_is_adopted() {
        let previous = observation(&[("B", None)]);
        let current = observation(&[("B", Some("9"))]);
        assert!(ReconcilePlan::diff(&previous, &current).is_empty());
    }
}
