//! Property results and the checker trait shared by all invariants.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking one named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Stable property name, e.g. `NoLostElements`.
    pub name: &'static str,
    /// Whether the property holds.
    pub holds: bool,
    /// Human-readable violation message (only when `holds` is false).
    pub violation: Option<String>,
    /// Failure path, when the checker could build one.
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A property that holds.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A violated property.
    #[must_use]
    pub fn fail(
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        let violation = violation.into();
        debug_assert!(!violation.is_empty(), "Violation message must not be empty");
        Self {
            name,
            holds: false,
            violation: Some(violation),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.holds {
            return write!(f, "[PASS] {}", self.name);
        }

        write!(f, "[FAIL] {}", self.name)?;
        if let Some(ref violation) = self.violation {
            write!(f, ": {}", violation)?;
        }
        if let Some(ref ce) = self.counterexample {
            write!(f, "\n{}", ce.render_diagram())?;
        }
        Ok(())
    }
}

/// Checks a fixed set of properties against some observed state.
pub trait PropertyChecker {
    /// Evaluate every property.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated properties.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// Check all properties, returning the first violation as an error message.
    ///
    /// Convenient as the `check_invariants` closure of the DST harness.
    fn check(&self) -> Result<(), String> {
        match self.violations().into_iter().next() {
            Some(result) => Err(result.to_string()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_all_hold() {
        let checker = Fixed(vec![PropertyResult::pass("A"), PropertyResult::pass("B")]);
        assert!(checker.all_hold());
        assert!(checker.violations().is_empty());
        assert!(checker.check().is_ok());
    }

    #[test]
    fn test_first_violation_reported() {
        let checker = Fixed(vec![
            PropertyResult::pass("A"),
            PropertyResult::fail("B", "b broke", None),
            PropertyResult::fail("C", "c broke", None),
        ]);

        assert!(!checker.all_hold());
        assert_eq!(checker.violations().len(), 2);

        let message = checker.check().unwrap_err();
        assert!(message.contains("[FAIL] B: b broke"), "{}", message);
    }
}
