/// How many units of work (features or grid cells) one resumable step may
/// process. Counted in units rather than wall-clock time so stepping stays
/// deterministic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StepBudget {
    limit: Option<u32>,
    used: u32,
}

impl StepBudget {
    pub fn new(units: u32) -> Self {
        Self {
            limit: Some(units),
            used: 0,
        }
    }

    /// Run until there is nothing left to do.
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            used: 0,
        }
    }

    /// `None` for an unlimited budget.
    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|limit| limit - self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Claims one unit; `false` once the budget is spent.
    pub fn take_unit(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used = self.used.saturating_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::StepBudget;

    #[test]
    fn bounded_budget_runs_out() {
        let mut b = StepBudget::new(2);
        assert!(b.take_unit());
        assert!(b.take_unit());
        assert!(!b.take_unit());
        assert!(b.is_exhausted());
        assert_eq!(b.used(), 2);
        assert_eq!(b.remaining(), Some(0));
    }

    #[test]
    fn zero_budget_takes_nothing() {
        let mut b = StepBudget::new(0);
        assert!(!b.take_unit());
        assert_eq!(b.used(), 0);
    }

    #[test]
    fn unlimited_never_runs_out() {
        let mut b = StepBudget::unlimited();
        for _ in 0..10_000 {
            assert!(b.take_unit());
        }
        assert_eq!(b.remaining(), None);
        assert_eq!(b.used(), 10_000);
    }
}
