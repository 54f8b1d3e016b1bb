//! Completion-reason decision (§4.7 step 3, §8 P4): exactly one of
//! `{manual, error_budget, capped, finished}` applies at any instant, in
//! that priority order. Kept as a free function over a small snapshot
//! struct rather than a method on `Scheduler`/`Engine` so the priority
//! logic is independently testable without spinning up either.

use crate::config::ErrorBudget;
use crate::crawl_events::CompletionReason;

/// Everything the completion decision needs, gathered from the scheduler,
/// the error counter, and the external cancellation flag.
#[derive(Debug, Clone, Copy)]
pub struct CompletionInputs {
    pub manual_cancel: bool,
    pub errors_count: u64,
    pub max_errors: ErrorBudget,
    pub pages_completed: u64,
    pub max_pages: u64,
    pub queue_empty: bool,
    pub in_flight_empty: bool,
}

/// Returns `Some(reason)` once a terminal condition holds, in priority
/// order; `None` while the crawl should keep running.
#[must_use]
pub fn decide_completion(inputs: CompletionInputs) -> Option<CompletionReason> {
    if inputs.manual_cancel {
        return Some(CompletionReason::Manual);
    }
    if inputs.max_errors.exceeded(inputs.errors_count) {
        return Some(CompletionReason::ErrorBudget);
    }
    if inputs.max_pages > 0 && inputs.pages_completed >= inputs.max_pages {
        return Some(CompletionReason::Capped);
    }
    if inputs.queue_empty && inputs.in_flight_empty {
        return Some(CompletionReason::Finished);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CompletionInputs {
        CompletionInputs {
            manual_cancel: false,
            errors_count: 0,
            max_errors: ErrorBudget::Unlimited,
            pages_completed: 0,
            max_pages: 0,
            queue_empty: false,
            in_flight_empty: false,
        }
    }

    #[test]
    fn manual_wins_over_everything() {
        let inputs = CompletionInputs {
            manual_cancel: true,
            errors_count: 1000,
            max_errors: ErrorBudget::AbortOnFirst,
            ..base()
        };
        assert_eq!(decide_completion(inputs), Some(CompletionReason::Manual));
    }

    #[test]
    fn error_budget_wins_over_capped_and_finished() {
        let inputs = CompletionInputs {
            errors_count: 6,
            max_errors: ErrorBudget::AbortAfter(5),
            pages_completed: 10,
            max_pages: 10,
            queue_empty: true,
            in_flight_empty: true,
            ..base()
        };
        assert_eq!(decide_completion(inputs), Some(CompletionReason::ErrorBudget));
    }

    #[test]
    fn capped_wins_over_finished() {
        let inputs = CompletionInputs {
            pages_completed: 10,
            max_pages: 10,
            queue_empty: false,
            in_flight_empty: false,
            ..base()
        };
        assert_eq!(decide_completion(inputs), Some(CompletionReason::Capped));
    }

    #[test]
    fn finished_only_when_queue_and_in_flight_both_empty() {
        let mut inputs = base();
        inputs.queue_empty = true;
        inputs.in_flight_empty = false;
        assert_eq!(decide_completion(inputs), None);

        inputs.in_flight_empty = true;
        assert_eq!(decide_completion(inputs), Some(CompletionReason::Finished));
    }

    #[test]
    fn zero_max_pages_never_caps() {
        let inputs = CompletionInputs {
            pages_completed: 1_000_000,
            max_pages: 0,
            ..base()
        };
        assert_eq!(decide_completion(inputs), None);
    }
}
