// src/abort.rs
//! Cooperative cancellation. The pipeline polls the token at pass
//! boundaries, per function, per rewrite and per loop or template
//! expansion step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use snex_identity::Span;

use crate::errors::SemaError;
use crate::sema_err;

#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    deadline: Option<Instant>,
    flag: Option<Arc<AtomicBool>>,
}

impl AbortToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn new(budget: Option<Duration>, flag: Option<Arc<AtomicBool>>) -> Self {
        Self {
            deadline: budget.map(|b| Instant::now() + b),
            flag,
        }
    }

    pub fn is_aborted(&self) -> bool {
        if let Some(flag) = &self.flag
            && flag.load(Ordering::Relaxed)
        {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Timeout)` located at `span` once the budget is spent or the
    /// host raised the flag.
    pub fn check(&self, span: Span) -> Result<(), SemaError> {
        if self.is_aborted() {
            tracing::debug!(line = span.line, "compilation aborted");
            return Err(sema_err!(Timeout {}, span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SemaErrorKind;

    #[test]
    fn zero_budget_fires_immediately() {
        let token = AbortToken::new(Some(Duration::ZERO), None);
        let err = token.check(Span::default()).unwrap_err();
        assert_eq!(err.kind(), SemaErrorKind::Timeout);
    }

    #[test]
    fn flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = AbortToken::new(None, Some(flag.clone()));
        assert!(token.check(Span::default()).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(token.is_aborted());
        assert!(AbortToken::never().check(Span::default()).is_ok());
    }
}
