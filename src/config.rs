// src/config.rs

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use snex_codegen::JitOptions;
use snex_runtime::NativeRegistry;
use snex_sema::{AbortToken, OptimizationLevel, SemaOptions};

/// Settings for one [`compile`](crate::compile) call.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Wall-clock budget, measured from the start of the compile.
    pub time_budget: Option<Duration>,
    /// Raised by the host to cancel a running compile.
    pub abort: Option<Arc<AtomicBool>>,
    pub optimization: OptimizationLevel,
    /// Largest span a range-based `for` is unrolled over.
    pub unroll_limit: usize,
    /// Host functions and constants, e.g. a `Host` module.
    pub externals: NativeRegistry,
    pub jit: JitOptions,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            time_budget: None,
            abort: None,
            optimization: OptimizationLevel::Full,
            unroll_limit: 8,
            externals: NativeRegistry::new(),
            jit: JitOptions::default(),
        }
    }
}

impl CompileConfig {
    pub fn with_optimization(mut self, optimization: OptimizationLevel) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_externals(mut self, externals: NativeRegistry) -> Self {
        self.externals = externals;
        self
    }

    pub fn with_jit(mut self, jit: JitOptions) -> Self {
        self.jit = jit;
        self
    }

    /// Options for the semantic passes. The time budget starts now.
    pub(crate) fn sema_options(&self) -> SemaOptions {
        SemaOptions {
            optimization: self.optimization,
            unroll_limit: self.unroll_limit,
            abort: AbortToken::new(self.time_budget, self.abort.clone()),
            ..SemaOptions::default()
        }
    }
}
