// src/expression.rs

use snex_codegen::CompiledObject;
use snex_runtime::{NativeSignature, NativeType};

use crate::compile::compile_object;
use crate::config::CompileConfig;
use crate::diagnostics::{CompileError, Diagnostic};

const PREFIX: &str = "double get(double input) { return (double)(";
const SUFFIX: &str = "); }";

/// A single expression over `input`, compiled to `double get(double)`.
///
/// An expression that fails to compile evaluates to its input and keeps
/// the error for display.
#[derive(Debug)]
pub struct JitExpression {
    object: Option<CompiledObject>,
    function: Option<extern "C" fn(f64) -> f64>,
    error: Option<Diagnostic>,
}

impl JitExpression {
    pub fn new(expression: &str, config: &CompileConfig) -> Self {
        match Self::compile(expression, config) {
            Ok((object, function)) => Self {
                object: Some(object),
                function: Some(function),
                error: None,
            },
            Err(e) => {
                let mut diagnostic = Diagnostic::from(&e);
                // Report columns relative to the expression text
                if diagnostic.line == 1 {
                    diagnostic.column = diagnostic.column.saturating_sub(PREFIX.len() as u32).max(1);
                }
                tracing::debug!(expression, error = %diagnostic, "expression failed to compile");
                Self {
                    object: None,
                    function: None,
                    error: Some(diagnostic),
                }
            }
        }
    }

    fn compile(expression: &str, config: &CompileConfig) -> Result<(CompiledObject, extern "C" fn(f64) -> f64), CompileError> {
        let source = format!("{PREFIX}{expression}{SUFFIX}");
        let object = compile_object(&source, config)?;
        let signature = NativeSignature::new(vec![NativeType::Double], NativeType::Double);
        let ptr = object.function("get", &signature)?;
        // Safety: looked up with the matching signature; `object` keeps the
        // code alive for as long as `self` holds the pointer.
        let function = unsafe { std::mem::transmute::<*const u8, extern "C" fn(f64) -> f64>(ptr) };
        Ok((object, function))
    }

    pub fn is_valid(&self) -> bool {
        self.function.is_some()
    }

    pub fn error(&self) -> Option<&Diagnostic> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }

    /// Evaluate at `input`, or return `input` if compilation failed.
    pub fn value(&self, input: f64) -> f64 {
        match self.function {
            Some(f) => f(input),
            None => input,
        }
    }

    /// Code size and layout of the backing object.
    pub fn object(&self) -> Option<&CompiledObject> {
        self.object.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;

    #[test]
    fn evaluates_over_input() {
        let expr = JitExpression::new("input * 2.0 + Math.sin(0.0)", &CompileConfig::default());
        assert!(expr.is_valid(), "{}", expr.error_message());
        assert_eq!(expr.value(1.5), 3.0);
    }

    #[test]
    fn int_expressions_are_widened() {
        let expr = JitExpression::new("3 / 2", &CompileConfig::default());
        assert_eq!(expr.value(0.0), 1.0);
    }

    #[test]
    fn invalid_expression_passes_input_through() {
        let expr = JitExpression::new("input * missing", &CompileConfig::default());
        assert!(!expr.is_valid());
        assert_eq!(expr.value(0.25), 0.25);
        let error = expr.error().map(|e| (e.kind, e.column));
        assert_eq!(error, Some((ErrorKind::TypeResolution, 9)));
    }
}
