// src/commands/eval.rs

use std::process::ExitCode;

use super::common::CommandOptions;
use crate::expression::JitExpression;

/// Compile `expression` and print its value at `input`.
pub fn eval_expression(expression: &str, input: f64, options: &CommandOptions) -> ExitCode {
    let expr = JitExpression::new(expression, &options.config());
    if !expr.is_valid() {
        eprintln!("error: {}", expr.error_message());
        return ExitCode::FAILURE;
    }
    println!("{}", expr.value(input));
    ExitCode::SUCCESS
}
