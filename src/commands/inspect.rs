// src/commands/inspect.rs

use std::path::Path;
use std::process::ExitCode;

use snex_frontend::{AstPrinter, Parser};

use super::common::{CommandOptions, read_source, render_error};
use crate::cli::InspectType;
use crate::compile::analyze;
use crate::diagnostics::CompileError;

/// Print the syntax tree or the resolved layout of a file
pub fn inspect_file(path: &Path, inspect_type: InspectType, options: &CommandOptions) -> ExitCode {
    let Ok(source) = read_source(path) else {
        return ExitCode::FAILURE;
    };
    let file_path = path.to_string_lossy();
    eprintln!("// {}", path.display());

    match inspect_type {
        InspectType::Ast => {
            let unit = match Parser::new(&source).parse_program() {
                Ok(unit) => unit,
                Err(e) => {
                    render_error(&CompileError::Parse(e), &file_path, &source, options);
                    return ExitCode::FAILURE;
                }
            };
            let printer = AstPrinter::new(&unit.ast, &unit.interner);
            print!("{}", printer.print(unit.ast.root()));
        }
        InspectType::Types => {
            let unit = match analyze(&source, &options.config()) {
                Ok(unit) => unit,
                Err(e) => {
                    render_error(&e, &file_path, &source, options);
                    return ExitCode::FAILURE;
                }
            };
            print!("{}", unit.dump_layout());
            for (id, _) in unit.user_functions() {
                let f = unit.functions.get(id);
                let args: Vec<String> = f.args.iter().map(|a| unit.info_name(a.info)).collect();
                println!("{} {}({})", unit.info_name(f.ret), f.label, args.join(", "));
            }
        }
    }
    ExitCode::SUCCESS
}
