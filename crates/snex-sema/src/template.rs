// src/template.rs
//! Template parameter lists: merging call-site arguments against a
//! declaration's parameters.

use rustc_hash::FxHashMap;

use snex_frontend::TemplateParam;
use snex_identity::{Interner, Span, Symbol};

use crate::errors::SemaError;
use crate::sema_err;
use crate::types::ResolvedTemplateArg;

/// Bindings of template parameter names to concrete arguments.
pub type TemplateEnv = FxHashMap<Symbol, ResolvedTemplateArg>;

/// Merge `args` positionally against `params`. Missing trailing arguments
/// are filled by `default`, which sees the arguments merged so far so that
/// a default may refer to an earlier parameter.
pub fn merge_template_args(
    params: &[TemplateParam],
    args: &[ResolvedTemplateArg],
    interner: &Interner,
    span: Span,
    mut default: impl FnMut(
        &TemplateParam,
        &TemplateEnv,
    ) -> Result<Option<ResolvedTemplateArg>, SemaError>,
) -> Result<Vec<ResolvedTemplateArg>, SemaError> {
    if args.len() > params.len() {
        let param = params
            .last()
            .map(|p| interner.resolve(p.name()).to_string())
            .unwrap_or_default();
        return Err(sema_err!(
            TemplateArgument {
                param: param,
                reason: format!(
                    "too many arguments: expected {}, found {}",
                    params.len(),
                    args.len()
                ),
            },
            span
        ));
    }

    let mut env = TemplateEnv::default();
    let mut merged = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let name = interner.resolve(param.name()).to_string();
        let arg = match args.get(i) {
            Some(arg) => *arg,
            None => match default(param, &env)? {
                Some(arg) => arg,
                None => {
                    return Err(sema_err!(
                        TemplateArgument {
                            param: name,
                            reason: "missing argument and no default".to_string(),
                        },
                        span
                    ));
                }
            },
        };
        match (param, arg) {
            (TemplateParam::Type { .. }, ResolvedTemplateArg::Type(_))
            | (TemplateParam::Int { .. }, ResolvedTemplateArg::Const(_)) => {}
            (TemplateParam::Type { .. }, ResolvedTemplateArg::Const(v)) => {
                return Err(sema_err!(
                    TemplateArgument {
                        param: name,
                        reason: format!("expected a type, found constant {v}"),
                    },
                    span
                ));
            }
            (TemplateParam::Int { .. }, ResolvedTemplateArg::Type(_)) => {
                return Err(sema_err!(
                    TemplateArgument {
                        param: name,
                        reason: "expected an integer constant, found a type".to_string(),
                    },
                    span
                ));
            }
        }
        env.insert(param.name(), arg);
        merged.push(arg);
    }
    Ok(merged)
}

/// Environment binding each parameter to its merged argument.
pub fn bind(params: &[TemplateParam], args: &[ResolvedTemplateArg]) -> TemplateEnv {
    params
        .iter()
        .zip(args)
        .map(|(p, a)| (p.name(), *a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SemanticError;
    use crate::types::TypeId;

    fn params(interner: &mut Interner) -> Vec<TemplateParam> {
        vec![
            TemplateParam::Type {
                name: interner.intern("T"),
                default: None,
            },
            TemplateParam::Int {
                name: interner.intern("N"),
                default: None,
            },
        ]
    }

    fn no_default(
        _: &TemplateParam,
        _: &TemplateEnv,
    ) -> Result<Option<ResolvedTemplateArg>, SemaError> {
        Ok(None)
    }

    #[test]
    fn merges_positionally() {
        let mut interner = Interner::new();
        let params = params(&mut interner);
        let args = [
            ResolvedTemplateArg::Type(TypeId::FLOAT),
            ResolvedTemplateArg::Const(8),
        ];
        let merged =
            merge_template_args(&params, &args, &interner, Span::default(), no_default).unwrap();
        assert_eq!(merged, args.to_vec());
        let env = bind(&params, &merged);
        assert_eq!(
            env.get(&interner.intern("N")),
            Some(&ResolvedTemplateArg::Const(8))
        );
    }

    #[test]
    fn defaults_see_earlier_arguments() {
        let mut interner = Interner::new();
        let params = params(&mut interner);
        let t = interner.intern("T");
        let merged = merge_template_args(
            &params,
            &[ResolvedTemplateArg::Type(TypeId::DOUBLE)],
            &interner,
            Span::default(),
            |_, env| {
                assert_eq!(env.get(&t), Some(&ResolvedTemplateArg::Type(TypeId::DOUBLE)));
                Ok(Some(ResolvedTemplateArg::Const(4)))
            },
        )
        .unwrap();
        assert_eq!(merged[1], ResolvedTemplateArg::Const(4));
    }

    #[test]
    fn mismatches_name_the_parameter() {
        let mut interner = Interner::new();
        let params = params(&mut interner);

        let err = merge_template_args(
            &params,
            &[ResolvedTemplateArg::Const(1), ResolvedTemplateArg::Const(2)],
            &interner,
            Span::default(),
            no_default,
        )
        .unwrap_err();
        assert!(matches!(err.error, SemanticError::TemplateArgument { ref param, .. } if param == "T"));

        let err = merge_template_args(
            &params,
            &[ResolvedTemplateArg::Type(TypeId::INT)],
            &interner,
            Span::default(),
            no_default,
        )
        .unwrap_err();
        assert!(matches!(err.error, SemanticError::TemplateArgument { ref param, .. } if param == "N"));

        let err = merge_template_args(
            &params,
            &[
                ResolvedTemplateArg::Type(TypeId::INT),
                ResolvedTemplateArg::Const(2),
                ResolvedTemplateArg::Const(3),
            ],
            &interner,
            Span::default(),
            no_default,
        )
        .unwrap_err();
        assert!(matches!(err.error, SemanticError::TemplateArgument { .. }));
    }
}
