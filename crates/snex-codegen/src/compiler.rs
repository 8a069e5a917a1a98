// src/compiler.rs
//
// Unit-level driver: declares every user function, lowers each body and
// packages the finalized code as a `CompiledObject`.

use cranelift::prelude::{FunctionBuilder, FunctionBuilderContext};

use snex_frontend::{NodeId, NodeKind};
use snex_runtime::NativeSignature;
use snex_sema::{Compilation, FunctionData, FunctionId, FunctionKind, to_native_type};

use crate::context::{Cg, FunctionLinks};
use crate::errors::{CodegenError, CodegenResult};
use crate::function::abi_signature;
use crate::jit::{JitContext, JitOptions};
use crate::object::{CodegenStats, CompiledFunction, CompiledObject, DataEntry};
use crate::registers::RegisterStats;

/// Link name of a function. Overloads share a label, so the table index
/// keeps names unique.
fn symbol_name(label: &str, id: FunctionId) -> String {
    format!("{}#{}", label, id.index())
}

/// Host view of a signature, if every part can cross the boundary.
fn native_signature(data: &FunctionData) -> Option<NativeSignature> {
    let params = data
        .args
        .iter()
        .map(|a| to_native_type(a.info))
        .collect::<Option<Vec<_>>>()?;
    Some(NativeSignature::new(params, to_native_type(data.ret)?))
}

/// Generate native code for a resolved and optimized unit.
pub fn generate(mut unit: Compilation, options: &JitOptions) -> CodegenResult<CompiledObject> {
    let _span = tracing::debug_span!("codegen").entered();
    unit.root.finalise();
    let root_base = unit.root.base_ptr().map_or(0, |p| p as i64);

    let mut links = FunctionLinks::default();
    let mut symbols = Vec::new();
    for (id, data) in unit.functions.iter() {
        if let FunctionKind::Native { ptr } = data.kind {
            let name = symbol_name(&data.label, id);
            symbols.push((name.clone(), ptr));
            links.native_symbols.insert(id, name);
        }
    }
    let mut jit = JitContext::with_options(options, &symbols)?;

    let functions = unit.user_functions();
    let registers = match lower_functions(&mut jit, &unit, &mut links, &functions, options, root_base) {
        Ok(registers) => registers,
        Err(e) => {
            // Safety: no pointer into this module has been handed out.
            unsafe { jit.free_memory() };
            return Err(e);
        }
    };

    let mut exported = Vec::new();
    for &(id, _) in &functions {
        let data = unit.functions.get(id);
        if data.this_type.is_some() {
            continue;
        }
        let Some(&func_id) = links.defined.get(&id) else { continue };
        exported.push(CompiledFunction {
            name: data.label.clone(),
            signature: native_signature(data),
            ptr: jit.get_function_ptr_by_id(func_id),
        });
    }

    let mut destructors = Vec::new();
    for entry in unit.root.destructors() {
        let func_id = links.defined.get(&entry.function).ok_or_else(|| {
            CodegenError::not_found("destructor", unit.functions.get(entry.function).label.clone())
        })?;
        destructors.push((jit.get_function_ptr_by_id(*func_id), entry.offset));
    }

    let layout = unit
        .root
        .entries()
        .iter()
        .map(|e| DataEntry {
            name: unit.path_name(&e.id),
            type_name: unit.type_name(e.ty),
            offset: e.offset,
            size: e.size,
        })
        .collect();

    let stats = CodegenStats {
        functions: functions.len(),
        registers,
        optimizer: unit.stats.clone(),
    };
    tracing::debug!(
        functions = stats.functions,
        spills = stats.registers.spills,
        data_size = unit.root.size(),
        "code generation complete"
    );

    let disasm = jit.get_disasm().to_vec();
    Ok(CompiledObject {
        jit: Some(jit),
        functions: exported,
        root: std::mem::take(&mut unit.root),
        layout,
        destructors,
        stats,
        disasm,
    })
}

fn lower_functions(
    jit: &mut JitContext,
    unit: &Compilation,
    links: &mut FunctionLinks,
    functions: &[(FunctionId, NodeId)],
    options: &JitOptions,
    root_base: i64,
) -> CodegenResult<RegisterStats> {
    for &(id, def) in functions {
        let data = unit.functions.get(id);
        let sig = abi_signature(&jit.module, unit, data).map_err(|e| e.with_span(unit.ast.span(def)))?;
        let func_id = jit.declare_function(&symbol_name(&data.label, id), &sig)?;
        links.defined.insert(id, func_id);
    }

    let mut builder_ctx = FunctionBuilderContext::new();
    let mut registers = RegisterStats::default();
    for &(id, def) in functions {
        if unit.options.abort.is_aborted() {
            return Err(CodegenError::aborted().with_span(unit.ast.span(def)));
        }
        let stats = define_function(jit, unit, links, id, def, options, root_base, &mut builder_ctx)?;
        registers.merge(stats);
    }
    jit.finalize()?;
    Ok(registers)
}

#[allow(clippy::too_many_arguments)]
fn define_function(
    jit: &mut JitContext,
    unit: &Compilation,
    links: &mut FunctionLinks,
    id: FunctionId,
    def: NodeId,
    options: &JitOptions,
    root_base: i64,
    builder_ctx: &mut FunctionBuilderContext,
) -> CodegenResult<RegisterStats> {
    let data = unit.functions.get(id);
    let NodeKind::FunctionDef(fdef) = unit.ast.kind(def) else {
        return Err(CodegenError::internal("function without a definition node"));
    };
    let func_id = *links
        .defined
        .get(&id)
        .ok_or_else(|| CodegenError::not_found("function", data.label.clone()))?;
    let _span = tracing::debug_span!("function", name = %data.label).entered();

    jit.ctx.func.signature = abi_signature(&jit.module, unit, data)?;
    let (func, module) = jit.split_for_compile();
    let mut builder = FunctionBuilder::new(func, builder_ctx);
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);
    let params = builder.block_params(entry).to_vec();

    let stats = {
        let mut cg = Cg::new(&mut builder, module, unit, links, options, data.ret, root_base);
        cg.bind_params(data, &params)?;
        if !cg.statement(fdef.body)? {
            cg.implicit_return()?;
        }
        cg.pool.stats()
    };
    builder.seal_all_blocks();
    builder.finalize();

    tracing::debug!(
        pushes = stats.pushes,
        spills = stats.spills,
        peak_live = stats.peak_live,
        "lowered function"
    );
    jit.define_function(func_id).map_err(|e| e.with_span(unit.ast.span(def)))?;
    jit.clear();
    Ok(stats)
}
