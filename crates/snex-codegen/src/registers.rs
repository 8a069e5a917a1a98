// src/registers.rs
//
// Register pool for expression temporaries. Each function gets a fixed
// number of general purpose and floating point registers, modelled as
// Cranelift variables. A temporary pushed while its class is full evicts
// the least recently used occupant to a stack slot; reading a spilled
// temporary reloads it from the slot.
//
// Spill stores are emitted in the block that is current when the eviction
// happens, so a temporary that stays live across an expression-level
// branch must be spilled before the branch. `spill_all` does that.

use cranelift::prelude::{FunctionBuilder, InstBuilder, StackSlotData, StackSlotKind, Type, Value, Variable};
use cranelift_codegen::ir::StackSlot;
use smallvec::SmallVec;

use crate::errors::{CodegenError, CodegenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    General,
    Float,
}

impl RegisterClass {
    pub fn of(ty: Type) -> Self {
        if ty.is_float() {
            RegisterClass::Float
        } else {
            RegisterClass::General
        }
    }
}

/// Handle of a live temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    pub pushes: u32,
    pub spills: u32,
    pub reloads: u32,
    pub peak_live: u32,
    /// Stack bytes reserved for spill slots.
    pub spill_bytes: u32,
}

impl RegisterStats {
    pub fn merge(&mut self, other: RegisterStats) {
        self.pushes += other.pushes;
        self.spills += other.spills;
        self.reloads += other.reloads;
        self.peak_live = self.peak_live.max(other.peak_live);
        self.spill_bytes += other.spill_bytes;
    }
}

#[derive(Debug, Clone, Copy)]
enum Location {
    Register(usize),
    Spilled(StackSlot, u32),
}

#[derive(Debug, Clone, Copy)]
struct Live {
    ty: Type,
    location: Location,
    last_use: u64,
}

#[derive(Debug, Default)]
struct Slot {
    /// One variable per value type this register has carried.
    vars: SmallVec<[(Type, Variable); 2]>,
    owner: Option<Reg>,
}

#[derive(Debug)]
pub struct RegisterPool {
    gp: Vec<Slot>,
    fp: Vec<Slot>,
    live: Vec<Option<Live>>,
    live_now: usize,
    free_spills: Vec<(StackSlot, u32)>,
    max_spill_bytes: u32,
    clock: u64,
    stats: RegisterStats,
}

impl RegisterPool {
    pub fn new(gp_registers: usize, fp_registers: usize, max_spill_bytes: u32) -> Self {
        Self {
            gp: (0..gp_registers).map(|_| Slot::default()).collect(),
            fp: (0..fp_registers).map(|_| Slot::default()).collect(),
            live: Vec::new(),
            live_now: 0,
            free_spills: Vec::new(),
            max_spill_bytes,
            clock: 0,
            stats: RegisterStats::default(),
        }
    }

    pub fn stats(&self) -> RegisterStats {
        self.stats
    }

    pub fn live_count(&self) -> usize {
        self.live_now
    }

    fn slots(&mut self, class: RegisterClass) -> &mut Vec<Slot> {
        match class {
            RegisterClass::General => &mut self.gp,
            RegisterClass::Float => &mut self.fp,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Place `value` in a register of its class, evicting if the class is full.
    pub fn push(&mut self, builder: &mut FunctionBuilder, value: Value) -> CodegenResult<Reg> {
        let ty = builder.func.dfg.value_type(value);
        let class = RegisterClass::of(ty);
        let reg = Reg(self.live.len() as u32);
        self.stats.pushes += 1;

        let index = match self.free_register(class) {
            Some(index) => Some(index),
            None => self.evict(builder, class)?,
        };
        let location = match index {
            Some(index) => {
                let var = self.variable(builder, class, index, ty);
                builder.def_var(var, value);
                self.slots(class)[index].owner = Some(reg);
                Location::Register(index)
            }
            // Empty class: the value goes straight to the stack
            None => {
                let (slot, size) = self.spill_slot(builder, ty)?;
                builder.ins().stack_store(value, slot, 0);
                self.stats.spills += 1;
                Location::Spilled(slot, size)
            }
        };
        let last_use = self.tick();
        self.live.push(Some(Live {
            ty,
            location,
            last_use,
        }));
        self.live_now += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.live_count() as u32);
        Ok(reg)
    }

    /// Current value of a live temporary.
    pub fn get(&mut self, builder: &mut FunctionBuilder, reg: Reg) -> CodegenResult<Value> {
        let now = self.tick();
        let live = self
            .live
            .get_mut(reg.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| CodegenError::internal("read of a released register"))?;
        live.last_use = now;
        let (ty, location) = (live.ty, live.location);
        match location {
            Location::Register(index) => {
                let class = RegisterClass::of(ty);
                let var = self.variable(builder, class, index, ty);
                Ok(builder.use_var(var))
            }
            Location::Spilled(slot, _) => {
                self.stats.reloads += 1;
                Ok(builder.ins().stack_load(ty, slot, 0))
            }
        }
    }

    /// Read and release in one step.
    pub fn take(&mut self, builder: &mut FunctionBuilder, reg: Reg) -> CodegenResult<Value> {
        let value = self.get(builder, reg)?;
        self.release(reg);
        Ok(value)
    }

    pub fn release(&mut self, reg: Reg) {
        let Some(live) = self.live.get_mut(reg.0 as usize).and_then(Option::take) else {
            return;
        };
        self.live_now -= 1;
        match live.location {
            Location::Register(index) => {
                let class = RegisterClass::of(live.ty);
                self.slots(class)[index].owner = None;
            }
            Location::Spilled(slot, size) => self.free_spills.push((slot, size)),
        }
    }

    /// Move every live temporary to the stack. Called before a branch inside
    /// an expression so that reloads after the merge see the same slot on
    /// every path.
    pub fn spill_all(&mut self, builder: &mut FunctionBuilder) -> CodegenResult<()> {
        for i in 0..self.live.len() {
            if let Some(Live {
                location: Location::Register(_),
                ..
            }) = self.live[i]
            {
                self.spill(builder, Reg(i as u32))?;
            }
        }
        Ok(())
    }

    fn slots_ref(&self, class: RegisterClass) -> &[Slot] {
        match class {
            RegisterClass::General => &self.gp,
            RegisterClass::Float => &self.fp,
        }
    }

    fn free_register(&self, class: RegisterClass) -> Option<usize> {
        self.slots_ref(class).iter().position(|s| s.owner.is_none())
    }

    /// Spill the least recently used occupant of `class`. Returns the
    /// register it vacated, or `None` if the class has no registers.
    fn evict(&mut self, builder: &mut FunctionBuilder, class: RegisterClass) -> CodegenResult<Option<usize>> {
        let victim = self
            .slots_ref(class)
            .iter()
            .filter_map(|s| s.owner)
            .min_by_key(|reg| {
                self.live[reg.0 as usize]
                    .map(|l| l.last_use)
                    .unwrap_or(u64::MAX)
            });
        let Some(victim) = victim else {
            return Ok(None);
        };
        let index = self.spill(builder, victim)?;
        Ok(Some(index))
    }

    fn spill(&mut self, builder: &mut FunctionBuilder, reg: Reg) -> CodegenResult<usize> {
        let Some(live) = self.live[reg.0 as usize] else {
            return Err(CodegenError::internal("spill of a released register"));
        };
        let Location::Register(index) = live.location else {
            return Err(CodegenError::internal("spill of a spilled register"));
        };
        let class = RegisterClass::of(live.ty);
        let var = self.variable(builder, class, index, live.ty);
        let value = builder.use_var(var);
        let (slot, size) = self.spill_slot(builder, live.ty)?;
        builder.ins().stack_store(value, slot, 0);
        self.slots(class)[index].owner = None;
        if let Some(entry) = self.live[reg.0 as usize].as_mut() {
            entry.location = Location::Spilled(slot, size);
        }
        self.stats.spills += 1;
        tracing::trace!(?class, ty = %live.ty, "spilled register");
        Ok(index)
    }

    fn spill_slot(&mut self, builder: &mut FunctionBuilder, ty: Type) -> CodegenResult<(StackSlot, u32)> {
        let size = ty.bytes();
        if let Some(pos) = self.free_spills.iter().position(|(_, s)| *s == size) {
            return Ok(self.free_spills.swap_remove(pos));
        }
        let needed = self.stats.spill_bytes + size;
        if needed > self.max_spill_bytes {
            return Err(CodegenError::register_exhausted(needed, self.max_spill_bytes));
        }
        self.stats.spill_bytes = needed;
        let align_shift = size.trailing_zeros() as u8;
        let slot = builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align_shift,
        ));
        Ok((slot, size))
    }

    fn variable(&mut self, builder: &mut FunctionBuilder, class: RegisterClass, index: usize, ty: Type) -> Variable {
        let slot = &mut self.slots(class)[index];
        if let Some((_, var)) = slot.vars.iter().find(|(t, _)| *t == ty) {
            return *var;
        }
        let var = builder.declare_var(ty);
        slot.vars.push((ty, var));
        var
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::{JitContext, JitOptions};
    use cranelift::prelude::*;

    /// Build `fn(i32, i32, i32, i32) -> i32` computing `(a + b) + (c + d)`
    /// with every operand held in the pool, then call it.
    fn sum_of_four(gp: usize, max_spill_bytes: u32) -> CodegenResult<(RegisterStats, i32)> {
        let mut jit = JitContext::with_options(&JitOptions::default(), &[])?;
        let sig = jit.create_signature(&[types::I32; 4], Some(types::I32));
        let func_id = jit.declare_function("sum", &sig)?;
        jit.ctx.func.signature = sig;

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut jit.ctx.func, &mut builder_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let params: Vec<Value> = builder.block_params(entry).to_vec();

        let mut pool = RegisterPool::new(gp, 2, max_spill_bytes);
        let regs = params
            .iter()
            .map(|p| pool.push(&mut builder, *p))
            .collect::<CodegenResult<Vec<_>>>()?;
        let a = pool.take(&mut builder, regs[0])?;
        let b = pool.take(&mut builder, regs[1])?;
        let ab = builder.ins().iadd(a, b);
        let ab = pool.push(&mut builder, ab)?;
        let c = pool.take(&mut builder, regs[2])?;
        let d = pool.take(&mut builder, regs[3])?;
        let cd = builder.ins().iadd(c, d);
        let ab = pool.take(&mut builder, ab)?;
        let sum = builder.ins().iadd(ab, cd);
        builder.ins().return_(&[sum]);
        builder.finalize();
        assert_eq!(pool.live_count(), 0);
        let stats = pool.stats();

        jit.define_function(func_id)?;
        jit.finalize()?;
        let f: extern "C" fn(i32, i32, i32, i32) -> i32 =
            unsafe { std::mem::transmute(jit.get_function_ptr("sum").unwrap()) };
        Ok((stats, f(1, 2, 3, 4)))
    }

    #[test]
    fn large_pool_never_spills() {
        let (stats, result) = sum_of_four(8, 64).unwrap();
        assert_eq!(result, 10);
        assert_eq!(stats.spills, 0);
        assert_eq!(stats.reloads, 0);
        assert_eq!(stats.peak_live, 4);
    }

    #[test]
    fn small_pool_spills_least_recently_used() {
        let (stats, result) = sum_of_four(2, 64).unwrap();
        assert_eq!(result, 10);
        // a and b are evicted by c and d, then c by a + b
        assert_eq!(stats.spills, 3);
        assert_eq!(stats.reloads, 3);
        // The third spill reuses a released slot
        assert_eq!(stats.spill_bytes, 8);
    }

    #[test]
    fn empty_class_goes_straight_to_the_stack() {
        let (stats, result) = sum_of_four(0, 64).unwrap();
        assert_eq!(result, 10);
        assert_eq!(stats.spills, stats.pushes);
    }

    #[test]
    fn spill_limit_is_enforced() {
        let err = sum_of_four(1, 4).err();
        assert!(
            matches!(
                err.as_ref().map(|e| &e.kind),
                Some(crate::errors::CodegenErrorKind::RegisterExhausted { needed: 8, limit: 4 })
            ),
            "{err:?}"
        );
    }
}
