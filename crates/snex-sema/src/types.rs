// src/types.rs
//
// Type arena. Every type the compilation unit mentions is interned once and
// addressed by `TypeId`; two ids are the same type iff they are equal.
// Template instances (builtin `span`/`dyn` and user struct templates) are
// memoized so repeated requests return the same id.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use snex_frontend::NodeId;
use snex_identity::{Interner, NamespacedIdentifier, Symbol};

use crate::functions::FunctionId;

/// Handle into the [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const FLOAT: TypeId = TypeId(2);
    pub const DOUBLE: TypeId = TypeId(3);
    /// `block`, i.e. `dyn<float>`.
    pub const BLOCK: TypeId = TypeId(4);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_void(self) -> bool {
        self == Self::VOID
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::INT | Self::FLOAT | Self::DOUBLE)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::FLOAT | Self::DOUBLE)
    }

    /// Scalars live in registers; everything else is addressed by pointer.
    pub fn is_scalar(self) -> bool {
        self.is_void() || self.is_numeric()
    }

    pub fn is_complex(self) -> bool {
        !self.is_scalar()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnexType {
    Void,
    Int,
    Float,
    Double,
    /// Fixed-size array stored inline.
    Span { elem: TypeId, size: u32 },
    /// Pointer + size view onto external memory.
    Dyn { elem: TypeId },
    Struct(StructId),
}

/// A resolved template argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedTemplateArg {
    Type(TypeId),
    Const(i32),
}

/// Compile-time scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    Double(f64),
}

impl ConstValue {
    pub fn ty(self) -> TypeId {
        match self {
            ConstValue::Int(_) => TypeId::INT,
            ConstValue::Float(_) => TypeId::FLOAT,
            ConstValue::Double(_) => TypeId::DOUBLE,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(v) => v as f64,
            ConstValue::Double(v) => v,
        }
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            ConstValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    pub fn is_truthy(self) -> bool {
        !self.is_zero()
    }

    /// Numeric conversion with C semantics (float to int truncates and
    /// saturates).
    pub fn cast(self, to: TypeId) -> Option<ConstValue> {
        Some(match to {
            TypeId::INT => ConstValue::Int(match self {
                ConstValue::Int(v) => v,
                ConstValue::Float(v) => v as i32,
                ConstValue::Double(v) => v as i32,
            }),
            TypeId::FLOAT => ConstValue::Float(self.as_f64() as f32),
            TypeId::DOUBLE => ConstValue::Double(self.as_f64()),
            _ => return None,
        })
    }

    /// Little-endian bytes as stored in the data segment.
    pub fn to_bytes(self) -> SmallVec<[u8; 8]> {
        match self {
            ConstValue::Int(v) => SmallVec::from_slice(&v.to_le_bytes()),
            ConstValue::Float(v) => SmallVec::from_slice(&v.to_le_bytes()),
            ConstValue::Double(v) => SmallVec::from_slice(&v.to_le_bytes()),
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v:?}f"),
            ConstValue::Double(v) => write!(f, "{v:?}"),
        }
    }
}

/// Resolved type of a node or symbol plus its qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub id: TypeId,
    pub is_const: bool,
    pub is_ref: bool,
    pub is_static: bool,
}

impl TypeInfo {
    pub fn new(id: TypeId) -> Self {
        Self {
            id,
            is_const: false,
            is_ref: false,
            is_static: false,
        }
    }

    pub fn constant(id: TypeId) -> Self {
        Self {
            is_const: true,
            ..Self::new(id)
        }
    }

    pub fn with_ref(self, is_ref: bool) -> Self {
        Self { is_ref, ..self }
    }

    /// Plain value type without qualifiers.
    pub fn decay(self) -> Self {
        Self::new(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeInfo,
    pub offset: u32,
    /// Constant default initializer, if any. Members without one start at zero.
    pub default: Option<ConstValue>,
}

#[derive(Debug, Clone)]
pub struct StructType {
    pub name: NamespacedIdentifier,
    /// Display name including template arguments, e.g. `Delay<float, 8>`.
    pub label: String,
    pub template_args: Vec<ResolvedTemplateArg>,
    pub members: Vec<Member>,
    pub size: u32,
    pub align: u32,
    pub methods: Vec<FunctionId>,
    pub destructor: Option<FunctionId>,
    pub def: NodeId,
    /// Layout is final; set once every member is declared.
    pub complete: bool,
}

impl StructType {
    pub fn member(&self, name: Symbol) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Key of a memoized user template instance.
pub type InstanceKey = (NodeId, SmallVec<[ResolvedTemplateArg; 4]>);

/// Owns every type of one compilation unit.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<SnexType>,
    interned: FxHashMap<SnexType, TypeId>,
    structs: Vec<StructType>,
    instances: FxHashMap<InstanceKey, TypeId>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            interned: FxHashMap::default(),
            structs: Vec::new(),
            instances: FxHashMap::default(),
        };
        for ty in [SnexType::Void, SnexType::Int, SnexType::Float, SnexType::Double] {
            registry.intern(ty);
        }
        let block = registry.dyn_of(TypeId::FLOAT);
        debug_assert_eq!(block, TypeId::BLOCK);
        registry
    }

    fn intern(&mut self, ty: SnexType) -> TypeId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.interned.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> SnexType {
        self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `span<elem, size>`, memoized.
    pub fn span(&mut self, elem: TypeId, size: u32) -> TypeId {
        self.intern(SnexType::Span { elem, size })
    }

    /// `dyn<elem>`, memoized.
    pub fn dyn_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(SnexType::Dyn { elem })
    }

    /// Element type and length of a span.
    pub fn as_span(&self, id: TypeId) -> Option<(TypeId, u32)> {
        match self.get(id) {
            SnexType::Span { elem, size } => Some((elem, size)),
            _ => None,
        }
    }

    pub fn as_dyn(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            SnexType::Dyn { elem } => Some(elem),
            _ => None,
        }
    }

    /// Element type of anything subscriptable.
    pub fn element_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            SnexType::Span { elem, .. } | SnexType::Dyn { elem } => Some(elem),
            _ => None,
        }
    }

    pub fn as_struct(&self, id: TypeId) -> Option<&StructType> {
        match self.get(id) {
            SnexType::Struct(sid) => Some(&self.structs[sid.index()]),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self, id: TypeId) -> Option<&mut StructType> {
        match self.get(id) {
            SnexType::Struct(sid) => Some(&mut self.structs[sid.index()]),
            _ => None,
        }
    }

    /// Create an empty, incomplete struct type. Members are appended with
    /// [`add_member`](Self::add_member) and the layout closed with
    /// [`complete_struct`](Self::complete_struct).
    pub fn declare_struct(
        &mut self,
        name: NamespacedIdentifier,
        label: String,
        template_args: Vec<ResolvedTemplateArg>,
        def: NodeId,
    ) -> TypeId {
        let sid = StructId(self.structs.len() as u32);
        self.structs.push(StructType {
            name,
            label,
            template_args,
            members: Vec::new(),
            size: 0,
            align: 1,
            methods: Vec::new(),
            destructor: None,
            def,
            complete: false,
        });
        self.intern(SnexType::Struct(sid))
    }

    /// Append a member at the next aligned offset. Returns the offset.
    pub fn add_member(
        &mut self,
        owner: TypeId,
        name: Symbol,
        ty: TypeInfo,
        default: Option<ConstValue>,
    ) -> Option<u32> {
        let size = self.size_of(ty.id);
        let align = self.align_of(ty.id);
        let st = self.as_struct_mut(owner)?;
        if st.complete || st.member(name).is_some() {
            return None;
        }
        let offset = align_to(st.size, align);
        st.members.push(Member {
            name,
            ty,
            offset,
            default,
        });
        st.size = offset + size;
        st.align = st.align.max(align);
        Some(offset)
    }

    pub fn complete_struct(&mut self, owner: TypeId) {
        if let Some(st) = self.as_struct_mut(owner) {
            st.size = align_to(st.size, st.align);
            st.complete = true;
        }
    }

    /// Memoized user template instance.
    pub fn instance(&self, template: NodeId, args: &[ResolvedTemplateArg]) -> Option<TypeId> {
        self.instances
            .get(&(template, SmallVec::from_slice(args)))
            .copied()
    }

    pub fn insert_instance(&mut self, template: NodeId, args: &[ResolvedTemplateArg], ty: TypeId) {
        self.instances
            .insert((template, SmallVec::from_slice(args)), ty);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.get(id) {
            SnexType::Void => 0,
            SnexType::Int | SnexType::Float => 4,
            SnexType::Double => 8,
            SnexType::Span { elem, size } => self.stride_of(elem) * size,
            SnexType::Dyn { .. } => snex_runtime::DYN_BYTE_SIZE,
            SnexType::Struct(sid) => self.structs[sid.index()].size,
        }
    }

    pub fn align_of(&self, id: TypeId) -> u32 {
        match self.get(id) {
            SnexType::Void => 1,
            SnexType::Int | SnexType::Float => 4,
            SnexType::Double | SnexType::Dyn { .. } => 8,
            SnexType::Span { elem, .. } => self.align_of(elem),
            SnexType::Struct(sid) => self.structs[sid.index()].align,
        }
    }

    /// Distance between consecutive span elements.
    pub fn stride_of(&self, elem: TypeId) -> u32 {
        align_to(self.size_of(elem), self.align_of(elem))
    }

    pub fn display(&self, id: TypeId, interner: &Interner) -> String {
        match self.get(id) {
            SnexType::Void => "void".into(),
            SnexType::Int => "int".into(),
            SnexType::Float => "float".into(),
            SnexType::Double => "double".into(),
            SnexType::Span { elem, size } => {
                format!("span<{}, {}>", self.display(elem, interner), size)
            }
            SnexType::Dyn { elem } if elem == TypeId::FLOAT => "block".into(),
            SnexType::Dyn { elem } => format!("dyn<{}>", self.display(elem, interner)),
            SnexType::Struct(sid) => {
                let st = &self.structs[sid.index()];
                let path = st.name.parent().display(interner);
                if path.is_empty() {
                    st.label.clone()
                } else {
                    format!("{path}::{}", st.label)
                }
            }
        }
    }

    pub fn display_info(&self, info: TypeInfo, interner: &Interner) -> String {
        let mut out = String::new();
        if info.is_static {
            out.push_str("static ");
        }
        if info.is_const {
            out.push_str("const ");
        }
        out.push_str(&self.display(info.id, interner));
        if info.is_ref {
            out.push('&');
        }
        out
    }
}

pub fn align_to(value: u32, align: u32) -> u32 {
    let align = align.max(1);
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_reserved() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.get(TypeId::INT), SnexType::Int);
        assert_eq!(reg.get(TypeId::DOUBLE), SnexType::Double);
        assert_eq!(
            reg.get(TypeId::BLOCK),
            SnexType::Dyn {
                elem: TypeId::FLOAT
            }
        );
    }

    #[test]
    fn span_instances_are_memoized() {
        let mut reg = TypeRegistry::new();
        let a = reg.span(TypeId::FLOAT, 4);
        let b = reg.span(TypeId::FLOAT, 4);
        let c = reg.span(TypeId::FLOAT, 5);
        let d = reg.span(TypeId::DOUBLE, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(reg.dyn_of(TypeId::FLOAT), TypeId::BLOCK);
    }

    #[test]
    fn struct_layout_aligns_members() {
        let mut reg = TypeRegistry::new();
        let mut interner = Interner::new();
        let name = NamespacedIdentifier::single(interner.intern("Voice"));
        let st = reg.declare_struct(name, "Voice".into(), Vec::new(), NodeId::new(0));
        let gain = interner.intern("gain");
        let phase = interner.intern("phase");
        let buffer = interner.intern("buffer");

        assert_eq!(reg.add_member(st, gain, TypeInfo::new(TypeId::FLOAT), None), Some(0));
        assert_eq!(reg.add_member(st, phase, TypeInfo::new(TypeId::DOUBLE), None), Some(8));
        let span3 = reg.span(TypeId::FLOAT, 3);
        assert_eq!(reg.add_member(st, buffer, TypeInfo::new(span3), None), Some(16));
        // Duplicate member names are rejected
        assert_eq!(reg.add_member(st, gain, TypeInfo::new(TypeId::INT), None), None);
        reg.complete_struct(st);

        assert_eq!(reg.size_of(st), 32);
        assert_eq!(reg.align_of(st), 8);
        let span2 = reg.span(st, 2);
        assert_eq!(reg.size_of(span2), 64);
        assert_eq!(reg.display(span2, &interner), "span<Voice, 2>");
    }

    #[test]
    fn const_casts_follow_c_rules() {
        assert_eq!(ConstValue::Float(2.9).cast(TypeId::INT), Some(ConstValue::Int(2)));
        assert_eq!(ConstValue::Double(-1.5).cast(TypeId::INT), Some(ConstValue::Int(-1)));
        assert_eq!(ConstValue::Int(3).cast(TypeId::DOUBLE), Some(ConstValue::Double(3.0)));
        assert_eq!(ConstValue::Int(3).cast(TypeId::BLOCK), None);
        assert_eq!(ConstValue::Float(0.5).to_bytes().as_slice(), &0.5f32.to_le_bytes());
    }
}
