use crate::classfile::opcodes::*;
use crate::language::runtime_abi::LIST_WRAPPER_CLASS;
use std::{collections::BTreeMap, fmt, sync::Arc};

pub const OBJECT_CLASS: &str = "java/lang/Object";
pub const STRING_CLASS: &str = "java/lang/String";
pub const ITERATOR_CLASS: &str = "java/util/Iterator";
pub const ARRAY_LIST_CLASS: &str = "java/util/ArrayList";
pub const STRING_BUILDER_CLASS: &str = "java/lang/StringBuilder";

/// Built-in value kinds. Widening only happens along `Int < Float < Double`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Float,
    Double,
    Boolean,
    String,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Boolean => "boolean",
            Primitive::String => "string",
            Primitive::Void => "void",
        }
    }

    pub fn widening_rank(self) -> Option<u8> {
        match self {
            Primitive::Int => Some(0),
            Primitive::Float => Some(1),
            Primitive::Double => Some(2),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.widening_rank().is_some()
    }

    /// Kinds held unboxed on the operand stack. Strings are already references.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Primitive::Int | Primitive::Float | Primitive::Double | Primitive::Boolean
        )
    }

    pub fn descriptor(self) -> &'static str {
        match self {
            Primitive::Int => "I",
            Primitive::Float => "F",
            Primitive::Double => "D",
            Primitive::Boolean => "Z",
            Primitive::String => "Ljava/lang/String;",
            Primitive::Void => "V",
        }
    }

    pub fn boxed_class(self) -> Option<&'static str> {
        match self {
            Primitive::Int => Some("java/lang/Integer"),
            Primitive::Float => Some("java/lang/Float"),
            Primitive::Double => Some("java/lang/Double"),
            Primitive::Boolean => Some("java/lang/Boolean"),
            Primitive::String => Some(STRING_CLASS),
            Primitive::Void => None,
        }
    }

    /// Method that turns the boxed value back into the scalar.
    pub fn unbox_method(self) -> Option<&'static str> {
        match self {
            Primitive::Int => Some("intValue"),
            Primitive::Float => Some("floatValue"),
            Primitive::Double => Some("doubleValue"),
            Primitive::Boolean => Some("booleanValue"),
            _ => None,
        }
    }

    pub fn slot_size(self) -> u16 {
        match self {
            Primitive::Double => 2,
            Primitive::Void => 0,
            _ => 1,
        }
    }

    pub fn load_opcode(self) -> u8 {
        match self {
            Primitive::Int | Primitive::Boolean => ILOAD,
            Primitive::Float => FLOAD,
            Primitive::Double => DLOAD,
            Primitive::String | Primitive::Void => ALOAD,
        }
    }

    pub fn store_opcode(self) -> u8 {
        match self {
            Primitive::Int | Primitive::Boolean => ISTORE,
            Primitive::Float => FSTORE,
            Primitive::Double => DSTORE,
            Primitive::String | Primitive::Void => ASTORE,
        }
    }

    pub fn return_opcode(self) -> u8 {
        match self {
            Primitive::Int | Primitive::Boolean => IRETURN,
            Primitive::Float => FRETURN,
            Primitive::Double => DRETURN,
            Primitive::String => ARETURN,
            Primitive::Void => RETURN,
        }
    }

    pub fn arithmetic_opcode(self, op: ArithOp) -> Option<u8> {
        let opcode = match (self, op) {
            (Primitive::Int, ArithOp::Add) => IADD,
            (Primitive::Int, ArithOp::Sub) => ISUB,
            (Primitive::Int, ArithOp::Mul) => IMUL,
            (Primitive::Int, ArithOp::Div) => IDIV,
            (Primitive::Int, ArithOp::Rem) => IREM,
            (Primitive::Int, ArithOp::Neg) => INEG,
            (Primitive::Float, ArithOp::Add) => FADD,
            (Primitive::Float, ArithOp::Sub) => FSUB,
            (Primitive::Float, ArithOp::Mul) => FMUL,
            (Primitive::Float, ArithOp::Div) => FDIV,
            (Primitive::Float, ArithOp::Rem) => FREM,
            (Primitive::Float, ArithOp::Neg) => FNEG,
            (Primitive::Double, ArithOp::Add) => DADD,
            (Primitive::Double, ArithOp::Sub) => DSUB,
            (Primitive::Double, ArithOp::Mul) => DMUL,
            (Primitive::Double, ArithOp::Div) => DDIV,
            (Primitive::Double, ArithOp::Rem) => DREM,
            (Primitive::Double, ArithOp::Neg) => DNEG,
            _ => return None,
        };
        Some(opcode)
    }

    /// Conversion from `self` up to `target`, if one is needed.
    pub fn widen_opcode(self, target: Primitive) -> Option<u8> {
        match (self, target) {
            (Primitive::Int, Primitive::Float) => Some(I2F),
            (Primitive::Int, Primitive::Double) => Some(I2D),
            (Primitive::Float, Primitive::Double) => Some(F2D),
            _ => None,
        }
    }
}

/// How a value of some type lives on the operand stack and in slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    Scalar(Primitive),
    Reference,
    Void,
}

impl Representation {
    pub fn is_scalar(self) -> bool {
        matches!(self, Representation::Scalar(_))
    }

    pub fn slot_size(self) -> u16 {
        match self {
            Representation::Scalar(p) => p.slot_size(),
            Representation::Reference => 1,
            Representation::Void => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    /// Internal class name, `<file>$<Name>`.
    pub qualified_name: String,
    pub fields: Vec<(String, Type)>,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }

    pub fn constructor_descriptor(&self) -> String {
        let params: String = self.fields.iter().map(|(_, ty)| ty.descriptor()).collect();
        format!("({params})V")
    }
}

/// A struct type, possibly monomorphized: `resolved` binds the placeholders used by
/// its generic fields. Two uses with different bindings are different types even
/// though they share one class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructType {
    pub def: Arc<StructDef>,
    pub resolved: BTreeMap<String, Type>,
}

impl StructType {
    pub fn plain(def: Arc<StructDef>) -> Self {
        Self {
            def,
            resolved: BTreeMap::new(),
        }
    }

    pub fn is_monomorphized(&self) -> bool {
        !self.resolved.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallBinding {
    /// Defined in ixion source; `owner` is set when it lives in another file's unit.
    User { owner: Option<String> },
    /// Fixed static method of an external class.
    External { owner: String, method: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub binding: CallBinding,
}

impl FunctionSig {
    pub fn user(name: impl Into<String>, params: Vec<(String, Type)>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            binding: CallBinding::User { owner: None },
        }
    }

    pub fn external(
        owner: impl Into<String>,
        method: impl Into<String>,
        params: Vec<(String, Type)>,
        ret: Type,
    ) -> Self {
        let method = method.into();
        Self {
            name: method.clone(),
            params,
            ret,
            binding: CallBinding::External {
                owner: owner.into(),
                method,
            },
        }
    }

    pub fn is_generic(&self) -> bool {
        self.params.iter().any(|(_, ty)| ty.contains_generic()) || self.ret.contains_generic()
    }

    pub fn is_external(&self) -> bool {
        matches!(self.binding, CallBinding::External { .. })
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        self.params.iter().map(|(_, ty)| ty)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Primitive(Primitive),
    Struct(StructType),
    /// Always stored boxed.
    Union(Vec<Type>),
    Generic(String),
    /// Bound to a class of the host platform, by internal name.
    External(String),
    Function(Arc<FunctionSig>),
    /// Runtime list wrapper carrying the element type name as a tag.
    List(Box<Type>),
}

impl Type {
    pub const INT: Type = Type::Primitive(Primitive::Int);
    pub const FLOAT: Type = Type::Primitive(Primitive::Float);
    pub const DOUBLE: Type = Type::Primitive(Primitive::Double);
    pub const BOOLEAN: Type = Type::Primitive(Primitive::Boolean);
    pub const STRING: Type = Type::Primitive(Primitive::String);
    pub const VOID: Type = Type::Primitive(Primitive::Void);

    pub fn generic(key: impl Into<String>) -> Type {
        Type::Generic(key.into())
    }

    pub fn object() -> Type {
        Type::External(OBJECT_CLASS.into())
    }

    pub fn iterator() -> Type {
        Type::External(ITERATOR_CLASS.into())
    }

    pub fn list_of(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Void))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::String))
    }

    pub fn contains_generic(&self) -> bool {
        match self {
            Type::Generic(_) => true,
            Type::Union(members) => members.iter().any(Type::contains_generic),
            Type::List(element) => element.contains_generic(),
            _ => false,
        }
    }

    pub fn representation(&self) -> Representation {
        match self {
            Type::Primitive(Primitive::Void) => Representation::Void,
            Type::Primitive(p) if p.is_scalar() => Representation::Scalar(*p),
            _ => Representation::Reference,
        }
    }

    /// Internal class name used for `new`, `checkcast` and `instanceof`. Scalars map
    /// to their box class.
    pub fn class_name(&self) -> String {
        match self {
            Type::Primitive(p) => p.boxed_class().unwrap_or(OBJECT_CLASS).to_string(),
            Type::Struct(st) => st.def.qualified_name.clone(),
            Type::External(class) => class.clone(),
            Type::List(_) => LIST_WRAPPER_CLASS.to_string(),
            Type::Union(_) | Type::Generic(_) | Type::Function(_) => OBJECT_CLASS.to_string(),
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            Type::Primitive(p) => p.descriptor().to_string(),
            Type::Struct(st) => format!("L{};", st.def.qualified_name),
            Type::External(class) => format!("L{class};"),
            Type::List(_) => format!("L{LIST_WRAPPER_CLASS};"),
            Type::Union(_) | Type::Generic(_) | Type::Function(_) => {
                format!("L{OBJECT_CLASS};")
            }
        }
    }

    /// Replace every bound placeholder; unbound ones are left in place.
    pub fn substitute(&self, map: &BTreeMap<String, Type>) -> Type {
        match self {
            Type::Generic(key) => map.get(key).cloned().unwrap_or_else(|| self.clone()),
            Type::Union(members) => Type::Union(members.iter().map(|m| m.substitute(map)).collect()),
            Type::List(element) => Type::List(Box::new(element.substitute(map))),
            Type::Struct(st) if st.is_monomorphized() => Type::Struct(StructType {
                def: st.def.clone(),
                resolved: st
                    .resolved
                    .iter()
                    .map(|(key, ty)| (key.clone(), ty.substitute(map)))
                    .collect(),
            }),
            other => other.clone(),
        }
    }

    /// Name used as the element tag of list wrappers.
    pub fn name(&self) -> String {
        match self {
            Type::Primitive(p) => p.name().to_string(),
            Type::Struct(st) => st.def.name.clone(),
            Type::Union(members) => members
                .iter()
                .map(Type::name)
                .collect::<Vec<_>>()
                .join(" | "),
            Type::Generic(key) => key.clone(),
            Type::External(class) => class.rsplit('/').next().unwrap_or(class).to_string(),
            Type::Function(sig) => sig.name.clone(),
            Type::List(element) => format!("[{}]", element.name()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
