//! Class-file output: symbolic method bodies, their assembly and serialization.

pub mod assemble;
pub mod descriptor;
pub mod insn;
pub mod method;
pub mod opcodes;
pub mod pool;

use crate::classfile::{
    assemble::assemble, descriptor::DescriptorError, insn::Insn, opcodes::*, pool::ConstantPool,
};
use crate::language::types::OBJECT_CLASS;
use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("constant pool exceeds 65535 entries")]
    PoolOverflow,
    #[error("method `{method}` is too large")]
    CodeTooLarge { method: String },
    #[error("branch in `{method}` is out of range")]
    BranchOutOfRange { method: String },
    #[error("branch in `{method}` targets a label that is never placed")]
    UnknownLabel { method: String },
    #[error("operand stack underflow in `{method}`")]
    StackUnderflow { method: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRecord {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodRecord {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Vec<Insn>,
    pub max_locals: u16,
}

/// One nominal type of the output: a file unit or a struct.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassUnit {
    pub name: String,
    pub super_name: String,
    pub access: u16,
    pub source_file: Option<String>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
}

impl ClassUnit {
    pub fn new(name: impl Into<String>, access: u16) -> Self {
        Self {
            name: name.into(),
            super_name: OBJECT_CLASS.to_string(),
            access,
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn add_field(&mut self, access: u16, name: impl Into<String>, descriptor: impl Into<String>) {
        self.fields.push(FieldRecord {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
        });
    }

    pub fn method(&self, name: &str) -> Option<&MethodRecord> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodRecord> + 'a {
        self.methods.iter().filter(move |method| method.name == name)
    }

    pub fn has_method(&self, name: &str, descriptor: &str) -> bool {
        self.methods
            .iter()
            .any(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Serializes the unit; `major_version` selects the class-file version.
    pub fn to_bytes(&self, major_version: u16) -> Result<Vec<u8>, ClassFormatError> {
        let mut pool = ConstantPool::new();
        let this_class = pool.class(&self.name)?;
        let super_class = pool.class(&self.super_name)?;
        let code_attr = pool.utf8("Code")?;

        let mut fields = Vec::new();
        fields.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for field in &self.fields {
            fields.extend_from_slice(&field.access.to_be_bytes());
            fields.extend_from_slice(&pool.utf8(&field.name)?.to_be_bytes());
            fields.extend_from_slice(&pool.utf8(&field.descriptor)?.to_be_bytes());
            fields.extend_from_slice(&0u16.to_be_bytes());
        }

        let mut methods = Vec::new();
        methods.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            methods.extend_from_slice(&method.access.to_be_bytes());
            methods.extend_from_slice(&pool.utf8(&method.name)?.to_be_bytes());
            methods.extend_from_slice(&pool.utf8(&method.descriptor)?.to_be_bytes());
            methods.extend_from_slice(&1u16.to_be_bytes());

            let assembled = assemble(method, &mut pool)?;
            let length = 2 + 2 + 4 + assembled.code.len() + 2 + 2;
            methods.extend_from_slice(&code_attr.to_be_bytes());
            methods.extend_from_slice(&(length as u32).to_be_bytes());
            methods.extend_from_slice(&assembled.max_stack.to_be_bytes());
            methods.extend_from_slice(&method.max_locals.to_be_bytes());
            methods.extend_from_slice(&(assembled.code.len() as u32).to_be_bytes());
            methods.extend_from_slice(&assembled.code);
            methods.extend_from_slice(&0u16.to_be_bytes());
            methods.extend_from_slice(&0u16.to_be_bytes());
        }

        let mut attributes = Vec::new();
        match &self.source_file {
            Some(source) => {
                let name = pool.utf8("SourceFile")?;
                let value = pool.utf8(source)?;
                attributes.extend_from_slice(&1u16.to_be_bytes());
                attributes.extend_from_slice(&name.to_be_bytes());
                attributes.extend_from_slice(&2u32.to_be_bytes());
                attributes.extend_from_slice(&value.to_be_bytes());
            }
            None => attributes.extend_from_slice(&0u16.to_be_bytes()),
        }

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&major_version.to_be_bytes());
        pool.write(&mut out);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&this_class.to_be_bytes());
        out.extend_from_slice(&super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&fields);
        out.extend_from_slice(&methods);
        out.extend_from_slice(&attributes);
        Ok(out)
    }
}

pub const PUBLIC_STATIC: u16 = ACC_PUBLIC | ACC_STATIC;
