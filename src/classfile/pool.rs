use crate::classfile::ClassFormatError;
use std::collections::HashMap;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Entry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
}

impl Entry {
    fn width(&self) -> u16 {
        match self {
            Entry::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Interned constants; equal entries share one index.
#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<Entry>,
    index: HashMap<Entry, u16>,
    next: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: 1,
        }
    }

    fn intern(&mut self, entry: Entry) -> Result<u16, ClassFormatError> {
        if let Some(index) = self.index.get(&entry) {
            return Ok(*index);
        }
        let index = self.next;
        let next = u32::from(index) + u32::from(entry.width());
        if next > u32::from(u16::MAX) {
            return Err(ClassFormatError::PoolOverflow);
        }
        self.next = next as u16;
        self.index.insert(entry.clone(), index);
        self.entries.push(entry);
        Ok(index)
    }

    pub fn utf8(&mut self, text: &str) -> Result<u16, ClassFormatError> {
        self.intern(Entry::Utf8(text.to_string()))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16, ClassFormatError> {
        self.intern(Entry::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16, ClassFormatError> {
        self.intern(Entry::Float(value.to_bits()))
    }

    pub fn double(&mut self, value: f64) -> Result<u16, ClassFormatError> {
        self.intern(Entry::Double(value.to_bits()))
    }

    pub fn class(&mut self, internal_name: &str) -> Result<u16, ClassFormatError> {
        let name = self.utf8(internal_name)?;
        self.intern(Entry::Class(name))
    }

    pub fn string(&mut self, text: &str) -> Result<u16, ClassFormatError> {
        let utf8 = self.utf8(text)?;
        self.intern(Entry::String(utf8))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFormatError> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.intern(Entry::NameAndType(name, descriptor))
    }

    pub fn field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassFormatError> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.intern(Entry::Fieldref(class, nat))
    }

    pub fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16, ClassFormatError> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        if interface {
            self.intern(Entry::InterfaceMethodref(class, nat))
        } else {
            self.intern(Entry::Methodref(class, nat))
        }
    }

    /// Value of the `constant_pool_count` item.
    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count().to_be_bytes());
        for entry in &self.entries {
            match entry {
                Entry::Utf8(text) => {
                    out.push(TAG_UTF8);
                    let bytes = modified_utf8(text);
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                Entry::Integer(value) => {
                    out.push(TAG_INTEGER);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                Entry::Float(bits) => {
                    out.push(TAG_FLOAT);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Entry::Double(bits) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                Entry::Class(name) => {
                    out.push(TAG_CLASS);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                Entry::String(utf8) => {
                    out.push(TAG_STRING);
                    out.extend_from_slice(&utf8.to_be_bytes());
                }
                Entry::Fieldref(class, nat) => write_pair(out, TAG_FIELDREF, *class, *nat),
                Entry::Methodref(class, nat) => write_pair(out, TAG_METHODREF, *class, *nat),
                Entry::InterfaceMethodref(class, nat) => {
                    write_pair(out, TAG_INTERFACE_METHODREF, *class, *nat)
                }
                Entry::NameAndType(name, descriptor) => {
                    write_pair(out, TAG_NAME_AND_TYPE, *name, *descriptor)
                }
            }
        }
    }
}

fn write_pair(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    out.extend_from_slice(&first.to_be_bytes());
    out.extend_from_slice(&second.to_be_bytes());
}

/// NUL is written as two bytes and supplementary characters as surrogate pairs.
fn modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}
