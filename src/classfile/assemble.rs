use crate::classfile::{
    descriptor::MethodDescriptor,
    insn::{Constant, Insn, Label},
    opcodes::*,
    pool::ConstantPool,
    ClassFormatError, MethodRecord,
};
use std::collections::HashMap;

const MAX_CODE_LENGTH: usize = 65535;

#[derive(Debug)]
pub struct Assembled {
    pub code: Vec<u8>,
    pub max_stack: u16,
}

enum Piece {
    Bytes(Vec<u8>),
    Jump { opcode: u8, target: Label },
    Mark(Label),
}

impl Piece {
    fn len(&self) -> usize {
        match self {
            Piece::Bytes(bytes) => bytes.len(),
            Piece::Jump { .. } => 3,
            Piece::Mark(_) => 0,
        }
    }
}

/// Encodes `method` against `pool`, resolving labels to branch offsets.
pub fn assemble(method: &MethodRecord, pool: &mut ConstantPool) -> Result<Assembled, ClassFormatError> {
    let max_stack = max_stack(method)?;
    let pieces = method
        .code
        .iter()
        .map(|insn| encode(insn, pool))
        .collect::<Result<Vec<_>, _>>()?;

    let mut offsets = HashMap::new();
    let mut position = 0usize;
    for piece in &pieces {
        if let Piece::Mark(label) = piece {
            offsets.insert(*label, position);
        }
        position += piece.len();
    }
    if position > MAX_CODE_LENGTH {
        return Err(ClassFormatError::CodeTooLarge {
            method: method.name.clone(),
        });
    }

    let mut code = Vec::with_capacity(position);
    for piece in pieces {
        match piece {
            Piece::Bytes(bytes) => code.extend_from_slice(&bytes),
            Piece::Jump { opcode, target } => {
                let at = code.len();
                let destination = offsets.get(&target).copied().ok_or_else(|| {
                    ClassFormatError::UnknownLabel {
                        method: method.name.clone(),
                    }
                })?;
                let delta = destination as i64 - at as i64;
                let delta = i16::try_from(delta).map_err(|_| ClassFormatError::BranchOutOfRange {
                    method: method.name.clone(),
                })?;
                code.push(opcode);
                code.extend_from_slice(&delta.to_be_bytes());
            }
            Piece::Mark(_) => {}
        }
    }
    Ok(Assembled { code, max_stack })
}

fn encode(insn: &Insn, pool: &mut ConstantPool) -> Result<Piece, ClassFormatError> {
    let bytes = match insn {
        Insn::Op(opcode) => vec![*opcode],
        Insn::Push(constant) => encode_constant(constant, pool)?,
        Insn::Local { opcode, slot } => match u8::try_from(*slot) {
            Ok(slot) => vec![*opcode, slot],
            Err(_) => {
                let [hi, lo] = slot.to_be_bytes();
                vec![WIDE, *opcode, hi, lo]
            }
        },
        Insn::Jump { opcode, target } => {
            return Ok(Piece::Jump {
                opcode: *opcode,
                target: *target,
            })
        }
        Insn::Mark(label) => return Ok(Piece::Mark(*label)),
        Insn::Type { opcode, class } => with_index(*opcode, pool.class(class)?),
        Insn::Field {
            opcode,
            owner,
            name,
            descriptor,
        } => with_index(*opcode, pool.field_ref(owner, name, descriptor)?),
        Insn::Invoke {
            opcode,
            owner,
            name,
            descriptor,
        } => {
            let interface = *opcode == INVOKEINTERFACE;
            let index = pool.method_ref(owner, name, descriptor, interface)?;
            let mut bytes = with_index(*opcode, index);
            if interface {
                let count = MethodDescriptor::parse(descriptor)?.arg_slots() + 1;
                bytes.push(count as u8);
                bytes.push(0);
            }
            bytes
        }
    };
    Ok(Piece::Bytes(bytes))
}

fn with_index(opcode: u8, index: u16) -> Vec<u8> {
    let [hi, lo] = index.to_be_bytes();
    vec![opcode, hi, lo]
}

fn ldc(index: u16) -> Vec<u8> {
    match u8::try_from(index) {
        Ok(short) => vec![LDC, short],
        Err(_) => with_index(LDC_W, index),
    }
}

fn encode_constant(constant: &Constant, pool: &mut ConstantPool) -> Result<Vec<u8>, ClassFormatError> {
    let bytes = match constant {
        Constant::Int(value) => match *value {
            -1..=5 => vec![(i32::from(ICONST_0) + value) as u8],
            -128..=127 => vec![BIPUSH, *value as i8 as u8],
            -32768..=32767 => {
                let [hi, lo] = (*value as i16).to_be_bytes();
                vec![SIPUSH, hi, lo]
            }
            _ => ldc(pool.integer(*value)?),
        },
        Constant::Float(value) => {
            if value.to_bits() == 0f32.to_bits() {
                vec![FCONST_0]
            } else if *value == 1.0 {
                vec![FCONST_1]
            } else if *value == 2.0 {
                vec![FCONST_2]
            } else {
                ldc(pool.float(*value)?)
            }
        }
        Constant::Double(value) => {
            if value.to_bits() == 0f64.to_bits() {
                vec![DCONST_0]
            } else if *value == 1.0 {
                vec![DCONST_1]
            } else {
                with_index(LDC2_W, pool.double(*value)?)
            }
        }
        Constant::Str(text) => ldc(pool.string(text)?),
    };
    Ok(bytes)
}

/// Deepest operand stack reached on any path. Branch targets inherit the depth of
/// the first edge seen; code after an unconditional transfer restarts from the
/// depth recorded for its label.
pub fn max_stack(method: &MethodRecord) -> Result<u16, ClassFormatError> {
    let mut at_label: HashMap<Label, i32> = HashMap::new();
    let mut depth = 0i32;
    let mut deepest = 0i32;
    let mut reachable = true;
    for insn in &method.code {
        if let Insn::Mark(label) = insn {
            match at_label.get(label) {
                Some(known) if !reachable => depth = *known,
                Some(_) => {}
                None if reachable => {
                    at_label.insert(*label, depth);
                }
                None => depth = 0,
            }
            reachable = true;
            continue;
        }
        depth += insn.stack_effect()?;
        if depth < 0 {
            return Err(ClassFormatError::StackUnderflow {
                method: method.name.clone(),
            });
        }
        deepest = deepest.max(depth);
        if let Insn::Jump { target, .. } = insn {
            at_label.entry(*target).or_insert(depth);
        }
        if insn.is_terminal() {
            reachable = false;
        }
    }
    u16::try_from(deepest).map_err(|_| ClassFormatError::CodeTooLarge {
        method: method.name.clone(),
    })
}
