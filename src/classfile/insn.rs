use crate::classfile::{
    descriptor::{DescriptorError, FieldType, MethodDescriptor},
    opcodes::*,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
}

/// Symbolic instruction. Constant pool indices and branch offsets are only fixed
/// when the method is assembled.
#[derive(Clone, Debug, PartialEq)]
pub enum Insn {
    Op(u8),
    Push(Constant),
    Local {
        opcode: u8,
        slot: u16,
    },
    Jump {
        opcode: u8,
        target: Label,
    },
    Mark(Label),
    Type {
        opcode: u8,
        class: String,
    },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
}

impl Insn {
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Op(opcode)
            | Insn::Local { opcode, .. }
            | Insn::Jump { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Invoke { opcode, .. } => Some(*opcode),
            Insn::Push(_) | Insn::Mark(_) => None,
        }
    }

    /// Control never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.opcode(),
            Some(GOTO | IRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW)
        )
    }

    pub fn is_invoke(&self, method: &str) -> bool {
        matches!(self, Insn::Invoke { name, .. } if name == method)
    }

    /// Net change of the operand stack depth, in slots.
    pub fn stack_effect(&self) -> Result<i32, DescriptorError> {
        let effect = match self {
            Insn::Op(opcode) => op_effect(*opcode),
            Insn::Push(Constant::Double(_)) => 2,
            Insn::Push(_) => 1,
            Insn::Local { opcode, .. } => match *opcode {
                ILOAD | FLOAD | ALOAD => 1,
                LLOAD | DLOAD => 2,
                ISTORE | FSTORE | ASTORE => -1,
                LSTORE | DSTORE => -2,
                _ => 0,
            },
            Insn::Jump { opcode, .. } => match *opcode {
                IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL => -1,
                IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE
                | IF_ACMPEQ | IF_ACMPNE => -2,
                _ => 0,
            },
            Insn::Mark(_) => 0,
            Insn::Type { opcode, .. } => i32::from(*opcode == NEW),
            Insn::Field {
                opcode, descriptor, ..
            } => {
                let size = i32::from(FieldType::parse(descriptor)?.slot_size());
                match *opcode {
                    GETSTATIC => size,
                    PUTSTATIC => -size,
                    GETFIELD => size - 1,
                    _ => -size - 1,
                }
            }
            Insn::Invoke {
                opcode, descriptor, ..
            } => {
                let desc = MethodDescriptor::parse(descriptor)?;
                let receiver = i32::from(*opcode != INVOKESTATIC);
                i32::from(desc.return_slots()) - i32::from(desc.arg_slots()) - receiver
            }
        };
        Ok(effect)
    }
}

fn op_effect(opcode: u8) -> i32 {
    match opcode {
        IADD | ISUB | IMUL | IDIV | IREM | IXOR | FADD | FSUB | FMUL | FDIV | FREM => -1,
        DADD | DSUB | DMUL | DDIV | DREM => -2,
        I2D | F2D => 1,
        FCMPL | FCMPG => -1,
        DCMPL | DCMPG => -3,
        IRETURN | FRETURN | ARETURN | ATHROW | POP => -1,
        DRETURN | POP2 => -2,
        DUP | ACONST_NULL => 1,
        DUP2 => 2,
        _ => 0,
    }
}
