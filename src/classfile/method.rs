use crate::classfile::{
    descriptor::{DescriptorError, FieldType, MethodDescriptor},
    insn::{Constant, Insn, Label},
    opcodes::*,
    MethodRecord,
};
use crate::language::types::{Primitive, Representation};

/// Accumulates the instructions of one method body.
#[derive(Debug)]
pub struct MethodBuilder {
    access: u16,
    name: String,
    descriptor: String,
    code: Vec<Insn>,
    args: Vec<(u16, FieldType)>,
    next_local: u16,
    max_locals: u16,
    labels: usize,
}

impl MethodBuilder {
    pub fn new(
        access: u16,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let descriptor = descriptor.into();
        let parsed = MethodDescriptor::parse(&descriptor)?;
        let base = if access & ACC_STATIC != 0 { 0 } else { 1 };
        let args: Vec<(u16, FieldType)> = parsed
            .arg_offsets(base)
            .into_iter()
            .zip(parsed.params)
            .collect();
        let next_local = base + args.iter().map(|(_, ty)| ty.slot_size()).sum::<u16>();
        Ok(Self {
            access,
            name: name.into(),
            descriptor,
            code: Vec::new(),
            args,
            next_local,
            max_locals: next_local,
            labels: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn code(&self) -> &[Insn] {
        &self.code
    }

    pub fn new_label(&mut self) -> Label {
        self.labels += 1;
        Label(self.labels - 1)
    }

    pub fn mark(&mut self, label: Label) {
        self.code.push(Insn::Mark(label));
    }

    pub fn op(&mut self, opcode: u8) {
        self.code.push(Insn::Op(opcode));
    }

    pub fn push_int(&mut self, value: i32) {
        self.code.push(Insn::Push(Constant::Int(value)));
    }

    pub fn push_float(&mut self, value: f32) {
        self.code.push(Insn::Push(Constant::Float(value)));
    }

    pub fn push_double(&mut self, value: f64) {
        self.code.push(Insn::Push(Constant::Double(value)));
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push_int(i32::from(value));
    }

    pub fn push_str(&mut self, value: impl Into<String>) {
        self.code.push(Insn::Push(Constant::Str(value.into())));
    }

    /// Pushes the constant one of `kind`.
    pub fn push_one(&mut self, kind: Primitive) {
        match kind {
            Primitive::Float => self.push_float(1.0),
            Primitive::Double => self.push_double(1.0),
            _ => self.push_int(1),
        }
    }

    pub fn new_local(&mut self, repr: Representation) -> u16 {
        let slot = self.next_local;
        self.next_local += repr.slot_size().max(1);
        self.max_locals = self.max_locals.max(self.next_local);
        slot
    }

    pub fn load_local(&mut self, slot: u16, repr: Representation) {
        let opcode = match repr {
            Representation::Scalar(kind) => kind.load_opcode(),
            Representation::Reference | Representation::Void => ALOAD,
        };
        self.code.push(Insn::Local { opcode, slot });
    }

    pub fn store_local(&mut self, slot: u16, repr: Representation) {
        let opcode = match repr {
            Representation::Scalar(kind) => kind.store_opcode(),
            Representation::Reference | Representation::Void => ASTORE,
        };
        self.code.push(Insn::Local { opcode, slot });
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Returns false when the method has no argument at `index`.
    pub fn load_arg(&mut self, index: usize) -> bool {
        let Some((slot, ty)) = self.args.get(index) else {
            return false;
        };
        let opcode = match ty {
            FieldType::Float => FLOAD,
            FieldType::Double => DLOAD,
            FieldType::Long => LLOAD,
            FieldType::Object(_) | FieldType::Array(_) => ALOAD,
            _ => ILOAD,
        };
        let slot = *slot;
        self.code.push(Insn::Local { opcode, slot });
        true
    }

    pub fn store_arg(&mut self, index: usize) -> bool {
        let Some((slot, ty)) = self.args.get(index) else {
            return false;
        };
        let opcode = match ty {
            FieldType::Float => FSTORE,
            FieldType::Double => DSTORE,
            FieldType::Long => LSTORE,
            FieldType::Object(_) | FieldType::Array(_) => ASTORE,
            _ => ISTORE,
        };
        let slot = *slot;
        self.code.push(Insn::Local { opcode, slot });
        true
    }

    pub fn load_this(&mut self) {
        self.code.push(Insn::Local {
            opcode: ALOAD,
            slot: 0,
        });
    }

    pub fn jump(&mut self, opcode: u8, target: Label) {
        self.code.push(Insn::Jump { opcode, target });
    }

    pub fn goto(&mut self, target: Label) {
        self.jump(GOTO, target);
    }

    fn type_insn(&mut self, opcode: u8, class: impl Into<String>) {
        self.code.push(Insn::Type {
            opcode,
            class: class.into(),
        });
    }

    pub fn new_instance(&mut self, class: impl Into<String>) {
        self.type_insn(NEW, class);
    }

    pub fn check_cast(&mut self, class: impl Into<String>) {
        self.type_insn(CHECKCAST, class);
    }

    pub fn instance_of(&mut self, class: impl Into<String>) {
        self.type_insn(INSTANCEOF, class);
    }

    fn field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        self.code.push(Insn::Field {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.field_insn(GETFIELD, owner, name, descriptor);
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.field_insn(PUTFIELD, owner, name, descriptor);
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.field_insn(PUTSTATIC, owner, name, descriptor);
    }

    fn invoke(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        self.code.push(Insn::Invoke {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.invoke(INVOKESTATIC, owner, name, descriptor);
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.invoke(INVOKEVIRTUAL, owner, name, descriptor);
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.invoke(INVOKESPECIAL, owner, name, descriptor);
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) {
        self.invoke(INVOKEINTERFACE, owner, name, descriptor);
    }

    pub fn invoke_constructor(&mut self, owner: &str, descriptor: &str) {
        self.invoke_special(owner, "<init>", descriptor);
    }

    /// Scalar on the stack becomes its box; references are left alone.
    pub fn box_value(&mut self, kind: Primitive) {
        if !kind.is_scalar() {
            return;
        }
        if let Some(class) = kind.boxed_class() {
            let descriptor = format!("({})L{class};", kind.descriptor());
            self.invoke_static(class, "valueOf", &descriptor);
        }
    }

    /// Object on the stack becomes the scalar `kind`.
    pub fn unbox_value(&mut self, kind: Primitive) {
        if let (Some(class), Some(method)) = (kind.boxed_class(), kind.unbox_method()) {
            self.check_cast(class);
            let descriptor = format!("(){}", kind.descriptor());
            self.invoke_virtual(class, method, &descriptor);
        }
    }

    /// Like `unbox_value` for a value already narrowed to the box class.
    pub fn unbox_unchecked(&mut self, kind: Primitive) {
        if let (Some(class), Some(method)) = (kind.boxed_class(), kind.unbox_method()) {
            let descriptor = format!("(){}", kind.descriptor());
            self.invoke_virtual(class, method, &descriptor);
        }
    }

    pub fn pop_value(&mut self, repr: Representation) {
        match repr.slot_size() {
            0 => {}
            2 => self.op(POP2),
            _ => self.op(POP),
        }
    }

    pub fn return_value(&mut self, repr: Representation) {
        let opcode = match repr {
            Representation::Scalar(kind) => kind.return_opcode(),
            Representation::Reference => ARETURN,
            Representation::Void => RETURN,
        };
        self.op(opcode);
    }

    /// Whether control can reach the end of the code emitted so far.
    pub fn falls_through(&self) -> bool {
        self.code.last().map_or(true, |insn| !insn.is_terminal())
    }

    /// Ends the method. A body that can fall off its end gets a trailing `return`
    /// when it returns void.
    pub fn end(mut self) -> MethodRecord {
        if self.falls_through() && self.descriptor.ends_with(")V") {
            self.op(RETURN);
        }
        MethodRecord {
            access: self.access,
            name: self.name,
            descriptor: self.descriptor,
            code: self.code,
            max_locals: self.max_locals,
        }
    }
}
