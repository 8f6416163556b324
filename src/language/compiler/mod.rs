use crate::{
    classfile::{
        method::MethodBuilder, opcodes::*, ClassFormatError, ClassUnit, MethodRecord,
        PUBLIC_STATIC,
    },
    language::{
        ast::*,
        context::{ContextTree, ScopeId},
        errors::{CodegenError, CodegenResult},
        runtime_abi::RuntimeAbi,
        span::Span,
        specialize::{self, Specialization, SpecializationTable, SpecializeError},
        types::{FunctionSig, Type, OBJECT_CLASS},
    },
    options::CodegenOptions,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

mod emit;
mod resolve;
mod scopes;
mod structs;

#[cfg(test)]
mod tests;

const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";
const INSTANCE_FIELD: &str = "instance";

/// Units produced for one source file.
#[derive(Clone, Debug)]
pub struct CompiledFile {
    pub file_unit: ClassUnit,
    pub struct_units: Vec<ClassUnit>,
}

impl CompiledFile {
    pub fn units(&self) -> impl Iterator<Item = &ClassUnit> {
        std::iter::once(&self.file_unit).chain(self.struct_units.iter())
    }

    pub fn struct_unit(&self, name: &str) -> Option<&ClassUnit> {
        self.struct_units.iter().find(|unit| unit.name == name)
    }

    /// Serializes every unit as `(internal name, class bytes)`.
    pub fn serialize(&self, class_version: u16) -> CodegenResult<Vec<(String, Vec<u8>)>> {
        self.units()
            .map(|unit| {
                unit.to_bytes(class_version)
                    .map(|bytes| (unit.name.clone(), bytes))
                    .map_err(|err| class_format_error(&unit.name, err))
            })
            .collect()
    }
}

fn class_format_error(unit: &str, err: ClassFormatError) -> CodegenError {
    CodegenError::ClassFormat {
        unit: unit.to_string(),
        message: err.to_string(),
    }
}

pub fn compile_file(file: &SourceFile, options: &CodegenOptions) -> CodegenResult<CompiledFile> {
    Compiler::new(file, options).compile()
}

/// Lowers and serializes in one step; nothing is returned unless every unit is valid.
pub fn compile_to_bytes(
    file: &SourceFile,
    options: &CodegenOptions,
) -> CodegenResult<Vec<(String, Vec<u8>)>> {
    compile_file(file, options)?.serialize(options.class_version)
}

/// Per-file lowering state. Nothing here is shared between files.
pub struct Compiler<'a> {
    file: &'a SourceFile,
    options: &'a CodegenOptions,
    context: ContextTree,
    unit: ClassUnit,
    struct_units: Vec<ClassUnit>,
    specializations: SpecializationTable,
    generic_decls: HashMap<String, &'a FunctionDecl>,
    skipped: HashSet<(String, String)>,
}

/// Where a name is stored inside the method being lowered.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Binding {
    Local { slot: u16, ty: Type },
    Arg { index: usize, ty: Type },
}

impl Binding {
    pub(super) fn ty(&self) -> &Type {
        match self {
            Binding::Local { ty, .. } | Binding::Arg { ty, .. } => ty,
        }
    }
}

/// The instantiation being lowered: its body, its placeholder bindings and its
/// slot map. Passed explicitly through every lowering call.
pub(super) struct FunctionLowering {
    pub(super) name: String,
    pub(super) builder: MethodBuilder,
    pub(super) spec: Specialization,
    pub(super) scope: ScopeId,
    pub(super) ret: Type,
    body_scope: ScopeId,
    params: HashMap<String, (usize, Type)>,
    locals: HashMap<(ScopeId, String), (u16, Type)>,
}

impl FunctionLowering {
    fn new(
        builder: MethodBuilder,
        spec: Specialization,
        body_scope: ScopeId,
        params: Vec<(String, Type)>,
        ret: Type,
    ) -> Self {
        Self {
            name: builder.name().to_string(),
            builder,
            spec,
            scope: body_scope,
            ret,
            body_scope,
            params: params
                .into_iter()
                .enumerate()
                .map(|(index, (name, ty))| (name, (index, ty)))
                .collect(),
            locals: HashMap::new(),
        }
    }

    /// Allocates a slot for `name` in `scope`; the caller stores into it.
    pub(super) fn declare_local(&mut self, scope: ScopeId, name: &str, ty: Type) -> u16 {
        let slot = self.builder.new_local(ty.representation());
        self.locals.insert((scope, name.to_string()), (slot, ty));
        slot
    }

    /// Walks the scope chain. Stops at the scope that declares `name` without a slot,
    /// so an outer variable is never picked up by mistake.
    pub(super) fn lookup(&self, context: &ContextTree, name: &str) -> Option<Binding> {
        let mut current = Some(self.scope);
        while let Some(scope) = current {
            if let Some((slot, ty)) = self.locals.get(&(scope, name.to_string())) {
                return Some(Binding::Local {
                    slot: *slot,
                    ty: ty.clone(),
                });
            }
            if scope == self.body_scope {
                if let Some((index, ty)) = self.params.get(name) {
                    return Some(Binding::Arg {
                        index: *index,
                        ty: ty.clone(),
                    });
                }
            }
            if context.declares(scope, name) {
                return None;
            }
            current = context.parent(scope);
        }
        None
    }

    pub(super) fn load(&mut self, binding: &Binding) {
        match binding {
            Binding::Local { slot, ty } => self.builder.load_local(*slot, ty.representation()),
            Binding::Arg { index, .. } => {
                self.builder.load_arg(*index);
            }
        }
    }

    pub(super) fn store(&mut self, binding: &Binding) {
        match binding {
            Binding::Local { slot, ty } => self.builder.store_local(*slot, ty.representation()),
            Binding::Arg { index, .. } => {
                self.builder.store_arg(*index);
            }
        }
    }

    pub(super) fn specialization_error(&self, err: SpecializeError, span: Span) -> CodegenError {
        CodegenError::Specialization {
            function: self.name.clone(),
            message: err.to_string(),
            span,
        }
    }
}

impl<'a> Compiler<'a> {
    pub fn new(file: &'a SourceFile, options: &'a CodegenOptions) -> Self {
        let mut context = file.context.clone();
        let root = context.root();
        RuntimeAbi::prelude(&options.runtime_owner).bind_into(&mut context, root);
        let unit_name = file.path.trim_end_matches(".ix").to_string();
        let mut unit = ClassUnit::new(unit_name, ACC_PUBLIC | ACC_SUPER);
        unit.source_file = file
            .path
            .rsplit('/')
            .next()
            .map(|name| format!("{}.ix", name.trim_end_matches(".ix")));
        Self {
            file,
            options,
            context,
            unit,
            struct_units: Vec::new(),
            specializations: SpecializationTable::new(),
            generic_decls: HashMap::new(),
            skipped: HashSet::new(),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit.name
    }

    fn trace(&self, message: impl FnOnce() -> String) {
        if self.options.trace {
            eprintln!("[ixion-debug] {}", message());
        }
    }

    pub fn compile(mut self) -> CodegenResult<CompiledFile> {
        self.emit_unit_scaffolding()?;
        let root = self.context.root();
        let file = self.file;
        for statement in &file.statements {
            self.lower_top_level(statement, root)?;
        }
        self.drain_instantiations()?;
        self.trace(|| {
            format!(
                "finished unit {} with {} methods and {} struct units",
                self.unit.name,
                self.unit.methods.len(),
                self.struct_units.len()
            )
        });
        Ok(CompiledFile {
            file_unit: self.unit,
            struct_units: self.struct_units,
        })
    }

    /// Public constructor and, when enabled, the static self-instance.
    fn emit_unit_scaffolding(&mut self) -> CodegenResult<()> {
        let mut init = self.method_builder(ACC_PUBLIC, "<init>", "()V")?;
        init.load_this();
        init.invoke_constructor(OBJECT_CLASS, "()V");
        self.unit.methods.push(init.end());

        if self.options.emit_instance {
            let own = format!("L{};", self.unit.name);
            self.unit.add_field(PUBLIC_STATIC, INSTANCE_FIELD, own.clone());
            let mut clinit = self.method_builder(ACC_STATIC, "<clinit>", "()V")?;
            clinit.new_instance(self.unit.name.clone());
            clinit.op(DUP);
            clinit.invoke_constructor(&self.unit.name, "()V");
            clinit.put_static(&self.unit.name, INSTANCE_FIELD, &own);
            self.unit.methods.push(clinit.end());
        }
        Ok(())
    }

    fn method_builder(&self, access: u16, name: &str, descriptor: &str) -> CodegenResult<MethodBuilder> {
        MethodBuilder::new(access, name, descriptor)
            .map_err(|err| class_format_error(&self.unit.name, ClassFormatError::from(err)))
    }

    fn lower_top_level(&mut self, statement: &'a Statement, scope: ScopeId) -> CodegenResult<()> {
        match statement {
            Statement::Function(decl) => self.declare_function(decl, scope),
            Statement::Struct(decl) => self.lower_struct(decl, scope),
            Statement::Export(inner) => self.lower_top_level(inner, scope),
            Statement::Use { .. } | Statement::TypeAlias { .. } | Statement::UnionType { .. } => {
                Ok(())
            }
            Statement::Enum { span, .. } => {
                Err(CodegenError::not_implemented("enum declaration", *span))
            }
            Statement::Parameter { span, .. } => {
                Err(CodegenError::not_implemented("parameter statement", *span))
            }
            other => Err(CodegenError::implementation(
                "statement outside of a function body",
                statement_span(other),
            )),
        }
    }

    /// Concrete functions are lowered on the spot; generic ones wait until every
    /// call site in the file has been seen.
    pub(super) fn declare_function(
        &mut self,
        decl: &'a FunctionDecl,
        scope: ScopeId,
    ) -> CodegenResult<()> {
        let sig = match self.context.lookup(scope, &decl.name) {
            Some(Type::Function(sig)) => sig.clone(),
            Some(other) => {
                return Err(CodegenError::implementation(
                    format!("`{}` is declared as a function but typed `{other}`", decl.name),
                    decl.span,
                ))
            }
            None => return Err(CodegenError::identifier(decl.name.clone(), decl.span)),
        };
        if sig.is_generic() {
            self.trace(|| format!("deferring generic function {}", decl.name));
            self.generic_decls.insert(decl.name.clone(), decl);
            return Ok(());
        }
        let params: Vec<(String, Type)> = sig.params.clone();
        let (name, descriptor, ret) = if decl.name == "main" {
            ("main".to_string(), MAIN_DESCRIPTOR.to_string(), Type::VOID)
        } else {
            (
                mangle(&decl.name),
                specialize::method_descriptor(sig.param_types(), &sig.ret),
                sig.ret.clone(),
            )
        };
        self.lower_function_body(decl, &name, &descriptor, Specialization::new(), params, ret)
    }

    fn lower_instance(
        &mut self,
        decl: &'a FunctionDecl,
        sig: &Arc<FunctionSig>,
        map: Specialization,
    ) -> CodegenResult<()> {
        let (params, ret) = specialize::instantiate(sig, &map).map_err(|err| {
            CodegenError::Specialization {
                function: sig.name.clone(),
                message: err.to_string(),
                span: decl.span,
            }
        })?;
        let descriptor = specialize::method_descriptor(&params, &ret);
        let named = sig
            .params
            .iter()
            .map(|(name, _)| name.clone())
            .zip(params)
            .collect();
        self.lower_function_body(decl, &mangle(&decl.name), &descriptor, map, named, ret)
    }

    fn lower_function_body(
        &mut self,
        decl: &'a FunctionDecl,
        name: &str,
        descriptor: &str,
        spec: Specialization,
        params: Vec<(String, Type)>,
        ret: Type,
    ) -> CodegenResult<()> {
        if self.unit.has_method(name, descriptor) {
            if self.skipped.insert((name.to_string(), descriptor.to_string())) {
                self.trace(|| format!("reusing {name}{descriptor}"));
            }
            return Ok(());
        }
        self.trace(|| format!("open method {name}{descriptor}"));
        let builder = self.method_builder(PUBLIC_STATIC, name, descriptor)?;
        let mut f = FunctionLowering::new(builder, spec, decl.body.scope, params, ret);
        self.lower_block(&mut f, &decl.body)?;
        if f.builder.falls_through() && !f.ret.is_void() && !descriptor.ends_with(")V") {
            missing_return_trap(&mut f);
        }
        let record = f.builder.end();
        self.finish_method(record);
        Ok(())
    }

    fn finish_method(&mut self, record: MethodRecord) {
        self.trace(|| format!("close method {}{}", record.name, record.descriptor));
        self.unit.methods.push(record);
    }

    /// Lowers requested instantiations until lowering them requests no new ones.
    fn drain_instantiations(&mut self) -> CodegenResult<()> {
        loop {
            let pending = self.specializations.pending_functions();
            if pending.is_empty() {
                return Ok(());
            }
            for name in pending {
                let Some(decl) = self.generic_decls.get(&name).copied() else {
                    return Err(CodegenError::implementation(
                        format!("generic function `{name}` has no body in this file"),
                        Span::default(),
                    ));
                };
                let Some(sig) = self.specializations.get(&name).map(|entry| entry.sig.clone()) else {
                    continue;
                };
                for map in self.specializations.take_pending(&name) {
                    self.lower_instance(decl, &sig, map)?;
                }
            }
        }
    }
}

pub(super) fn mangle(name: &str) -> String {
    format!("_{name}")
}

fn missing_return_trap(f: &mut FunctionLowering) {
    let exception = "java/lang/IllegalStateException";
    f.builder.new_instance(exception);
    f.builder.op(DUP);
    f.builder.push_str(format!("missing return in {}", f.name));
    f.builder.invoke_constructor(exception, "(Ljava/lang/String;)V");
    f.builder.op(ATHROW);
}

pub(super) fn statement_span(statement: &Statement) -> Span {
    match statement {
        Statement::Expression(expr) => expr.span,
        Statement::Variable(stmt) => stmt.span,
        Statement::Function(decl) => decl.span,
        Statement::Struct(decl) => decl.span,
        Statement::Return(stmt) => stmt.span,
        Statement::If(stmt) => stmt.span,
        Statement::While(stmt) => stmt.span,
        Statement::For(stmt) => stmt.span,
        Statement::Match(stmt) => stmt.span,
        Statement::Block(block) => block.span,
        Statement::Export(inner) => statement_span(inner),
        Statement::Use { span, .. }
        | Statement::TypeAlias { span, .. }
        | Statement::UnionType { span, .. }
        | Statement::Enum { span, .. }
        | Statement::Parameter { span, .. } => *span,
    }
}
