use super::*;
use crate::language::types::{StructDef, STRING_BUILDER_CLASS, STRING_CLASS};
use super::resolve::append_descriptor;

const APPEND_STRING: &str = "(Ljava/lang/String;)Ljava/lang/StringBuilder;";

impl<'a> Compiler<'a> {
    /// Emits the class of a struct declaration: one public field per declared
    /// field, a positional constructor and `toString`.
    pub(super) fn lower_struct(&mut self, decl: &StructDecl, scope: ScopeId) -> CodegenResult<()> {
        let def = match self.context.lookup(scope, &decl.name) {
            Some(Type::Struct(st)) => st.def.clone(),
            Some(other) => {
                return Err(CodegenError::implementation(
                    format!("`{}` is declared as a struct but typed `{other}`", decl.name),
                    decl.span,
                ))
            }
            None => return Err(CodegenError::identifier(decl.name.clone(), decl.span)),
        };
        if self
            .struct_units
            .iter()
            .any(|unit| unit.name == def.qualified_name)
        {
            return Ok(());
        }

        let mut unit = ClassUnit::new(def.qualified_name.clone(), ACC_PUBLIC | ACC_SUPER);
        unit.source_file = self.unit.source_file.clone();
        for (name, ty) in &def.fields {
            unit.add_field(ACC_PUBLIC, name.clone(), ty.descriptor());
        }
        unit.methods.push(self.struct_constructor(&def)?);
        unit.methods.push(self.struct_to_string(&def)?);
        self.trace(|| {
            format!(
                "struct {} as {} with {} fields",
                def.name,
                def.qualified_name,
                def.fields.len()
            )
        });
        self.struct_units.push(unit);
        Ok(())
    }

    fn struct_constructor(&self, def: &StructDef) -> CodegenResult<MethodRecord> {
        let mut init = self.method_builder(ACC_PUBLIC, "<init>", &def.constructor_descriptor())?;
        init.load_this();
        init.invoke_constructor(OBJECT_CLASS, "()V");
        for (index, (name, ty)) in def.fields.iter().enumerate() {
            init.load_this();
            init.load_arg(index);
            init.put_field(&def.qualified_name, name, &ty.descriptor());
        }
        Ok(init.end())
    }

    /// `Name[a=1, b=x]`, or `Name[]` for a struct without fields.
    fn struct_to_string(&self, def: &StructDef) -> CodegenResult<MethodRecord> {
        let mut method = self.method_builder(ACC_PUBLIC, "toString", "()Ljava/lang/String;")?;
        if def.fields.is_empty() {
            method.push_str(format!("{}[]", def.name));
            method.op(ARETURN);
            return Ok(method.end());
        }

        method.new_instance(STRING_BUILDER_CLASS);
        method.op(DUP);
        method.push_str(format!("{}[", def.name));
        method.invoke_constructor(STRING_BUILDER_CLASS, &format!("(L{STRING_CLASS};)V"));
        for (index, (name, ty)) in def.fields.iter().enumerate() {
            let label = if index == 0 {
                format!("{name}=")
            } else {
                format!(", {name}=")
            };
            method.push_str(label);
            method.invoke_virtual(STRING_BUILDER_CLASS, "append", APPEND_STRING);
            method.load_this();
            method.get_field(&def.qualified_name, name, &ty.descriptor());
            method.invoke_virtual(STRING_BUILDER_CLASS, "append", &append_descriptor(ty));
        }
        method.push_str("]");
        method.invoke_virtual(STRING_BUILDER_CLASS, "append", APPEND_STRING);
        method.invoke_virtual(STRING_BUILDER_CLASS, "toString", "()Ljava/lang/String;");
        method.op(ARETURN);
        Ok(method.end())
    }
}
