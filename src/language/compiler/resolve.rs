use super::*;
use crate::language::types::{CallBinding, Primitive, StructType};

impl<'a> Compiler<'a> {
    /// Type of `ty` inside the instantiation being lowered. Placeholders must be bound.
    pub(super) fn resolve_type(
        &self,
        f: &FunctionLowering,
        ty: &Type,
        span: Span,
    ) -> CodegenResult<Type> {
        specialize::resolve(ty, &f.spec).map_err(|err| f.specialization_error(err, span))
    }

    /// Type a value will have once `expr` is lowered, without emitting anything.
    pub(super) fn planned_type(&self, f: &FunctionLowering, expr: &Expr) -> CodegenResult<Type> {
        match &expr.kind {
            ExprKind::Identifier(name) => match f.lookup(&self.context, name) {
                Some(binding) => Ok(binding.ty().clone()),
                None => self.resolve_type(f, &expr.ty, expr.span),
            },
            ExprKind::Grouping(inner) => self.planned_type(f, inner),
            _ => self.resolve_type(f, &expr.ty, expr.span),
        }
    }

    pub(super) fn lower_identifier(
        &mut self,
        f: &mut FunctionLowering,
        name: &str,
        span: Span,
    ) -> CodegenResult<Type> {
        if self.context.lookup(f.scope, name).is_none() {
            return Err(CodegenError::identifier(name, span));
        }
        let binding = f
            .lookup(&self.context, name)
            .ok_or_else(|| CodegenError::identifier(name, span))?;
        f.load(&binding);
        Ok(binding.ty().clone())
    }

    pub(super) fn lower_call(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
    ) -> CodegenResult<Type> {
        let target = match &callee.kind {
            ExprKind::Identifier(name) => self
                .context
                .lookup(f.scope, name)
                .cloned()
                .ok_or_else(|| CodegenError::identifier(name.clone(), callee.span))?,
            _ => callee.ty.clone(),
        };
        match target {
            Type::Function(sig) => match &sig.binding {
                CallBinding::External { owner, method } => {
                    let (owner, method) = (owner.clone(), method.clone());
                    self.lower_external_call(f, &sig, &owner, &method, args, expr.span)
                }
                CallBinding::User { owner } => {
                    let owner = owner.clone();
                    self.lower_user_call(f, &sig, owner, args, expr.span)
                }
            },
            Type::Struct(st) => self.lower_construction(f, expr, st, args),
            other => Err(CodegenError::implementation(
                format!("`{other}` cannot be called"),
                callee.span,
            )),
        }
    }

    fn check_arity(expected: usize, args: &[Expr], span: Span) -> CodegenResult<()> {
        if expected != args.len() {
            return Err(CodegenError::implementation(
                format!("expected {expected} arguments, found {}", args.len()),
                span,
            ));
        }
        Ok(())
    }

    /// Runtime and other host functions: declared types only, arguments boxed
    /// wherever the declared parameter is a reference.
    fn lower_external_call(
        &mut self,
        f: &mut FunctionLowering,
        sig: &FunctionSig,
        owner: &str,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> CodegenResult<Type> {
        Self::check_arity(sig.params.len(), args, span)?;
        for ((_, param), arg) in sig.params.iter().zip(args) {
            self.lower_as(f, arg, param)?;
        }
        let descriptor = specialize::method_descriptor(sig.param_types(), &sig.ret);
        f.builder.invoke_static(owner, method, &descriptor);
        Ok(sig.ret.clone())
    }

    fn lower_user_call(
        &mut self,
        f: &mut FunctionLowering,
        sig: &Arc<FunctionSig>,
        owner: Option<String>,
        args: &[Expr],
        span: Span,
    ) -> CodegenResult<Type> {
        Self::check_arity(sig.params.len(), args, span)?;
        let arg_types = args
            .iter()
            .map(|arg| self.planned_type(f, arg))
            .collect::<CodegenResult<Vec<_>>>()?;
        let map = specialize::specialize_call(sig, &arg_types).map_err(|err| {
            CodegenError::Specialization {
                function: sig.name.clone(),
                message: err.to_string(),
                span,
            }
        })?;
        let (params, ret) = if sig.is_generic() {
            specialize::instantiate(sig, &map).map_err(|err| CodegenError::Specialization {
                function: sig.name.clone(),
                message: err.to_string(),
                span,
            })?
        } else {
            (sig.param_types().cloned().collect(), sig.ret.clone())
        };

        for (param, arg) in params.iter().zip(args) {
            self.lower_as(f, arg, param)?;
        }

        let descriptor = specialize::method_descriptor(&params, &ret);
        let owner = match owner {
            Some(owner) => owner,
            None => {
                if sig.is_generic() {
                    let (index, fresh) = self.specializations.require(sig, map);
                    if fresh {
                        self.trace(|| {
                            format!("instantiation #{index} of {} requested as {descriptor}", sig.name)
                        });
                    }
                }
                self.unit.name.clone()
            }
        };
        f.builder.invoke_static(&owner, &mangle(&sig.name), &descriptor);
        Ok(ret)
    }

    /// Allocates the struct and calls its constructor. Each argument is brought to
    /// its field's storage type first, so union and generic fields receive boxes.
    fn lower_construction(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
        st: StructType,
        args: &[Expr],
    ) -> CodegenResult<Type> {
        Self::check_arity(st.def.fields.len(), args, expr.span)?;
        let class = st.def.qualified_name.clone();
        f.builder.new_instance(class.clone());
        f.builder.op(DUP);
        let mut params = String::new();
        for ((_, field), arg) in st.def.fields.iter().zip(args) {
            self.lower_as(f, arg, field)?;
            params.push_str(&field.descriptor());
        }
        f.builder.invoke_constructor(&class, &format!("({params})V"));
        match self.resolve_type(f, &expr.ty, expr.span)? {
            constructed @ Type::Struct(_) => Ok(constructed),
            _ => Ok(Type::Struct(st)),
        }
    }
}

/// Descriptor of the `StringBuilder.append` overload taking a value of `ty`.
pub(super) fn append_descriptor(ty: &Type) -> String {
    let param = match ty {
        Type::Primitive(
            p @ (Primitive::Int | Primitive::Float | Primitive::Double | Primitive::Boolean),
        ) => p.descriptor().to_string(),
        Type::Primitive(Primitive::String) => Type::STRING.descriptor(),
        _ => Type::object().descriptor(),
    };
    format!("({param})L{};", crate::language::types::STRING_BUILDER_CLASS)
}
