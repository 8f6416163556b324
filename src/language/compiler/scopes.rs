use super::*;
use crate::language::{
    runtime_abi::{LIST_WRAPPER_CLASS, LIST_WRAPPER_LIST, LIST_WRAPPER_NAME},
    types::{Primitive, Representation, ARRAY_LIST_CLASS, ITERATOR_CLASS, STRING_CLASS},
};
use super::emit::coerce;

const ITERABLE_CLASS: &str = "java/lang/Iterable";

impl<'a> Compiler<'a> {
    /// Lowers the statements of `block` with `f.scope` set to the block's scope.
    pub(super) fn lower_block(
        &mut self,
        f: &mut FunctionLowering,
        block: &'a Block,
    ) -> CodegenResult<()> {
        let saved = f.scope;
        f.scope = block.scope;
        for statement in &block.statements {
            self.trace(|| format!("stmt {} in {}", statement_kind(statement), f.name));
            if let Err(err) = self.lower_statement(f, statement) {
                f.scope = saved;
                return Err(err);
            }
        }
        f.scope = saved;
        Ok(())
    }

    fn lower_statement(
        &mut self,
        f: &mut FunctionLowering,
        statement: &'a Statement,
    ) -> CodegenResult<()> {
        match statement {
            Statement::Expression(expr) => {
                let ty = self.lower_expr(f, expr)?;
                f.builder.pop_value(ty.representation());
                Ok(())
            }
            Statement::Variable(stmt) => self.lower_variable(f, stmt),
            Statement::Function(decl) => self.declare_function(decl, f.scope),
            Statement::Struct(decl) => self.lower_struct(decl, f.scope),
            Statement::Return(stmt) => self.lower_return(f, stmt),
            Statement::If(stmt) => self.lower_if(f, stmt),
            Statement::While(stmt) => self.lower_while(f, stmt),
            Statement::For(stmt) => self.lower_for(f, stmt),
            Statement::Match(stmt) => self.lower_match(f, stmt),
            Statement::Block(block) => self.lower_block(f, block),
            Statement::Export(inner) => self.lower_statement(f, inner),
            Statement::Use { .. } | Statement::TypeAlias { .. } | Statement::UnionType { .. } => {
                Ok(())
            }
            Statement::Enum { span, .. } => {
                Err(CodegenError::not_implemented("enum declaration", *span))
            }
            Statement::Parameter { span, .. } => {
                Err(CodegenError::not_implemented("parameter statement", *span))
            }
        }
    }

    fn lower_variable(&mut self, f: &mut FunctionLowering, stmt: &VariableStmt) -> CodegenResult<()> {
        let ty = match self.context.lookup(f.scope, &stmt.name) {
            Some(Type::Function(_)) | None => self.planned_type(f, &stmt.initializer)?,
            Some(declared) => {
                let declared = declared.clone();
                self.resolve_type(f, &declared, stmt.span)?
            }
        };
        if ty.is_void() {
            return Err(CodegenError::implementation(
                format!("cannot bind a void value to `{}`", stmt.name),
                stmt.span,
            ));
        }
        self.lower_as(f, &stmt.initializer, &ty)?;
        let slot = f.declare_local(f.scope, &stmt.name, ty.clone());
        f.builder.store_local(slot, ty.representation());
        Ok(())
    }

    fn lower_return(&mut self, f: &mut FunctionLowering, stmt: &ReturnStmt) -> CodegenResult<()> {
        if f.ret.is_void() {
            if !stmt.value.is_empty() {
                let ty = self.lower_expr(f, &stmt.value)?;
                f.builder.pop_value(ty.representation());
            }
            f.builder.op(RETURN);
            return Ok(());
        }
        if stmt.value.is_empty() {
            return Err(CodegenError::implementation(
                format!("`{}` must return a value of type `{}`", f.name, f.ret),
                stmt.span,
            ));
        }
        let ret = f.ret.clone();
        self.lower_as(f, &stmt.value, &ret)?;
        f.builder.return_value(ret.representation());
        Ok(())
    }

    fn lower_if(&mut self, f: &mut FunctionLowering, stmt: &'a IfStmt) -> CodegenResult<()> {
        let otherwise = f.builder.new_label();
        self.lower_as(f, &stmt.condition, &Type::BOOLEAN)?;
        f.builder.jump(IFEQ, otherwise);
        self.lower_block(f, &stmt.then_block)?;
        match &stmt.else_branch {
            Some(branch) => {
                let end = f.builder.new_label();
                let then_continues = f.builder.falls_through();
                if then_continues {
                    f.builder.goto(end);
                }
                f.builder.mark(otherwise);
                self.lower_statement(f, branch)?;
                if then_continues {
                    f.builder.mark(end);
                }
            }
            None => f.builder.mark(otherwise),
        }
        Ok(())
    }

    fn lower_while(&mut self, f: &mut FunctionLowering, stmt: &'a WhileStmt) -> CodegenResult<()> {
        let start = f.builder.new_label();
        let end = f.builder.new_label();
        f.builder.mark(start);
        self.lower_as(f, &stmt.condition, &Type::BOOLEAN)?;
        f.builder.jump(IFEQ, end);
        self.lower_block(f, &stmt.body)?;
        f.builder.goto(start);
        f.builder.mark(end);
        Ok(())
    }

    /// Every iterable is driven through `java.util.Iterator`; the element comes out
    /// of `next()` as an object and is narrowed to the binding's type.
    fn lower_for(&mut self, f: &mut FunctionLowering, stmt: &'a ForStmt) -> CodegenResult<()> {
        let iterable = self.lower_expr(f, &stmt.iterable)?;
        match &iterable {
            Type::List(_) => {
                let (list, list_descriptor) = LIST_WRAPPER_LIST;
                f.builder
                    .invoke_virtual(LIST_WRAPPER_CLASS, list, list_descriptor);
                f.builder
                    .invoke_virtual(ARRAY_LIST_CLASS, "iterator", "()Ljava/util/Iterator;");
            }
            Type::External(class) if class == ITERATOR_CLASS => {}
            Type::External(class) if class == OBJECT_CLASS => f.builder.check_cast(ITERATOR_CLASS),
            Type::Generic(_) | Type::Union(_) => f.builder.check_cast(ITERATOR_CLASS),
            Type::External(class) => {
                if class != ITERABLE_CLASS {
                    f.builder.check_cast(ITERABLE_CLASS);
                }
                f.builder
                    .invoke_interface(ITERABLE_CLASS, "iterator", "()Ljava/util/Iterator;");
            }
            other => {
                return Err(CodegenError::implementation(
                    format!("cannot iterate over a value of type `{other}`"),
                    stmt.iterable.span,
                ))
            }
        }

        let iterator = f.builder.new_local(Representation::Reference);
        f.builder.store_local(iterator, Representation::Reference);

        let element = match self.context.lookup(stmt.body.scope, &stmt.binding).cloned() {
            Some(declared) => self.resolve_type(f, &declared, stmt.span)?,
            None => match &iterable {
                Type::List(element) => (**element).clone(),
                _ => Type::object(),
            },
        };
        let slot = f.declare_local(stmt.body.scope, &stmt.binding, element.clone());

        let start = f.builder.new_label();
        let end = f.builder.new_label();
        f.builder.mark(start);
        f.builder.load_local(iterator, Representation::Reference);
        f.builder.invoke_interface(ITERATOR_CLASS, "hasNext", "()Z");
        f.builder.jump(IFEQ, end);
        f.builder.load_local(iterator, Representation::Reference);
        f.builder
            .invoke_interface(ITERATOR_CLASS, "next", "()Ljava/lang/Object;");
        coerce(f, &Type::object(), &element);
        f.builder.store_local(slot, element.representation());
        self.lower_block(f, &stmt.body)?;
        f.builder.goto(start);
        f.builder.mark(end);
        Ok(())
    }

    /// The scrutinee is evaluated once into a hidden slot; each arm tests it with
    /// `instanceof` against the pattern's class, first match wins.
    fn lower_match(&mut self, f: &mut FunctionLowering, stmt: &'a MatchStmt) -> CodegenResult<()> {
        let scrutinee = self.lower_expr(f, &stmt.scrutinee)?;
        if scrutinee.is_void() {
            return Err(CodegenError::implementation(
                "cannot match on an expression without a value",
                stmt.scrutinee.span,
            ));
        }
        coerce(f, &scrutinee, &Type::object());
        let subject = f.builder.new_local(Representation::Reference);
        f.builder.store_local(subject, Representation::Reference);

        let end = f.builder.new_label();
        for arm in &stmt.arms {
            let next = f.builder.new_label();
            let pattern = self.resolve_type(f, &arm.pattern, arm.span)?;
            let class = pattern.class_name();
            f.builder.load_local(subject, Representation::Reference);
            f.builder.instance_of(class.clone());
            f.builder.jump(IFEQ, next);
            // Wrappers of every element type share one class; the tag tells them apart.
            if let Type::List(element) = &pattern {
                let (name, name_descriptor) = LIST_WRAPPER_NAME;
                f.builder.load_local(subject, Representation::Reference);
                f.builder.check_cast(LIST_WRAPPER_CLASS);
                f.builder
                    .invoke_virtual(LIST_WRAPPER_CLASS, name, name_descriptor);
                f.builder.push_str(element.name());
                f.builder
                    .invoke_virtual(STRING_CLASS, "equals", "(Ljava/lang/Object;)Z");
                f.builder.jump(IFEQ, next);
            }

            if !arm.binding.is_empty() {
                f.builder.load_local(subject, Representation::Reference);
                let bound = match pattern.as_primitive() {
                    Some(kind) if kind.is_numeric() => {
                        f.builder.check_cast(class);
                        f.builder.unbox_unchecked(kind);
                        pattern
                    }
                    Some(Primitive::Boolean) => {
                        f.builder.check_cast(class.clone());
                        Type::External(class)
                    }
                    _ => {
                        coerce(f, &Type::object(), &pattern);
                        pattern
                    }
                };
                let slot = f.declare_local(arm.body.scope, &arm.binding, bound.clone());
                f.builder.store_local(slot, bound.representation());
            }

            self.lower_block(f, &arm.body)?;
            if f.builder.falls_through() {
                f.builder.goto(end);
            }
            f.builder.mark(next);
        }
        f.builder.mark(end);
        Ok(())
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Expression(_) => "expr",
        Statement::Variable(_) => "variable",
        Statement::Function(_) => "function",
        Statement::Struct(_) => "struct",
        Statement::Return(_) => "return",
        Statement::If(_) => "if",
        Statement::While(_) => "while",
        Statement::For(_) => "for",
        Statement::Match(_) => "match",
        Statement::Block(_) => "block",
        Statement::Export(_) => "export",
        Statement::Use { .. } => "use",
        Statement::TypeAlias { .. } => "type",
        Statement::UnionType { .. } => "union",
        Statement::Enum { .. } => "enum",
        Statement::Parameter { .. } => "parameter",
    }
}
