use super::*;
use crate::language::{
    runtime_abi::{LIST_WRAPPER_CLASS, LIST_WRAPPER_INIT, LIST_WRAPPER_LIST},
    types::{
        ArithOp, Primitive, Representation, StructType, ARRAY_LIST_CLASS, STRING_BUILDER_CLASS,
    },
};
use super::resolve::append_descriptor;

const OBJECTS_CLASS: &str = "java/util/Objects";

impl<'a> Compiler<'a> {
    /// Lowers `expr` and returns the type of the value it leaves on the stack.
    pub(super) fn lower_expr(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
    ) -> CodegenResult<Type> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(lower_literal(f, literal)),
            ExprKind::Identifier(name) => self.lower_identifier(f, name, expr.span),
            ExprKind::Binary { op, left, right } => self.lower_binary(f, expr, *op, left, right),
            ExprKind::Assign { target, value } => self.lower_assign(f, target, value, expr.span),
            ExprKind::Call { callee, args } => self.lower_call(f, expr, callee, args),
            ExprKind::Property { receiver, fields } => {
                self.lower_property(f, receiver, fields, expr.span)
            }
            ExprKind::Postfix { op, operand } => self.lower_postfix(f, *op, operand, expr.span),
            ExprKind::Prefix { op, operand } => self.lower_prefix(f, *op, operand, expr.span),
            ExprKind::Grouping(inner) => self.lower_expr(f, inner),
            ExprKind::EmptyList => self.lower_list(f, expr, &[]),
            ExprKind::ListLiteral(entries) => self.lower_list(f, expr, entries),
            ExprKind::Index { .. } => Err(CodegenError::not_implemented("index access", expr.span)),
            ExprKind::ModuleAccess { .. }
            | ExprKind::Lambda
            | ExprKind::EnumAccess { .. }
            | ExprKind::Empty
            | ExprKind::Bad => Ok(Type::VOID),
        }
    }

    /// Lowers `expr` and converts the result to the representation of `target`.
    pub(super) fn lower_as(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
        target: &Type,
    ) -> CodegenResult<()> {
        let actual = self.lower_expr(f, expr)?;
        if actual.is_void() && !target.is_void() {
            return Err(CodegenError::implementation(
                format!("expected a value of type `{target}`, found nothing"),
                expr.span,
            ));
        }
        coerce(f, &actual, target);
        Ok(())
    }

    fn lower_binary(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> CodegenResult<Type> {
        let result = self.resolve_type(f, &expr.ty, expr.span)?;
        if result.is_string() && !op.is_relational() {
            return self.lower_concat(f, left, right);
        }
        match op {
            BinaryOp::And => self.lower_short_circuit(f, left, right, true),
            BinaryOp::Or => self.lower_short_circuit(f, left, right, false),
            BinaryOp::Xor => {
                let (lt, rt) = (self.planned_type(f, left)?, self.planned_type(f, right)?);
                let common = match (lt.as_primitive(), rt.as_primitive()) {
                    (Some(Primitive::Boolean), Some(Primitive::Boolean)) => Type::BOOLEAN,
                    (Some(Primitive::Int), Some(Primitive::Int)) => Type::INT,
                    _ => return Err(undefined_operator(op, &lt, &rt, expr.span)),
                };
                self.lower_as(f, left, &common)?;
                self.lower_as(f, right, &common)?;
                f.builder.op(IXOR);
                Ok(common)
            }
            BinaryOp::Pow => Err(CodegenError::not_implemented(
                "exponentiation operator",
                expr.span,
            )),
            op if op.is_relational() => self.lower_comparison(f, op, left, right, expr.span),
            _ => self.lower_arithmetic(f, op, left, right, expr.span),
        }
    }

    fn lower_concat(
        &mut self,
        f: &mut FunctionLowering,
        left: &Expr,
        right: &Expr,
    ) -> CodegenResult<Type> {
        f.builder.new_instance(STRING_BUILDER_CLASS);
        f.builder.op(DUP);
        f.builder.invoke_constructor(STRING_BUILDER_CLASS, "()V");
        for operand in [left, right] {
            let ty = self.lower_expr(f, operand)?;
            if ty.is_void() {
                return Err(CodegenError::implementation(
                    "cannot concatenate an expression without a value",
                    operand.span,
                ));
            }
            f.builder
                .invoke_virtual(STRING_BUILDER_CLASS, "append", &append_descriptor(&ty));
        }
        f.builder
            .invoke_virtual(STRING_BUILDER_CLASS, "toString", "()Ljava/lang/String;");
        Ok(Type::STRING)
    }

    /// `and` skips the right operand once the left is false, `or` once it is true.
    fn lower_short_circuit(
        &mut self,
        f: &mut FunctionLowering,
        left: &Expr,
        right: &Expr,
        is_and: bool,
    ) -> CodegenResult<Type> {
        let decided = f.builder.new_label();
        let end = f.builder.new_label();
        let skip = if is_and { IFEQ } else { IFNE };
        self.lower_as(f, left, &Type::BOOLEAN)?;
        f.builder.jump(skip, decided);
        self.lower_as(f, right, &Type::BOOLEAN)?;
        f.builder.jump(skip, decided);
        f.builder.push_bool(is_and);
        f.builder.goto(end);
        f.builder.mark(decided);
        f.builder.push_bool(!is_and);
        f.builder.mark(end);
        Ok(Type::BOOLEAN)
    }

    fn lower_comparison(
        &mut self,
        f: &mut FunctionLowering,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> CodegenResult<Type> {
        let (lt, rt) = (self.planned_type(f, left)?, self.planned_type(f, right)?);
        let on_false = f.builder.new_label();
        let end = f.builder.new_label();
        let jump = negated_jump(op);
        match (numeric_kind(&lt), numeric_kind(&rt)) {
            (Some(a), Some(b)) => {
                let common = Type::Primitive(wider(a, b));
                self.lower_as(f, left, &common)?;
                self.lower_as(f, right, &common)?;
                match common.as_primitive() {
                    Some(Primitive::Float) => {
                        f.builder.op(if matches!(jump, IFGE | IFGT) { FCMPG } else { FCMPL });
                        f.builder.jump(jump, on_false);
                    }
                    Some(Primitive::Double) => {
                        f.builder.op(if matches!(jump, IFGE | IFGT) { DCMPG } else { DCMPL });
                        f.builder.jump(jump, on_false);
                    }
                    _ => f.builder.jump(int_compare(jump), on_false),
                }
            }
            _ if lt == Type::BOOLEAN && rt == Type::BOOLEAN => {
                self.lower_as(f, left, &Type::BOOLEAN)?;
                self.lower_as(f, right, &Type::BOOLEAN)?;
                f.builder.jump(int_compare(jump), on_false);
            }
            _ => {
                if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
                    return Err(undefined_operator(op, &lt, &rt, span));
                }
                self.lower_as(f, left, &Type::object())?;
                self.lower_as(f, right, &Type::object())?;
                f.builder.invoke_static(
                    OBJECTS_CLASS,
                    "equals",
                    "(Ljava/lang/Object;Ljava/lang/Object;)Z",
                );
                let unequal = if op == BinaryOp::Equal { IFEQ } else { IFNE };
                f.builder.jump(unequal, on_false);
            }
        }
        f.builder.push_bool(true);
        f.builder.goto(end);
        f.builder.mark(on_false);
        f.builder.push_bool(false);
        f.builder.mark(end);
        Ok(Type::BOOLEAN)
    }

    fn lower_arithmetic(
        &mut self,
        f: &mut FunctionLowering,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> CodegenResult<Type> {
        let (lt, rt) = (self.planned_type(f, left)?, self.planned_type(f, right)?);
        let (Some(a), Some(b)) = (numeric_kind(&lt), numeric_kind(&rt)) else {
            return Err(undefined_operator(op, &lt, &rt, span));
        };
        let arith = match op {
            BinaryOp::Add => ArithOp::Add,
            BinaryOp::Sub => ArithOp::Sub,
            BinaryOp::Mul => ArithOp::Mul,
            BinaryOp::Div => ArithOp::Div,
            BinaryOp::Mod => ArithOp::Rem,
            _ => return Err(undefined_operator(op, &lt, &rt, span)),
        };
        let common = wider(a, b);
        let ty = Type::Primitive(common);
        self.lower_as(f, left, &ty)?;
        self.lower_as(f, right, &ty)?;
        let opcode = common
            .arithmetic_opcode(arith)
            .ok_or_else(|| undefined_operator(op, &lt, &rt, span))?;
        f.builder.op(opcode);
        Ok(ty)
    }

    fn lower_assign(
        &mut self,
        f: &mut FunctionLowering,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> CodegenResult<Type> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let binding = self.binding_of(f, name, target.span)?;
                self.lower_as(f, value, binding.ty())?;
                f.store(&binding);
            }
            ExprKind::Property { receiver, fields } => {
                let Some((last, path)) = fields.split_last() else {
                    return Err(CodegenError::implementation("empty field chain", target.span));
                };
                let mut owner = self.lower_receiver(f, receiver)?;
                for field in path {
                    owner = self.load_field(f, &owner, field, target.span)?;
                }
                let (st, declared) = struct_field(&owner, last, target.span)?;
                let class = st.def.qualified_name.clone();
                self.lower_as(f, value, &declared)?;
                f.builder.put_field(&class, last, &declared.descriptor());
            }
            _ => {
                return Err(CodegenError::implementation(
                    "Assignment not implemented for any recipient but identifier yet",
                    span,
                ))
            }
        }
        Ok(Type::VOID)
    }

    /// Storage of a plain name; absent from scope or slot map is fatal.
    pub(super) fn binding_of(
        &self,
        f: &FunctionLowering,
        name: &str,
        span: Span,
    ) -> CodegenResult<Binding> {
        if self.context.lookup(f.scope, name).is_none() {
            return Err(CodegenError::identifier(name, span));
        }
        f.lookup(&self.context, name)
            .ok_or_else(|| CodegenError::identifier(name, span))
    }

    fn lower_property(
        &mut self,
        f: &mut FunctionLowering,
        receiver: &Expr,
        fields: &[String],
        span: Span,
    ) -> CodegenResult<Type> {
        let mut current = self.lower_receiver(f, receiver)?;
        for field in fields {
            current = self.load_field(f, &current, field, span)?;
        }
        Ok(current)
    }

    /// The annotated type wins when it knows more about the struct than the value
    /// that was loaded.
    fn lower_receiver(&mut self, f: &mut FunctionLowering, receiver: &Expr) -> CodegenResult<Type> {
        let lowered = self.lower_expr(f, receiver)?;
        let annotated = self.resolve_type(f, &receiver.ty, receiver.span)?;
        let prefer_annotated = match (&lowered, &annotated) {
            (Type::Struct(have), Type::Struct(want)) => {
                have.def == want.def && !have.is_monomorphized()
            }
            (Type::Struct(_), _) => false,
            (_, Type::Struct(_)) => true,
            _ => false,
        };
        if !prefer_annotated {
            return Ok(lowered);
        }
        if !matches!(lowered, Type::Struct(_)) {
            coerce(f, &lowered, &annotated);
        }
        Ok(annotated)
    }

    /// Loads `field` of the struct on the stack. Placeholder fields of a
    /// monomorphized struct are narrowed to their resolved type.
    pub(super) fn load_field(
        &mut self,
        f: &mut FunctionLowering,
        owner: &Type,
        field: &str,
        span: Span,
    ) -> CodegenResult<Type> {
        let (st, declared) = struct_field(owner, field, span)?;
        f.builder
            .get_field(&st.def.qualified_name, field, &declared.descriptor());
        if st.is_monomorphized() && declared.contains_generic() {
            let concrete = declared.substitute(&st.resolved).substitute(&f.spec);
            if !concrete.contains_generic() {
                coerce(f, &declared, &concrete);
                return Ok(concrete);
            }
        }
        Ok(declared)
    }

    fn lower_postfix(
        &mut self,
        f: &mut FunctionLowering,
        op: PostfixOp,
        operand: &Expr,
        span: Span,
    ) -> CodegenResult<Type> {
        let ExprKind::Identifier(name) = &operand.kind else {
            return Err(CodegenError::implementation(
                "postfix operators only apply to variables",
                span,
            ));
        };
        let binding = self.binding_of(f, name, operand.span)?;
        let Some(kind) = numeric_kind(binding.ty()) else {
            return Err(CodegenError::not_implemented(
                format!("postfix operator on `{}`", binding.ty()),
                span,
            ));
        };
        let arith = match op {
            PostfixOp::Increment => ArithOp::Add,
            PostfixOp::Decrement => ArithOp::Sub,
        };
        f.load(&binding);
        f.builder.push_one(kind);
        if let Some(opcode) = kind.arithmetic_opcode(arith) {
            f.builder.op(opcode);
        }
        f.store(&binding);
        Ok(Type::VOID)
    }

    fn lower_prefix(
        &mut self,
        f: &mut FunctionLowering,
        op: PrefixOp,
        operand: &Expr,
        span: Span,
    ) -> CodegenResult<Type> {
        match op {
            PrefixOp::Negate => {
                let planned = self.planned_type(f, operand)?;
                let Some(kind) = numeric_kind(&planned) else {
                    return Err(CodegenError::implementation(
                        format!("cannot negate a value of type `{planned}`"),
                        span,
                    ));
                };
                let ty = Type::Primitive(kind);
                self.lower_as(f, operand, &ty)?;
                if let Some(opcode) = kind.arithmetic_opcode(ArithOp::Neg) {
                    f.builder.op(opcode);
                }
                Ok(ty)
            }
            PrefixOp::Not => {
                self.lower_as(f, operand, &Type::BOOLEAN)?;
                f.builder.push_int(1);
                f.builder.op(IXOR);
                Ok(Type::BOOLEAN)
            }
        }
    }

    /// A list wrapper tagged with the element type name; entries are boxed into
    /// its backing list in order.
    fn lower_list(
        &mut self,
        f: &mut FunctionLowering,
        expr: &Expr,
        entries: &[Expr],
    ) -> CodegenResult<Type> {
        let ty = self.resolve_type(f, &expr.ty, expr.span)?;
        let tag = match &ty {
            Type::List(element) => element.name(),
            _ => String::new(),
        };
        f.builder.new_instance(LIST_WRAPPER_CLASS);
        f.builder.op(DUP);
        f.builder.push_str(tag);
        f.builder
            .invoke_constructor(LIST_WRAPPER_CLASS, LIST_WRAPPER_INIT);
        if !entries.is_empty() {
            let (list, list_descriptor) = LIST_WRAPPER_LIST;
            f.builder.op(DUP);
            f.builder
                .invoke_virtual(LIST_WRAPPER_CLASS, list, list_descriptor);
            for entry in entries {
                f.builder.op(DUP);
                self.lower_as(f, entry, &Type::object())?;
                f.builder
                    .invoke_virtual(ARRAY_LIST_CLASS, "add", "(Ljava/lang/Object;)Z");
                f.builder.op(POP);
            }
            f.builder.op(POP);
        }
        Ok(match ty {
            list @ Type::List(_) => list,
            _ => Type::list_of(Type::object()),
        })
    }
}

fn lower_literal(f: &mut FunctionLowering, literal: &Literal) -> Type {
    match literal {
        Literal::Int(value) => f.builder.push_int(*value),
        Literal::Float(value) => f.builder.push_float(*value),
        Literal::Double(value) => f.builder.push_double(*value),
        Literal::Bool(value) => f.builder.push_bool(*value),
        Literal::Str(value) => f.builder.push_str(value.clone()),
    }
    literal.ty()
}

/// Converts the value on the stack from `from` to the representation of `to`:
/// widening between scalars, boxing into references, unboxing out of them and
/// narrowing erased references to a concrete class.
pub(super) fn coerce(f: &mut FunctionLowering, from: &Type, to: &Type) {
    match (from.representation(), to.representation()) {
        (Representation::Scalar(have), Representation::Scalar(want)) => {
            if let Some(opcode) = have.widen_opcode(want) {
                f.builder.op(opcode);
            }
        }
        (Representation::Scalar(have), Representation::Reference) => f.builder.box_value(have),
        (Representation::Reference, Representation::Scalar(want)) => f.builder.unbox_value(want),
        (Representation::Reference, Representation::Reference) => {
            let target = to.class_name();
            if target != OBJECT_CLASS && from.class_name() != target {
                f.builder.check_cast(target);
            }
        }
        _ => {}
    }
}

pub(super) fn numeric_kind(ty: &Type) -> Option<Primitive> {
    ty.as_primitive().filter(|p| p.is_numeric())
}

fn wider(a: Primitive, b: Primitive) -> Primitive {
    if a.widening_rank() >= b.widening_rank() {
        a
    } else {
        b
    }
}

/// Zero-compare jump taken when the comparison `op` is false.
fn negated_jump(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Equal => IFNE,
        BinaryOp::NotEqual => IFEQ,
        BinaryOp::Less => IFGE,
        BinaryOp::Greater => IFLE,
        BinaryOp::LessEqual => IFGT,
        _ => IFLT,
    }
}

fn int_compare(jump: u8) -> u8 {
    match jump {
        IFEQ => IF_ICMPEQ,
        IFNE => IF_ICMPNE,
        IFLT => IF_ICMPLT,
        IFGE => IF_ICMPGE,
        IFGT => IF_ICMPGT,
        _ => IF_ICMPLE,
    }
}

fn undefined_operator(op: BinaryOp, left: &Type, right: &Type, span: Span) -> CodegenError {
    CodegenError::implementation(
        format!("`{}` is not defined for `{left}` and `{right}`", op.symbol()),
        span,
    )
}

pub(super) fn struct_field<'t>(
    owner: &'t Type,
    field: &str,
    span: Span,
) -> CodegenResult<(&'t StructType, Type)> {
    let Type::Struct(st) = owner else {
        return Err(CodegenError::implementation(
            format!("`{owner}` has no field `{field}`"),
            span,
        ));
    };
    let declared = st
        .def
        .field(field)
        .cloned()
        .ok_or_else(|| CodegenError::identifier(field, span))?;
    Ok((st, declared))
}
