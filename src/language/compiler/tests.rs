use super::*;
use crate::classfile::insn::{Constant, Insn};
use crate::language::types::{StructDef, StructType};

const UNIT: &str = "demo/main";

struct FileBuilder {
    context: ContextTree,
    statements: Vec<Statement>,
}

impl FileBuilder {
    fn new() -> Self {
        Self {
            context: ContextTree::new(),
            statements: Vec::new(),
        }
    }

    fn function(
        &mut self,
        name: &str,
        params: Vec<(&str, Type)>,
        ret: Type,
        body: impl FnOnce(&mut ContextTree, ScopeId) -> Vec<Statement>,
    ) -> &mut Self {
        let root = self.context.root();
        let statement = function_in(&mut self.context, root, name, params, ret, body);
        self.statements.push(statement);
        self
    }

    fn declare_struct(&mut self, st: &StructType) -> &mut Self {
        let root = self.context.root();
        self.context
            .define(root, st.def.name.clone(), Type::Struct(st.clone()));
        self.statements.push(Statement::Struct(StructDecl {
            name: st.def.name.clone(),
            span: Span::default(),
        }));
        self
    }

    fn statement(&mut self, statement: Statement) -> &mut Self {
        self.statements.push(statement);
        self
    }

    fn compile(self) -> CodegenResult<CompiledFile> {
        self.compile_with(&CodegenOptions::default())
    }

    fn compile_with(self, options: &CodegenOptions) -> CodegenResult<CompiledFile> {
        let file = SourceFile {
            path: UNIT.to_string(),
            context: self.context,
            statements: self.statements,
        };
        compile_file(&file, options)
    }
}

fn function_in(
    context: &mut ContextTree,
    scope: ScopeId,
    name: &str,
    params: Vec<(&str, Type)>,
    ret: Type,
    body: impl FnOnce(&mut ContextTree, ScopeId) -> Vec<Statement>,
) -> Statement {
    let sig = FunctionSig::user(
        name,
        params
            .iter()
            .map(|(param, ty)| (param.to_string(), ty.clone()))
            .collect(),
        ret,
    );
    context.define(scope, name, Type::Function(Arc::new(sig)));
    let body_scope = context.child(scope);
    for (param, ty) in &params {
        context.define(body_scope, *param, ty.clone());
    }
    let statements = body(context, body_scope);
    Statement::Function(FunctionDecl {
        name: name.to_string(),
        body: block(body_scope, statements),
        span: Span::default(),
    })
}

fn block(scope: ScopeId, statements: Vec<Statement>) -> Block {
    Block {
        scope,
        statements,
        span: Span::default(),
    }
}

fn ret(value: Expr) -> Statement {
    Statement::Return(ReturnStmt {
        value,
        span: Span::default(),
    })
}

fn expr(value: Expr) -> Statement {
    Statement::Expression(value)
}

fn var(name: &str, initializer: Expr) -> Statement {
    Statement::Variable(VariableStmt {
        name: name.to_string(),
        initializer,
        span: Span::default(),
    })
}

fn call(name: &str, args: Vec<Expr>, ty: Type) -> Expr {
    Expr::call(Expr::ident(name, Type::VOID), args, ty)
}

fn println(arg: Expr) -> Expr {
    call("println", vec![arg], Type::VOID)
}

fn struct_type(name: &str, fields: Vec<(&str, Type)>) -> StructType {
    StructType::plain(Arc::new(StructDef {
        name: name.to_string(),
        qualified_name: format!("{UNIT}${name}"),
        fields: fields
            .into_iter()
            .map(|(field, ty)| (field.to_string(), ty))
            .collect(),
    }))
}

fn opcodes(method: &MethodRecord) -> Vec<u8> {
    method.code.iter().filter_map(Insn::opcode).collect()
}

fn invokes(method: &MethodRecord) -> Vec<(String, String, String)> {
    method
        .code
        .iter()
        .filter_map(|insn| match insn {
            Insn::Invoke {
                owner,
                name,
                descriptor,
                ..
            } => Some((owner.clone(), name.clone(), descriptor.clone())),
            _ => None,
        })
        .collect()
}

fn invoked(owner: &str, name: &str, descriptor: &str) -> (String, String, String) {
    (owner.to_string(), name.to_string(), descriptor.to_string())
}

fn method<'c>(compiled: &'c CompiledFile, name: &str) -> &'c MethodRecord {
    compiled
        .file_unit
        .method(name)
        .unwrap_or_else(|| panic!("method {name} was not emitted"))
}

#[test]
fn generic_function_is_emitted_once_per_binding() {
    let mut file = FileBuilder::new();
    file.function(
        "identity",
        vec![("value", Type::generic("T"))],
        Type::generic("T"),
        |_, _| vec![ret(Expr::ident("value", Type::generic("T")))],
    )
    .function("main", Vec::new(), Type::VOID, |_, _| {
        vec![
            expr(println(call("identity", vec![Expr::int(1)], Type::INT))),
            expr(println(call("identity", vec![Expr::string("a")], Type::STRING))),
            expr(println(call("identity", vec![Expr::int(2)], Type::INT))),
        ]
    });
    let compiled = file.compile().expect("compiles");

    let mut descriptors: Vec<&str> = compiled
        .file_unit
        .methods_named("_identity")
        .map(|m| m.descriptor.as_str())
        .collect();
    descriptors.sort();
    assert_eq!(descriptors, vec!["(I)I", "(Ljava/lang/String;)Ljava/lang/String;"]);

    let int_instance = compiled
        .file_unit
        .methods_named("_identity")
        .find(|m| m.descriptor == "(I)I")
        .expect("int instance");
    assert_eq!(opcodes(int_instance), vec![ILOAD, IRETURN]);

    let main = method(&compiled, "main");
    assert_eq!(main.descriptor, "([Ljava/lang/String;)V");
    let calls: Vec<_> = invokes(main)
        .into_iter()
        .filter(|(_, name, _)| name == "_identity")
        .collect();
    assert_eq!(
        calls,
        vec![
            invoked(UNIT, "_identity", "(I)I"),
            invoked(UNIT, "_identity", "(Ljava/lang/String;)Ljava/lang/String;"),
            invoked(UNIT, "_identity", "(I)I"),
        ]
    );
}

#[test]
fn generic_bodies_request_nested_instantiations() {
    let mut file = FileBuilder::new();
    file.function(
        "inner",
        vec![("value", Type::generic("U"))],
        Type::generic("U"),
        |_, _| vec![ret(Expr::ident("value", Type::generic("U")))],
    )
    .function(
        "outer",
        vec![("value", Type::generic("T"))],
        Type::generic("T"),
        |_, _| {
            vec![ret(call(
                "inner",
                vec![Expr::ident("value", Type::generic("T"))],
                Type::generic("T"),
            ))]
        },
    )
    .function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(println(call("outer", vec![Expr::double(1.5)], Type::DOUBLE)))]
    });
    let compiled = file.compile().expect("compiles");
    assert!(compiled.file_unit.has_method("_outer", "(D)D"));
    assert!(compiled.file_unit.has_method("_inner", "(D)D"));
}

#[test]
fn conflicting_placeholder_bindings_are_rejected() {
    let mut file = FileBuilder::new();
    file.function(
        "same",
        vec![("a", Type::generic("T")), ("b", Type::generic("T"))],
        Type::VOID,
        |_, _| Vec::new(),
    )
    .function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(call(
            "same",
            vec![Expr::int(1), Expr::string("x")],
            Type::VOID,
        ))]
    });
    let err = file.compile().unwrap_err();
    assert!(matches!(err, CodegenError::Specialization { ref function, .. } if function == "same"));
}

#[test]
fn struct_unit_has_fields_constructor_and_to_string() {
    let point = struct_type("Point", vec![("x", Type::INT), ("y", Type::INT)]);
    let empty = struct_type("Empty", Vec::new());
    let mut file = FileBuilder::new();
    file.declare_struct(&point).declare_struct(&empty);
    let compiled = file.compile().expect("compiles");

    let unit = compiled.struct_unit("demo/main$Point").expect("point unit");
    let fields: Vec<_> = unit
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.descriptor.as_str()))
        .collect();
    assert_eq!(fields, vec![("x", "I"), ("y", "I")]);
    assert!(unit.has_method("<init>", "(II)V"));

    let to_string = unit.method("toString").expect("toString");
    let texts: Vec<_> = to_string
        .code
        .iter()
        .filter_map(|insn| match insn {
            Insn::Push(Constant::Str(text)) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["Point[", "x=", ", y=", "]"]);

    let empty_unit = compiled.struct_unit("demo/main$Empty").expect("empty unit");
    let empty_to_string = empty_unit.method("toString").expect("toString");
    assert_eq!(
        empty_to_string.code,
        vec![Insn::Push(Constant::Str("Empty[]".into())), Insn::Op(ARETURN)]
    );

    let classes = compiled.serialize(49).expect("serializes");
    assert_eq!(classes.len(), 3);
    for (_, bytes) in &classes {
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    }
}

#[test]
fn construction_boxes_generic_fields() {
    let boxed = struct_type("Box", vec![("value", Type::generic("T"))]);
    let mut concrete = boxed.clone();
    concrete.resolved.insert("T".into(), Type::INT);
    let ty = Type::Struct(concrete.clone());
    let mut file = FileBuilder::new();
    file.declare_struct(&boxed)
        .function("make", Vec::new(), ty.clone(), |_, _| {
            vec![ret(call("Box", vec![Expr::int(7)], ty.clone()))]
        });
    let compiled = file.compile().expect("compiles");
    let make = method(&compiled, "_make");
    assert_eq!(make.descriptor, "()Ldemo/main$Box;");
    assert_eq!(
        invokes(make),
        vec![
            invoked("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;"),
            invoked("demo/main$Box", "<init>", "(Ljava/lang/Object;)V"),
        ]
    );
}

#[test]
fn monomorphized_field_is_narrowed_on_load() {
    let boxed = struct_type("Box", vec![("value", Type::generic("T"))]);
    let mut concrete = boxed.clone();
    concrete.resolved.insert("T".into(), Type::INT);
    let ty = Type::Struct(concrete);
    let mut file = FileBuilder::new();
    file.declare_struct(&boxed).function(
        "unwrap",
        vec![("b", ty.clone())],
        Type::INT,
        |_, _| {
            vec![ret(Expr::property(
                Expr::ident("b", ty.clone()),
                &["value"],
                Type::INT,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    let unwrap = method(&compiled, "_unwrap");
    assert_eq!(
        unwrap.code,
        vec![
            Insn::Local {
                opcode: ALOAD,
                slot: 0
            },
            Insn::Field {
                opcode: GETFIELD,
                owner: "demo/main$Box".into(),
                name: "value".into(),
                descriptor: "Ljava/lang/Object;".into(),
            },
            Insn::Type {
                opcode: CHECKCAST,
                class: "java/lang/Integer".into(),
            },
            Insn::Invoke {
                opcode: INVOKEVIRTUAL,
                owner: "java/lang/Integer".into(),
                name: "intValue".into(),
                descriptor: "()I".into(),
            },
            Insn::Op(IRETURN),
        ]
    );
}

#[test]
fn field_assignment_boxes_into_declared_storage() {
    let cell = struct_type("Cell", vec![("value", Type::Union(vec![Type::INT, Type::STRING]))]);
    let ty = Type::Struct(cell.clone());
    let mut file = FileBuilder::new();
    file.declare_struct(&cell)
        .function("fill", vec![("c", ty.clone())], Type::VOID, |_, _| {
            vec![expr(Expr::assign(
                Expr::property(Expr::ident("c", ty.clone()), &["value"], Type::VOID),
                Expr::int(3),
            ))]
        });
    let compiled = file.compile().expect("compiles");
    let fill = method(&compiled, "_fill");
    assert_eq!(opcodes(fill), vec![ALOAD, INVOKESTATIC, PUTFIELD, RETURN]);
}

#[test]
fn and_short_circuits_on_false() {
    let mut file = FileBuilder::new();
    file.function(
        "both",
        vec![("a", Type::BOOLEAN), ("b", Type::BOOLEAN)],
        Type::BOOLEAN,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::And,
                Expr::ident("a", Type::BOOLEAN),
                Expr::ident("b", Type::BOOLEAN),
                Type::BOOLEAN,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_both")),
        vec![ILOAD, IFEQ, ILOAD, IFEQ, GOTO, IRETURN]
    );
}

#[test]
fn or_short_circuits_on_true() {
    let mut file = FileBuilder::new();
    file.function(
        "either",
        vec![("a", Type::BOOLEAN), ("b", Type::BOOLEAN)],
        Type::BOOLEAN,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Or,
                Expr::ident("a", Type::BOOLEAN),
                Expr::ident("b", Type::BOOLEAN),
                Type::BOOLEAN,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    let either = method(&compiled, "_either");
    assert_eq!(opcodes(either), vec![ILOAD, IFNE, ILOAD, IFNE, GOTO, IRETURN]);
    let pushes: Vec<_> = either
        .code
        .iter()
        .filter(|insn| matches!(insn, Insn::Push(_)))
        .cloned()
        .collect();
    assert_eq!(
        pushes,
        vec![Insn::Push(Constant::Int(0)), Insn::Push(Constant::Int(1))]
    );
}

#[test]
fn mixed_arithmetic_widens_to_the_wider_operand() {
    let mut file = FileBuilder::new();
    file.function(
        "add_float",
        vec![("a", Type::INT), ("b", Type::FLOAT)],
        Type::FLOAT,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Add,
                Expr::ident("a", Type::INT),
                Expr::ident("b", Type::FLOAT),
                Type::FLOAT,
            ))]
        },
    )
    .function(
        "mul_double",
        vec![("a", Type::INT), ("b", Type::DOUBLE)],
        Type::DOUBLE,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Mul,
                Expr::ident("a", Type::INT),
                Expr::ident("b", Type::DOUBLE),
                Type::DOUBLE,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_add_float")),
        vec![ILOAD, I2F, FLOAD, FADD, FRETURN]
    );
    assert_eq!(
        opcodes(method(&compiled, "_mul_double")),
        vec![ILOAD, I2D, DLOAD, DMUL, DRETURN]
    );
}

#[test]
fn integer_comparison_jumps_on_the_negated_condition() {
    let mut file = FileBuilder::new();
    file.function(
        "less",
        vec![("a", Type::INT), ("b", Type::INT)],
        Type::BOOLEAN,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Less,
                Expr::ident("a", Type::INT),
                Expr::ident("b", Type::INT),
                Type::BOOLEAN,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_less")),
        vec![ILOAD, ILOAD, IF_ICMPGE, GOTO, IRETURN]
    );
}

#[test]
fn float_greater_than_treats_nan_as_false() {
    let mut file = FileBuilder::new();
    file.function(
        "above",
        vec![("a", Type::FLOAT), ("b", Type::FLOAT)],
        Type::BOOLEAN,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Greater,
                Expr::ident("a", Type::FLOAT),
                Expr::ident("b", Type::FLOAT),
                Type::BOOLEAN,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_above")),
        vec![FLOAD, FLOAD, FCMPL, IFLE, GOTO, IRETURN]
    );
}

#[test]
fn string_equality_goes_through_objects_equals() {
    let mut file = FileBuilder::new();
    file.function(
        "same",
        vec![("a", Type::STRING), ("b", Type::STRING)],
        Type::BOOLEAN,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Equal,
                Expr::ident("a", Type::STRING),
                Expr::ident("b", Type::STRING),
                Type::BOOLEAN,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    let same = method(&compiled, "_same");
    assert_eq!(
        invokes(same),
        vec![invoked(
            "java/util/Objects",
            "equals",
            "(Ljava/lang/Object;Ljava/lang/Object;)Z"
        )]
    );
    assert!(opcodes(same).contains(&IFEQ));
}

#[test]
fn string_concatenation_uses_a_builder() {
    let mut file = FileBuilder::new();
    file.function("greet", vec![("n", Type::INT)], Type::STRING, |_, _| {
        vec![ret(Expr::binary(
            BinaryOp::Add,
            Expr::string("count: "),
            Expr::ident("n", Type::INT),
            Type::STRING,
        ))]
    });
    let compiled = file.compile().expect("compiles");
    let greet = method(&compiled, "_greet");
    let builder = "java/lang/StringBuilder";
    assert_eq!(
        invokes(greet),
        vec![
            invoked(builder, "<init>", "()V"),
            invoked(builder, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;"),
            invoked(builder, "append", "(I)Ljava/lang/StringBuilder;"),
            invoked(builder, "toString", "()Ljava/lang/String;"),
        ]
    );
}

#[test]
fn exponentiation_is_not_implemented() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |context, scope| {
        context.define(scope, "x", Type::INT);
        vec![var(
            "x",
            Expr::binary(BinaryOp::Pow, Expr::int(2), Expr::int(3), Type::INT),
        )]
    });
    let err = file.compile().unwrap_err();
    assert!(
        matches!(err, CodegenError::NotImplemented { ref construct, .. } if construct == "exponentiation operator")
    );
}

#[test]
fn postfix_increment_updates_the_slot() {
    let mut file = FileBuilder::new();
    file.function("count", Vec::new(), Type::VOID, |context, scope| {
        context.define(scope, "i", Type::INT);
        vec![
            var("i", Expr::int(0)),
            expr(Expr::new(
                ExprKind::Postfix {
                    op: PostfixOp::Increment,
                    operand: Box::new(Expr::ident("i", Type::INT)),
                },
                Type::VOID,
            )),
        ]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        method(&compiled, "_count").code,
        vec![
            Insn::Push(Constant::Int(0)),
            Insn::Local {
                opcode: ISTORE,
                slot: 0
            },
            Insn::Local {
                opcode: ILOAD,
                slot: 0
            },
            Insn::Push(Constant::Int(1)),
            Insn::Op(IADD),
            Insn::Local {
                opcode: ISTORE,
                slot: 0
            },
            Insn::Op(RETURN),
        ]
    );
}

#[test]
fn match_evaluates_scrutinee_once() {
    let union = Type::Union(vec![Type::INT, Type::STRING]);
    let mut file = FileBuilder::new();
    file.function(
        "describe",
        vec![("value", union.clone())],
        Type::VOID,
        |context, scope| {
            let int_arm = context.child(scope);
            context.define(int_arm, "n", Type::INT);
            let string_arm = context.child(scope);
            context.define(string_arm, "s", Type::STRING);
            vec![Statement::Match(MatchStmt {
                scrutinee: Expr::ident("value", union.clone()),
                arms: vec![
                    MatchArm {
                        pattern: Type::INT,
                        binding: "n".into(),
                        body: block(int_arm, vec![expr(println(Expr::ident("n", Type::INT)))]),
                        span: Span::default(),
                    },
                    MatchArm {
                        pattern: Type::STRING,
                        binding: "s".into(),
                        body: block(
                            string_arm,
                            vec![expr(println(Expr::ident("s", Type::STRING)))],
                        ),
                        span: Span::default(),
                    },
                ],
                span: Span::default(),
            })]
        },
    );
    let compiled = file.compile().expect("compiles");
    let describe = method(&compiled, "_describe");
    let arg_loads = describe
        .code
        .iter()
        .filter(|insn| {
            **insn
                == Insn::Local {
                    opcode: ALOAD,
                    slot: 0,
                }
        })
        .count();
    assert_eq!(arg_loads, 1);
    let tests: Vec<_> = describe
        .code
        .iter()
        .filter_map(|insn| match insn {
            Insn::Type {
                opcode: INSTANCEOF,
                class,
            } => Some(class.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tests, vec!["java/lang/Integer", "java/lang/String"]);
    assert_eq!(opcodes(describe).iter().filter(|op| **op == GOTO).count(), 2);
}

#[test]
fn for_loop_checks_has_next_before_next() {
    let list = Type::list_of(Type::INT);
    let mut file = FileBuilder::new();
    file.function("walk", vec![("items", list.clone())], Type::VOID, |context, scope| {
        let body = context.child(scope);
        context.define(body, "item", Type::INT);
        vec![Statement::For(ForStmt {
            binding: "item".into(),
            iterable: Expr::ident("items", list.clone()),
            body: block(body, vec![expr(println(Expr::ident("item", Type::INT)))]),
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    let calls = invokes(method(&compiled, "_walk"));
    let position = |name: &str| {
        calls
            .iter()
            .position(|(_, called, _)| called == name)
            .unwrap_or_else(|| panic!("{name} not called"))
    };
    assert!(position("list") < position("iterator"));
    assert!(position("iterator") < position("hasNext"));
    assert!(position("hasNext") < position("next"));
    assert_eq!(
        calls[position("next") + 1],
        invoked("java/lang/Integer", "intValue", "()I")
    );
}

#[test]
fn list_literal_fills_a_tagged_wrapper() {
    let list = Type::list_of(Type::INT);
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |context, scope| {
        context.define(scope, "xs", list.clone());
        vec![var(
            "xs",
            Expr::new(ExprKind::ListLiteral(vec![Expr::int(1), Expr::int(2)]), list.clone()),
        )]
    });
    let compiled = file.compile().expect("compiles");
    let main = method(&compiled, "main");
    assert!(main.code.contains(&Insn::Push(Constant::Str("int".into()))));
    let adds = invokes(main)
        .into_iter()
        .filter(|(owner, name, _)| owner == "java/util/ArrayList" && name == "add")
        .count();
    assert_eq!(adds, 2);
    assert_eq!(opcodes(main).iter().filter(|op| **op == POP).count(), 3);
    assert_eq!(opcodes(main).last(), Some(&RETURN));
}

#[test]
fn union_return_is_boxed() {
    let mut file = FileBuilder::new();
    file.function(
        "wrap",
        vec![("a", Type::INT)],
        Type::Union(vec![Type::INT, Type::STRING]),
        |_, _| vec![ret(Expr::ident("a", Type::INT))],
    );
    let compiled = file.compile().expect("compiles");
    let wrap = method(&compiled, "_wrap");
    assert_eq!(wrap.descriptor, "(I)Ljava/lang/Object;");
    assert_eq!(opcodes(wrap), vec![ILOAD, INVOKESTATIC, ARETURN]);
}

#[test]
fn runtime_calls_box_their_arguments() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(println(Expr::int(42)))]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        invokes(method(&compiled, "main")),
        vec![
            invoked("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;"),
            invoked("ixion/modules/Prelude", "println", "(Ljava/lang/Object;)V"),
        ]
    );
}

#[test]
fn self_instance_follows_options() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| Vec::new());
    let compiled = file.compile().expect("compiles");
    assert!(compiled.file_unit.method("<clinit>").is_some());
    assert_eq!(compiled.file_unit.fields[0].name, "instance");
    assert_eq!(compiled.file_unit.fields[0].descriptor, "Ldemo/main;");

    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| Vec::new());
    let compiled = file
        .compile_with(&CodegenOptions::default().without_instance())
        .expect("compiles");
    assert!(compiled.file_unit.method("<clinit>").is_none());
    assert!(compiled.file_unit.fields.is_empty());
    assert!(compiled.file_unit.method("<init>").is_some());
}

#[test]
fn missing_return_ends_in_a_trap() {
    let mut file = FileBuilder::new();
    file.function("broken", Vec::new(), Type::INT, |_, _| Vec::new());
    let compiled = file.compile().expect("compiles");
    let broken = method(&compiled, "_broken");
    assert_eq!(broken.code.last(), Some(&Insn::Op(ATHROW)));
    assert!(broken
        .code
        .contains(&Insn::Push(Constant::Str("missing return in _broken".into()))));
}

#[test]
fn if_with_returning_arms_needs_no_trap() {
    let mut file = FileBuilder::new();
    file.function("pick", vec![("flag", Type::BOOLEAN)], Type::INT, |context, scope| {
        let then_scope = context.child(scope);
        let else_scope = context.child(scope);
        vec![Statement::If(IfStmt {
            condition: Expr::ident("flag", Type::BOOLEAN),
            then_block: block(then_scope, vec![ret(Expr::int(1))]),
            else_branch: Some(Box::new(Statement::Block(block(
                else_scope,
                vec![ret(Expr::int(2))],
            )))),
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_pick")),
        vec![ILOAD, IFEQ, IRETURN, IRETURN]
    );
}

#[test]
fn unknown_identifier_aborts() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(println(Expr::ident("ghost", Type::INT)))]
    });
    let err = file.compile().unwrap_err();
    assert_eq!(err, CodegenError::identifier("ghost", Span::default()));
}

#[test]
fn unsupported_constructs_are_reported() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(Expr::new(
            ExprKind::Index {
                target: Box::new(Expr::int(1)),
                index: Box::new(Expr::int(0)),
            },
            Type::INT,
        ))]
    });
    assert!(matches!(
        file.compile().unwrap_err(),
        CodegenError::NotImplemented { .. }
    ));

    let mut file = FileBuilder::new();
    file.statement(Statement::Enum {
        name: "Color".into(),
        span: Span::default(),
    });
    assert!(matches!(
        file.compile().unwrap_err(),
        CodegenError::NotImplemented { .. }
    ));

    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| {
        vec![expr(Expr::assign(Expr::int(1), Expr::int(2)))]
    });
    assert!(matches!(
        file.compile().unwrap_err(),
        CodegenError::Implementation { .. }
    ));

    let mut file = FileBuilder::new();
    file.statement(expr(println(Expr::int(1))));
    assert!(matches!(
        file.compile().unwrap_err(),
        CodegenError::Implementation { .. }
    ));
}

#[test]
fn skipped_constructs_emit_nothing() {
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |_, _| {
        vec![
            expr(Expr::new(ExprKind::Lambda, Type::VOID)),
            expr(Expr::new(ExprKind::Bad, Type::VOID)),
            Statement::TypeAlias {
                name: "Id".into(),
                span: Span::default(),
            },
        ]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(method(&compiled, "main").code, vec![Insn::Op(RETURN)]);
}

#[test]
fn tracing_leaves_output_unchanged() {
    let build = || {
        let mut file = FileBuilder::new();
        file.function(
            "identity",
            vec![("value", Type::generic("T"))],
            Type::generic("T"),
            |_, _| vec![ret(Expr::ident("value", Type::generic("T")))],
        )
        .function("main", Vec::new(), Type::VOID, |_, _| {
            vec![expr(println(call("identity", vec![Expr::int(1)], Type::INT)))]
        });
        file
    };
    let quiet = build().compile().expect("compiles");
    let traced = build()
        .compile_with(&CodegenOptions::default().with_trace(true))
        .expect("compiles");
    assert_eq!(quiet.file_unit, traced.file_unit);
}

#[test]
fn list_arms_compare_the_element_tag() {
    let strings = Type::list_of(Type::STRING);
    let ints = Type::list_of(Type::INT);
    let union = Type::Union(vec![strings.clone(), ints.clone()]);
    let mut file = FileBuilder::new();
    file.function("pick", vec![("value", union.clone())], Type::VOID, |context, scope| {
        let string_arm = context.child(scope);
        let int_arm = context.child(scope);
        let arm = |pattern: Type, scope, text: &str| MatchArm {
            pattern,
            binding: String::new(),
            body: block(scope, vec![expr(println(Expr::string(text)))]),
            span: Span::default(),
        };
        vec![Statement::Match(MatchStmt {
            scrutinee: Expr::ident("value", union.clone()),
            arms: vec![
                arm(strings.clone(), string_arm, "strings"),
                arm(ints.clone(), int_arm, "ints"),
            ],
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    let pick = method(&compiled, "_pick");

    let wrapper = "ixion/runtime/ListWrapper";
    let tag = invoked(wrapper, "name", "()Ljava/lang/String;");
    let equals = invoked("java/lang/String", "equals", "(Ljava/lang/Object;)Z");
    let println = invoked("ixion/modules/Prelude", "println", "(Ljava/lang/Object;)V");
    assert_eq!(
        invokes(pick),
        vec![
            tag.clone(),
            equals.clone(),
            println.clone(),
            tag,
            equals,
            println
        ]
    );

    let arm_ops = [
        ALOAD,
        INSTANCEOF,
        IFEQ,
        ALOAD,
        CHECKCAST,
        INVOKEVIRTUAL,
        INVOKEVIRTUAL,
        IFEQ,
        INVOKESTATIC,
        GOTO,
    ];
    let mut expected = vec![ALOAD, ASTORE];
    expected.extend(arm_ops);
    expected.extend(arm_ops);
    expected.push(RETURN);
    assert_eq!(opcodes(pick), expected);

    let texts: Vec<_> = pick
        .code
        .iter()
        .filter_map(|insn| match insn {
            Insn::Push(Constant::Str(text)) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["string", "strings", "int", "ints"]);
}

#[test]
fn while_loop_tests_at_the_head_and_jumps_back() {
    let mut file = FileBuilder::new();
    file.function("spin", vec![("flag", Type::BOOLEAN)], Type::VOID, |context, scope| {
        let body = context.child(scope);
        vec![Statement::While(WhileStmt {
            condition: Expr::ident("flag", Type::BOOLEAN),
            body: block(body, vec![expr(println(Expr::int(1)))]),
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    let spin = method(&compiled, "_spin");
    assert_eq!(
        opcodes(spin),
        vec![ILOAD, IFEQ, INVOKESTATIC, INVOKESTATIC, GOTO, RETURN]
    );

    let head = match &spin.code[0] {
        Insn::Mark(label) => *label,
        other => panic!("loop starts with {other:?} instead of its head label"),
    };
    let jumps: Vec<_> = spin
        .code
        .iter()
        .filter_map(|insn| match insn {
            Insn::Jump { opcode, target } => Some((*opcode, *target)),
            _ => None,
        })
        .collect();
    assert_eq!(jumps[1], (GOTO, head));
    let exit = spin
        .code
        .iter()
        .rposition(|insn| *insn == Insn::Mark(jumps[0].1))
        .expect("exit label is marked");
    assert_eq!(spin.code[exit + 1], Insn::Op(RETURN));
}

#[test]
fn negation_uses_the_operand_kind_then_widens() {
    let negate = |operand: Expr, ty: Type| {
        Expr::new(
            ExprKind::Prefix {
                op: PrefixOp::Negate,
                operand: Box::new(operand),
            },
            ty,
        )
    };
    let mut file = FileBuilder::new();
    file.function("flip", vec![("a", Type::FLOAT)], Type::FLOAT, |_, _| {
        vec![ret(negate(Expr::ident("a", Type::FLOAT), Type::FLOAT))]
    })
    .function("flip_wide", vec![("a", Type::INT)], Type::DOUBLE, |_, _| {
        vec![ret(negate(Expr::ident("a", Type::INT), Type::INT))]
    })
    .function("flip_double", vec![("a", Type::DOUBLE)], Type::DOUBLE, |_, _| {
        vec![ret(negate(Expr::ident("a", Type::DOUBLE), Type::DOUBLE))]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(opcodes(method(&compiled, "_flip")), vec![FLOAD, FNEG, FRETURN]);
    assert_eq!(
        opcodes(method(&compiled, "_flip_wide")),
        vec![ILOAD, INEG, I2D, DRETURN]
    );
    assert_eq!(
        opcodes(method(&compiled, "_flip_double")),
        vec![DLOAD, DNEG, DRETURN]
    );
}

#[test]
fn not_flips_the_low_bit() {
    let mut file = FileBuilder::new();
    file.function("invert", vec![("flag", Type::BOOLEAN)], Type::BOOLEAN, |_, _| {
        vec![ret(Expr::new(
            ExprKind::Prefix {
                op: PrefixOp::Not,
                operand: Box::new(Expr::ident("flag", Type::BOOLEAN)),
            },
            Type::BOOLEAN,
        ))]
    });
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        method(&compiled, "_invert").code,
        vec![
            Insn::Local {
                opcode: ILOAD,
                slot: 0
            },
            Insn::Push(Constant::Int(1)),
            Insn::Op(IXOR),
            Insn::Op(IRETURN),
        ]
    );
}

#[test]
fn xor_accepts_matching_booleans_or_ints() {
    let xor = |left: Type, right: Type, ty: Type| {
        Expr::binary(
            BinaryOp::Xor,
            Expr::ident("a", left),
            Expr::ident("b", right),
            ty,
        )
    };
    let mut file = FileBuilder::new();
    file.function(
        "differ",
        vec![("a", Type::BOOLEAN), ("b", Type::BOOLEAN)],
        Type::BOOLEAN,
        |_, _| vec![ret(xor(Type::BOOLEAN, Type::BOOLEAN, Type::BOOLEAN))],
    )
    .function(
        "bits",
        vec![("a", Type::INT), ("b", Type::INT)],
        Type::INT,
        |_, _| vec![ret(xor(Type::INT, Type::INT, Type::INT))],
    );
    let compiled = file.compile().expect("compiles");
    assert_eq!(
        opcodes(method(&compiled, "_differ")),
        vec![ILOAD, ILOAD, IXOR, IRETURN]
    );
    assert_eq!(
        opcodes(method(&compiled, "_bits")),
        vec![ILOAD, ILOAD, IXOR, IRETURN]
    );

    let mut file = FileBuilder::new();
    file.function(
        "mixed",
        vec![("a", Type::INT), ("b", Type::DOUBLE)],
        Type::INT,
        |_, _| vec![ret(xor(Type::INT, Type::DOUBLE, Type::INT))],
    );
    assert!(matches!(
        file.compile().unwrap_err(),
        CodegenError::Implementation { .. }
    ));
}

#[test]
fn remainder_widens_the_int_operand() {
    let mut file = FileBuilder::new();
    file.function(
        "rem",
        vec![("a", Type::INT), ("b", Type::DOUBLE)],
        Type::DOUBLE,
        |_, _| {
            vec![ret(Expr::binary(
                BinaryOp::Mod,
                Expr::ident("a", Type::INT),
                Expr::ident("b", Type::DOUBLE),
                Type::DOUBLE,
            ))]
        },
    );
    let compiled = file.compile().expect("compiles");
    let rem = method(&compiled, "_rem");
    assert_eq!(opcodes(rem), vec![ILOAD, I2D, DLOAD, DREM, DRETURN]);
    assert!(rem.code.contains(&Insn::Local {
        opcode: DLOAD,
        slot: 1
    }));
}

#[test]
fn empty_list_is_a_bare_tagged_wrapper() {
    let list = Type::list_of(Type::STRING);
    let mut file = FileBuilder::new();
    file.function("main", Vec::new(), Type::VOID, |context, scope| {
        context.define(scope, "names", list.clone());
        vec![var("names", Expr::new(ExprKind::EmptyList, list.clone()))]
    });
    let compiled = file.compile().expect("compiles");
    let main = method(&compiled, "main");
    assert_eq!(
        main.code,
        vec![
            Insn::Type {
                opcode: NEW,
                class: "ixion/runtime/ListWrapper".into(),
            },
            Insn::Op(DUP),
            Insn::Push(Constant::Str("string".into())),
            Insn::Invoke {
                opcode: INVOKESPECIAL,
                owner: "ixion/runtime/ListWrapper".into(),
                name: "<init>".into(),
                descriptor: "(Ljava/lang/String;)V".into(),
            },
            Insn::Local {
                opcode: ASTORE,
                slot: 1
            },
            Insn::Op(RETURN),
        ]
    );
}

#[test]
fn iterator_values_are_walked_directly() {
    let mut file = FileBuilder::new();
    file.function("drain", vec![("it", Type::iterator())], Type::VOID, |context, scope| {
        let body = context.child(scope);
        context.define(body, "line", Type::STRING);
        vec![Statement::For(ForStmt {
            binding: "line".into(),
            iterable: Expr::ident("it", Type::iterator()),
            body: block(body, vec![expr(println(Expr::ident("line", Type::STRING)))]),
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    let drain = method(&compiled, "_drain");
    let iterator = "java/util/Iterator";
    assert_eq!(
        invokes(drain),
        vec![
            invoked(iterator, "hasNext", "()Z"),
            invoked(iterator, "next", "()Ljava/lang/Object;"),
            invoked("ixion/modules/Prelude", "println", "(Ljava/lang/Object;)V"),
        ]
    );
    assert_eq!(
        opcodes(drain),
        vec![
            ALOAD,
            ASTORE,
            ALOAD,
            INVOKEINTERFACE,
            IFEQ,
            ALOAD,
            INVOKEINTERFACE,
            CHECKCAST,
            ASTORE,
            ALOAD,
            INVOKESTATIC,
            GOTO,
            RETURN,
        ]
    );
}

#[test]
fn iterator_returned_by_a_call_is_walked_directly() {
    let mut file = FileBuilder::new();
    let root = file.context.root();
    let cursor = FunctionSig::external("demo/Source", "cursor", Vec::new(), Type::iterator());
    file.context
        .define(root, "cursor", Type::Function(Arc::new(cursor)));
    file.function("main", Vec::new(), Type::VOID, |context, scope| {
        let body = context.child(scope);
        context.define(body, "item", Type::object());
        vec![Statement::For(ForStmt {
            binding: "item".into(),
            iterable: call("cursor", Vec::new(), Type::iterator()),
            body: block(body, vec![expr(println(Expr::ident("item", Type::object())))]),
            span: Span::default(),
        })]
    });
    let compiled = file.compile().expect("compiles");
    let main = method(&compiled, "main");
    let calls = invokes(main);
    assert_eq!(
        calls[..3],
        [
            invoked("demo/Source", "cursor", "()Ljava/util/Iterator;"),
            invoked("java/util/Iterator", "hasNext", "()Z"),
            invoked("java/util/Iterator", "next", "()Ljava/lang/Object;"),
        ]
    );
    assert!(!calls.iter().any(|(_, name, _)| name == "iterator"));
    assert!(!opcodes(main).contains(&CHECKCAST));
}
