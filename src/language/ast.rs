use crate::language::{
    context::{ContextTree, ScopeId},
    span::Span,
    types::Type,
};

/// One type-checked source file as handed over by the frontend.
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// Relative path without extension; becomes the internal name of the file unit.
    pub path: String,
    pub context: ContextTree,
    pub statements: Vec<Statement>,
}

impl SourceFile {
    pub fn root(&self) -> ScopeId {
        self.context.root()
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub scope: ScopeId,
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Expression(Expr),
    Variable(VariableStmt),
    Function(FunctionDecl),
    Struct(StructDecl),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Match(MatchStmt),
    Block(Block),
    Export(Box<Statement>),
    Use { path: String, span: Span },
    TypeAlias { name: String, span: Span },
    UnionType { name: String, span: Span },
    Enum { name: String, span: Span },
    Parameter { name: String, span: Span },
}

#[derive(Clone, Debug)]
pub struct VariableStmt {
    pub name: String,
    pub initializer: Expr,
    pub span: Span,
}

/// The signature lives in the enclosing scope under `name`; parameters are bound in
/// the body scope.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_branch: Option<Box<Statement>>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub span: Span,
}

/// `binding` is declared in the body scope with the element type.
#[derive(Clone, Debug)]
pub struct ForStmt {
    pub binding: String,
    pub iterable: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct MatchStmt {
    pub scrutinee: Expr,
    pub arms: Vec<MatchArm>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct MatchArm {
    pub pattern: Type,
    pub binding: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::INT,
            Literal::Float(_) => Type::FLOAT,
            Literal::Double(_) => Type::DOUBLE,
            Literal::Bool(_) => Type::BOOLEAN,
            Literal::Str(_) => Type::STRING,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::LessEqual
                | BinaryOp::GreaterEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixOp {
    Negate,
    Not,
}

/// Every node carries the type the checker resolved for it. Inside generic bodies
/// that type may still mention placeholders.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Property {
        receiver: Box<Expr>,
        fields: Vec<String>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },
    Grouping(Box<Expr>),
    EmptyList,
    ListLiteral(Vec<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    ModuleAccess {
        module: String,
        member: String,
    },
    Lambda,
    EnumAccess {
        enum_name: String,
        variant: String,
    },
    Empty,
    Bad,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            span: Span::default(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = literal.ty();
        Self::new(ExprKind::Literal(literal), ty)
    }

    pub fn int(value: i32) -> Self {
        Self::literal(Literal::Int(value))
    }

    pub fn float(value: f32) -> Self {
        Self::literal(Literal::Float(value))
    }

    pub fn double(value: f64) -> Self {
        Self::literal(Literal::Double(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::Str(value.into()))
    }

    pub fn ident(name: impl Into<String>, ty: Type) -> Self {
        Self::new(ExprKind::Identifier(name.into()), ty)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, ty: Type) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn call(callee: Expr, args: Vec<Expr>, ty: Type) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
        )
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            Type::VOID,
        )
    }

    pub fn property(receiver: Expr, fields: &[&str], ty: Type) -> Self {
        Self::new(
            ExprKind::Property {
                receiver: Box::new(receiver),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
            ty,
        )
    }

    pub fn empty() -> Self {
        Self::new(ExprKind::Empty, Type::VOID)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ExprKind::Empty)
    }
}
