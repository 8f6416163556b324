use crate::language::span::Span;
use miette::SourceSpan;
use thiserror::Error;

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Fatal conditions raised while lowering a file. The first one aborts the file.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CodegenError {
    #[error("Identifier `{name}` not found in any enclosing scope")]
    IdentifierNotFound { name: String, span: Span },
    #[error("Implementation error: {message}")]
    Implementation { message: String, span: Span },
    #[error("{construct} is not implemented yet")]
    NotImplemented { construct: String, span: Span },
    #[error("Specialization of `{function}` failed: {message}")]
    Specialization {
        function: String,
        message: String,
        span: Span,
    },
    #[error("Class format error in `{unit}`: {message}")]
    ClassFormat { unit: String, message: String },
}

impl CodegenError {
    pub fn identifier(name: impl Into<String>, span: Span) -> Self {
        CodegenError::IdentifierNotFound {
            name: name.into(),
            span,
        }
    }

    pub fn implementation(message: impl Into<String>, span: Span) -> Self {
        CodegenError::Implementation {
            message: message.into(),
            span,
        }
    }

    pub fn not_implemented(construct: impl Into<String>, span: Span) -> Self {
        CodegenError::NotImplemented {
            construct: construct.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CodegenError::IdentifierNotFound { span, .. }
            | CodegenError::Implementation { span, .. }
            | CodegenError::NotImplemented { span, .. }
            | CodegenError::Specialization { span, .. } => Some(*span),
            CodegenError::ClassFormat { .. } => None,
        }
    }

    pub fn to_source_span(&self) -> Option<SourceSpan> {
        self.span().map(SourceSpan::from)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CodegenError::IdentifierNotFound { .. } => "unknown identifier",
            CodegenError::Implementation { .. } => "cannot lower this construct",
            CodegenError::NotImplemented { .. } => "not supported yet",
            CodegenError::Specialization { .. } => "conflicting type arguments",
            CodegenError::ClassFormat { .. } => "invalid output",
        }
    }

    /// Process status a driver should exit with.
    pub fn exit_code(&self) -> i32 {
        match self {
            CodegenError::IdentifierNotFound { .. } => 2,
            CodegenError::Implementation { .. } => 43,
            CodegenError::NotImplemented { .. } => 49,
            CodegenError::Specialization { .. } => 52,
            CodegenError::ClassFormat { .. } => 70,
        }
    }
}
