use crate::language::errors::CodegenError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct CodegenDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl CodegenDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &CodegenError) -> Self {
        let help = match err {
            CodegenError::NotImplemented { .. } => {
                Some("this construct is recognized but has no lowering yet".to_string())
            }
            CodegenError::Specialization { .. } => {
                Some("every use of a type parameter must bind the same type".to_string())
            }
            _ => None,
        };
        Self {
            src,
            span: err.to_source_span(),
            help,
            message: err.to_string(),
            label: err.label().to_string(),
        }
    }
}

pub fn report_codegen_error(path: &Path, source: &str, err: &CodegenError) {
    let src = NamedSource::new(path.display().to_string(), source.to_string());
    let diagnostic = CodegenDiagnostic::from_error(src, err);
    eprintln!("{:?}", Report::new(diagnostic));
}
