pub mod classfile;
pub mod diagnostics;
pub mod language;
pub mod options;
