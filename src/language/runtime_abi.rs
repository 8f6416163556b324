use crate::language::{
    context::{ContextTree, ScopeId},
    types::{FunctionSig, Type},
};
use std::sync::Arc;

pub const DEFAULT_RUNTIME_OWNER: &str = "ixion/modules/Prelude";
pub const LIST_WRAPPER_CLASS: &str = "ixion/runtime/ListWrapper";

/// `ListWrapper.<init>(String)`: the argument is the element type tag.
pub const LIST_WRAPPER_INIT: &str = "(Ljava/lang/String;)V";
pub const LIST_WRAPPER_LIST: (&str, &str) = ("list", "()Ljava/util/ArrayList;");
pub const LIST_WRAPPER_NAME: (&str, &str) = ("name", "()Ljava/lang/String;");

/// Static functions generated code may call without declaring them.
///
/// `len` answers -1 for values that are neither strings nor wrapped lists.
#[derive(Clone, Debug)]
pub struct RuntimeAbi {
    pub owner: String,
    pub functions: Vec<Arc<FunctionSig>>,
}

impl Default for RuntimeAbi {
    fn default() -> Self {
        Self::prelude(DEFAULT_RUNTIME_OWNER)
    }
}

impl RuntimeAbi {
    pub fn prelude(owner: &str) -> Self {
        let object = || Type::object();
        let sig = |name: &str, params: Vec<(&str, Type)>, ret: Type| {
            Arc::new(FunctionSig::external(
                owner,
                name,
                params
                    .into_iter()
                    .map(|(param, ty)| (param.to_string(), ty))
                    .collect(),
                ret,
            ))
        };
        let functions = vec![
            sig("print", vec![("value", object())], Type::VOID),
            sig("println", vec![("value", object())], Type::VOID),
            sig("panic", vec![("message", object())], Type::VOID),
            sig("readLine", Vec::new(), Type::STRING),
            sig("len", vec![("value", object())], Type::INT),
            sig("push", vec![("list", object()), ("value", object())], Type::VOID),
            sig("pop", vec![("list", object())], object()),
        ];
        Self {
            owner: owner.to_string(),
            functions,
        }
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionSig>> {
        self.functions.iter().find(|sig| sig.name == name)
    }

    /// Declares every runtime function in `scope` so calls resolve like user names.
    /// Names the scope already defines are left alone.
    pub fn bind_into(&self, context: &mut ContextTree, scope: ScopeId) {
        for sig in &self.functions {
            if !context.declares(scope, &sig.name) {
                context.define(scope, sig.name.clone(), Type::Function(sig.clone()));
            }
        }
    }
}
