use crate::traits::{ArgumentHandle, EvaluationContext};
use gridcalc_common::{ExcelError, LiteralValue};
use gridcalc_parse::ASTNode;
use std::rc::Rc;

/// A worksheet function. Implementations are registered once at startup and
/// looked up by upper-cased name; arity violations surface as `#VALUE!`
/// before `eval` is reached.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;

    /// Required argument count.
    fn min_args(&self) -> usize {
        0
    }

    /// Maximum accepted argument count; `None` means unbounded.
    fn max_args(&self) -> Option<usize> {
        Some(self.min_args())
    }

    /// Volatile functions are re-evaluated on every pass and never cached.
    fn volatile(&self) -> bool {
        false
    }

    fn eval(
        &self,
        args: &[ArgumentHandle],
        ctx: &dyn EvaluationContext,
    ) -> Result<LiteralValue, ExcelError>;
}

/// A LAMBDA value: parameter names, a body expression, and the lexical
/// environment captured where the lambda was written.
#[derive(Debug, Clone)]
pub struct LambdaClosure {
    pub params: Vec<String>,
    pub body: ASTNode,
    pub env: LocalEnv,
}

/// What a local name is bound to.
#[derive(Debug, Clone)]
pub enum LocalBinding {
    Value(LiteralValue),
    Lambda(Rc<LambdaClosure>),
}

/// Persistent chain of name bindings for LET and LAMBDA scopes. Cloning is
/// cheap; `with_binding` shares the tail, so shadowing works naturally and
/// closures keep their defining frame alive.
#[derive(Debug, Clone, Default)]
pub struct LocalEnv(Option<Rc<EnvFrame>>);

#[derive(Debug)]
struct EnvFrame {
    name: String,
    binding: LocalBinding,
    parent: LocalEnv,
}

impl LocalEnv {
    pub fn new() -> Self {
        LocalEnv(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// New environment with one more binding. Names are case-insensitive.
    pub fn with_binding(&self, name: &str, binding: LocalBinding) -> LocalEnv {
        LocalEnv(Some(Rc::new(EnvFrame {
            name: name.to_ascii_uppercase(),
            binding,
            parent: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<&LocalBinding> {
        let upper = name.to_ascii_uppercase();
        let mut frame = self.0.as_deref();
        while let Some(f) = frame {
            if f.name == upper {
                return Some(&f.binding);
            }
            frame = f.parent.0.as_deref();
        }
        None
    }

    pub fn lookup_lambda(&self, name: &str) -> Option<Rc<LambdaClosure>> {
        match self.lookup(name) {
            Some(LocalBinding::Lambda(l)) => Some(Rc::clone(l)),
            _ => None,
        }
    }
}
