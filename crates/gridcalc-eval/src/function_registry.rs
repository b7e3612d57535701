use crate::function::Function;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The built-in function table. Built once at first use and never mutated;
/// contexts that need extra functions layer them via `FunctionProvider`.
static REGISTRY: Lazy<FxHashMap<&'static str, Arc<dyn Function>>> = Lazy::new(|| {
    let mut map: FxHashMap<&'static str, Arc<dyn Function>> = FxHashMap::default();
    crate::builtins::register_all(&mut map);
    map
});

pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    REGISTRY.get(name.to_ascii_uppercase().as_str()).cloned()
}

pub fn names() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = REGISTRY.keys().copied().collect();
    out.sort_unstable();
    out
}
