use crate::function::Function;
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub mod datetime;
pub mod financial;
pub mod lambda;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod stats;
pub mod text;

macro_rules! register {
    ($map:expr, $($func:expr),+ $(,)?) => {{
        $(
            let f: std::sync::Arc<dyn $crate::function::Function> = std::sync::Arc::new($func);
            $map.insert(f.name(), f);
        )+
    }};
}
pub(crate) use register;

pub fn register_all(map: &mut FxHashMap<&'static str, Arc<dyn Function>>) {
    logical::register_builtins(map);
    math::register_builtins(map);
    text::register_builtins(map);
    datetime::register_builtins(map);
    financial::register_builtins(map);
    stats::register_builtins(map);
    lookup::register_builtins(map);
    lambda::register_builtins(map);
}
