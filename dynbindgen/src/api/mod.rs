pub(crate) mod bindings;
pub(crate) mod builder;
pub(crate) mod config;
