// Domain layer: core models, ports (interfaces) and the result normalization table.

pub mod model;
pub mod ports;
pub mod result_rules;
