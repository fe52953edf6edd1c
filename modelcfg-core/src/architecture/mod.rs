//! Model architecture: the block parameter schema and the ordered layer builder.

pub mod builder;
pub mod schema;

pub use builder::{
    layers_equivalent, values_equivalent, ArchitectureBuilder, BuilderError, LayerNode,
};
pub use schema::{
    block_library, schema_for, BlockSchema, ParamDefault, ParamSpec, PARAMETER_SCHEMAS,
};
