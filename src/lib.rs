pub mod error;
pub mod filter;
pub mod lookup;
pub mod path;
pub mod pipeline;
pub mod project;
pub mod registry;
pub mod schema;

pub use error::{Error, Result};
pub use filter::{MatchOptions, match_stage, sanitize_filter};
pub use lookup::{LookupField, LookupOptions, LookupSpec, lookup_stages};
pub use pipeline::{PipelineOptions, PipelineSpec, auto_pipeline, group_stage, sort_stage};
pub use project::{PopulateField, PopulateOptions, PopulateSpec, ProjectOptions, project_stage};
pub use registry::SchemaRegistry;
pub use schema::{FieldDescriptor, FieldType, Fields, IndexSpec, Schema};

/// Hard ceiling on lookup/populate nesting. Specification trees are
/// caller-bounded, but a cyclic spec would otherwise recurse until the
/// stack overflows.
pub const MAX_SPEC_DEPTH: usize = 16;
