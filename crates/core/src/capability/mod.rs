//! Capability registry: which format pairs are satisfiable, and by whom.

mod registry;
mod types;

pub use registry::{CapabilityError, CapabilityRegistry};
pub use types::{BackendKind, CapabilityEdge, Format, FormatCategory, OptionKey};
