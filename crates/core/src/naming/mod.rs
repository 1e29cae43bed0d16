//! Output naming: template expansion and collision-safe destinations.

mod resolver;
mod template;

pub use resolver::{page_destination, DestinationResolver, NamingError, OutputLayout, MAX_DISAMBIGUATOR};
pub use template::{expand_pattern, OutputTemplate, TemplateContext};
