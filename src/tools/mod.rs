pub mod executor;
pub mod human_help;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use human_help::{HumanHelpTool, HUMAN_HELP};
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
