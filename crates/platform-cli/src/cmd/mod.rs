pub mod analyze;
pub mod check_proposal;
pub mod config;
pub mod mcp;
