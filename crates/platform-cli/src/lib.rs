pub mod cmd;
pub mod output;
pub mod resources;
pub mod root;
pub mod tools;
