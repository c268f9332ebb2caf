pub mod conversation;
pub mod project;
pub mod routing;
pub mod spend;
pub mod tool;
