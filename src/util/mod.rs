// Shared filesystem and system helpers

pub mod fs;
pub mod sys;
