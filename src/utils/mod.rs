pub mod fs_atomic;
pub mod paths;
pub mod template;
pub mod url;
