pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Backend, Health, Init, Router, Version};
