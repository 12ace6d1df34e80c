pub mod action;
pub mod recipe;

pub use action::*;
pub use recipe::*;
