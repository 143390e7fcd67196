//! Entity definitions and the macro that generates them

pub mod business;
pub mod macros;

pub use business::{Budget, Client, Setting, User};
