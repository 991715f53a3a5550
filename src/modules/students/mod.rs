pub mod models;
pub mod services;

pub use models::Student;
pub use services::{MatricNumberFormat, PrefixedSequence};
