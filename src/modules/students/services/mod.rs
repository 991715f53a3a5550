pub mod matric;

pub use matric::{MatricNumberFormat, PrefixedSequence};
