pub mod setup_link;

pub use setup_link::{LinkState, SetupLink};
