pub mod bundle;
pub mod enums;
pub mod extraction;

pub use bundle::*;
pub use enums::*;
pub use extraction::*;
