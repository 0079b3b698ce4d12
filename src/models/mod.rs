pub mod item;
pub mod analysis;
pub mod document;

pub use item::*;
pub use analysis::*;
pub use document::*;
