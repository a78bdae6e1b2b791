pub mod decoder;
pub mod models;
pub mod error;
pub mod utils;

pub use decoder::*;
pub use models::*;
pub use error::*;
pub use utils::*;
