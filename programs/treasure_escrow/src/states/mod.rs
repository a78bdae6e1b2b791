pub mod events;
pub mod vault;
pub mod whitelist;

pub use events::*;
pub use vault::*;
pub use whitelist::*;
