pub mod claim;
pub mod hide;
pub mod initialize;
pub mod update_vault;
pub mod whitelist_token;

pub use claim::*;
pub use hide::*;
pub use initialize::*;
pub use update_vault::*;
pub use whitelist_token::*;
