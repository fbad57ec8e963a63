pub mod error;
pub mod handle;
pub mod id;
pub mod lock;
pub mod manager;
pub mod metadata;
pub mod persistence;

#[cfg(test)]
mod tests;

pub use error::*;
pub use handle::*;
pub use id::*;
pub use lock::*;
pub use manager::*;
pub use metadata::*;
pub use persistence::*;
