pub mod builder;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod path;
pub mod traits;

pub mod prelude {
    pub use super::builder::*;
    pub use super::digest::HashAlgorithm;
    pub use super::error::*;
    pub use super::manifest::*;
    pub use super::traits::*;
}
