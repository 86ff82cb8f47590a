pub mod clock;
pub mod config;
pub mod error;
pub mod language;
pub mod types;

// Keep the public surface small and intentional.
pub use clock::*;
pub use config::*;
pub use error::*;
pub use language::*;
pub use types::*;
