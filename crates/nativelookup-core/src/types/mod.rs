//! # Types
//!
//! Platform-agnostic types used throughout the lookup engine.
//!
//! These types abstract away platform-specific details, allowing the engine
//! to work with concepts like "module" and "build signature" without knowing
//! whether the host is Windows, Linux, or macOS.

pub mod address;
pub mod module;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use module::{BuildSignature, ModuleIdentity, ModuleInfo, ModuleKey};
pub use symbols::SymbolKind;
