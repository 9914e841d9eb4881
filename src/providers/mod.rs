//! Read-only resource roots shipped with, or checked out next to, the crate.

pub mod packaged;
pub mod vendored;

pub use packaged::PackagedResources;
pub use vendored::VendoredResources;
