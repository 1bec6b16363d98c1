// Application layer: the async service every shell talks to. It owns the
// in-memory registry and writes each operation through to storage.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
