//! Byte-level I/O for the CatBoost binary container.
//!
//! The container is only an envelope: a 4-byte magic tag followed by
//! length-prefixed segments. Interpreting segment contents is left to
//! [`crate::cbm`].

pub mod container;

pub use container::{ContainerReader, ContainerWriter, Segments, LENGTH_ESCAPE, MAGIC};
