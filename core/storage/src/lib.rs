//! Storage layer for StorageKit.
//!
//! Provides the backend capability contract, the built-in backends
//! (in-memory, local filesystem, object stores), the protocol registry,
//! the cached backend resolver and the alias-aware [`StorageClient`].
//!
//! # Design Principles
//! - Backend isolation: alias and config handling never reach a backend
//! - Async operations: all I/O is async and streamed
//! - Shared handles: one backend handle per (protocol, options) pair
//! - Unified error semantics: every backend reports the same error kinds

pub mod backend;
pub mod client;
pub mod file;
pub mod local;
pub mod memory;
pub mod object;
pub mod pattern;
pub mod registry;
pub mod resolver;
pub mod transfer;
pub mod uri;

pub use backend::{Backend, BackendKind, BoxReader, BoxWriter, Metadata, NativeCopy, NativeGlob};
pub use client::{Listing, ResolvedLocation, StorageClient};
pub use file::{OpenMode, StorageFile};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object::ObjectStoreBackend;
pub use registry::{create_default_registry, BackendFactory, BackendRegistry};
pub use resolver::BackendResolver;
pub use transfer::COPY_CHUNK_SIZE;
pub use uri::join;
