//! In-memory reference backend: a client-side object store and a loopback
//! remote execution server with optimistic version checks.

pub mod server;
pub mod store;

pub use server::{
    LoopbackServer, RemoteResult, ServerAction, ServerCall, ServerReturn, StoredObject,
};
pub use store::{MemoryObjectStore, StaticAuthentication};
