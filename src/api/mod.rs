//! Host-facing entry points
//!
//! [`TransferService`] is what an embedding application talks to: it starts
//! and stops jobs by id and hands every event to the injected
//! [`EventSink`](crate::events::EventSink).

mod service;

pub use service::TransferService;
