//! Wire types for the ridematch service.
//!
//! Everything here is plain serde data shared between the server and its
//! clients. Database-facing versions of the status enums live in
//! `ridematch-core::entities`.

#![forbid(unsafe_code)]

pub mod objects;
