//! Shared code for the procbox host library, service, and tooling.
//!
//! This crate contains the wire protocol, the error taxonomy, the role
//! table used for certificate-derived authorization, and the TLS material
//! handling shared by the server and client binaries.

pub mod certs;
pub mod errors;
pub mod roles;
pub mod tls;

// Generated protobuf types
pub mod generated {
    #![allow(clippy::all, unused_qualifications)]
    tonic::include_proto!("procbox.v1");
}

pub use errors::{SandboxError, SandboxResult};

// Command service
pub use generated::command_service_client::CommandServiceClient;
pub use generated::command_service_server::{CommandService, CommandServiceServer};

// All generated types
pub use generated::*;
