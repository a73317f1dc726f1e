//! Request/response transport.
//!
//! One JSON request is read from the inbound channel, dispatched, and
//! exactly one JSON response is written to the outbound channel:
//!
//! ```text
//! -> {"method": "create_stemcell", "arguments": ["/tmp/stemcell.tgz", {}], "context": {...}}
//! <- {"result": "6f1ad5ae-...", "error": null, "log": ""}
//! ```

mod message;
mod server;

pub use message::{ActionRequest, ActionResponse, ErrorEnvelope};
pub use server::{RpcServer, TransportError};
