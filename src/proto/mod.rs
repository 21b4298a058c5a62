//! Protocol types shared by the server and the client.
//!
//! The configuration payload itself is opaque to the distribution core: any
//! type implementing [`ConfigObject`] can be stored, diffed and streamed.
//! Everything else on the wire (ids, filters, list and error envelopes) is
//! defined here.

mod filter;
mod types;

pub use filter::*;
pub use types::*;
