//! LSP proxy between an editor and a Go language server.
//!
//! The editor talks about `.templ` documents; the wrapped server only ever
//! sees the generated `_templ.go` files. Positions cross between the two
//! through each document's source map.

pub mod capabilities;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod documents;
pub mod error;
pub mod message;
mod proxy;
pub mod rewrite;
pub mod server;
pub mod uri;

pub use config::ProxyConfig;
pub use diagnostics::NoMansLandPolicy;
pub use error::{ProcessError, ProtocolError};
pub use proxy::run;
pub use server::{Launcher, ProcessLauncher, Transport};
