pub mod config;
pub mod document;
pub mod headers;
pub mod link;
pub mod outbound;
pub mod protocol;
pub mod stream;
pub mod subscription;
pub mod version;

pub use document::{DocumentCodec, DocumentError};
pub use link::{ClientOverrides, ForceTls, LinkError, LinkOptions, generate_link, parse_link};
pub use outbound::Outbound;
pub use protocol::{Protocol, ProtocolSettings};
pub use stream::{Network, Security, StreamSettings};
