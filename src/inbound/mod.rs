//! Inbound mail from the Internet.
//!
//! Foreign mail reaches consoles two ways: raw RFC 822 objects dropped into
//! an object store (a drop directory or an S3 bucket) and swept by [`InboundPipeline`], or webhook posts from a
//! mail service. Both end in [`Ingestor::deliver`].

mod parse;
mod pipeline;
mod s3;
mod store;

pub use parse::{
    parse_address, parse_message, sanitize_header, sanitize_text, InboundMail, IngestError,
};
pub use pipeline::{
    InboundPipeline, Ingestor, SweepReport, DEFAULT_SWEEP_INTERVAL_SECS,
};
pub use s3::S3Store;
pub use store::{list_all, DirectoryStore, ObjectPage, ObjectStore};
