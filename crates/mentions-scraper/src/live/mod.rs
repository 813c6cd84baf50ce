//! Source adapter for channels read through a logged-in messaging session.

mod adapter;
mod bridge;
mod client;
mod links;
mod preview;

pub use adapter::{ExtractionMode, LiveAdapter};
pub use bridge::{BridgeClient, BridgeConnector};
pub use client::{
    ClientConnector, Dialog, DialogKind, LinkAnnotation, Message, MessagingClient, RemoteChannel,
};
pub use links::{is_review, ChannelLinkExtractor, REVIEW_MARKER};
pub use preview::{parse_preview, ChannelPreview, ChannelPreviewer};
