//! Source adapter for the channel directory site: paginated HTML listings of
//! a channel's posts, plus category pages used to discover channels.

mod adapter;
mod category;
mod client;
pub mod parse;

pub use adapter::{
    DirectoryAdapter, DiscardPages, PageKind, PageSink, ScanError, SETTLE_WINDOW_HOURS,
};
pub use category::discover_category;
pub use client::{ChannelPage, DirectoryClient, DirectoryClientOptions, LoadMoreResponse};
pub use parse::LoadMoreCursor;
