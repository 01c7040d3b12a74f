#![forbid(unsafe_code)]

//! Incremental sync of a YouTube channel's public data (channel info, videos,
//! comments, transcriptions, live chat and superchats) into a local document
//! store.

pub mod config;
pub mod model;
pub mod platform;
pub mod store;
pub mod subtitles;
pub mod sync;
pub mod watermark;

#[cfg(test)]
mod testing;
