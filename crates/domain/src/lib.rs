//! `asp-domain` - types shared by every Aspendos crate: the error enum,
//! streaming events, conversation messages, chat and billing records,
//! configuration, and structured trace events.

pub mod billing;
pub mod chat;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod trace;
