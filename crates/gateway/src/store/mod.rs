//! Persistence seams used by the turn pipeline and the chat API.
//!
//! Every store is an `async_trait` object so deployments can swap in a
//! database-backed implementation. The in-memory implementations here
//! back the default binary and the test suite.

pub mod billing;
pub mod chats;
pub mod messages;

pub use billing::{BillingStore, InMemoryBillingStore};
pub use chats::{ChatStore, InMemoryChatStore};
pub use messages::{InMemoryMessageStore, MessageStore};
