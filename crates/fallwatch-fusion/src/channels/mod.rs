//! Concrete notification channel adapters.

pub mod chat;
pub mod telephony;

pub use chat::{ChatChannel, ChatConfig};
pub use telephony::{TelephonyChannel, TelephonyConfig};
