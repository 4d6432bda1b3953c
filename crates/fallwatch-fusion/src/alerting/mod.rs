//! Alert dispatch: persistence, message composition, channel fan-out.

pub mod channel;
pub mod dispatcher;
pub mod message;

pub use channel::{
    send_image_with_retry, send_text_with_retry, NotificationChannel, RetryPolicy, SendOutcome,
};
pub use dispatcher::{AlertDispatcher, DispatcherConfig};
