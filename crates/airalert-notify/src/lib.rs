//! # Air Alert Notify
//!
//! Drains the notification stream with a fixed worker pool.
//!
//! ```text
//! worker (random consumer name) ──► read_one(group, 200ms)
//!    ├── nothing ──► check stop signal ──► poll again
//!    └── message ──► user lookup ──► push ──► 2xx ──► acknowledge
//!                                        └─ other ──► left pending (redelivered)
//! shutdown(): one stop signal per worker, each answered on a oneshot
//! ```
//!
//! Push requests are signed with the application's VAPID key and the payload
//! is encrypted for the subscription (`aes128gcm`).

pub mod dispatcher;
pub mod ece;
pub mod push;
pub mod text;
pub mod vapid;

pub use dispatcher::{DispatchStats, NotificationDispatcher};
pub use push::HttpPushTransport;
pub use text::notification_text;
pub use vapid::VapidKeys;
