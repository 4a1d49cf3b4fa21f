//! Collaborator traits: the seams between the core and the outside world.

pub mod push;
pub mod source;
pub mod store;
pub mod stream;
pub mod users;

pub use push::PushTransport;
pub use source::ReadingSource;
pub use store::TimeSeriesStore;
pub use stream::NotificationStream;
pub use users::UserStore;
