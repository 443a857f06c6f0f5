pub mod channel;
pub mod library;
pub mod schedule;
pub mod server;
pub mod settings;

pub use channel::{Channel, ChannelFilter, ChannelKind};
pub use library::{ItemKind, LibraryItem, PersonRef, PersonRole, RatingBucket, UserState};
pub use schedule::{ScheduleBlock, ScheduleProgram};
pub use server::MediaServer;
pub use settings::GlobalFilters;
