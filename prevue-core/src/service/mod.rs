pub mod broadcaster;
pub mod clock;
pub mod crypto;
pub mod library_index;
pub mod library_sync;
pub mod lineup;
pub mod materializer;
pub mod presets;
pub mod scheduler;
pub mod sessions;
pub mod settings;
pub mod tuner;

pub use broadcaster::{Broadcaster, Envelope};
pub use crypto::TokenCipher;
pub use library_index::{LibraryIndex, LibrarySnapshot};
pub use library_sync::LibrarySync;
pub use lineup::LineupService;
pub use scheduler::{GlobalTracker, Scheduler};
pub use sessions::{ActiveSession, SessionRegistry, SessionTerminator};
pub use settings::SettingsService;
pub use tuner::{TuneResolver, TuneResult};
