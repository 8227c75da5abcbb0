pub mod lock_entry;
pub mod preference;

pub use lock_entry::{EntryId, LockEntry};
pub use preference::Preference;
