mod store;

pub use store::{SharedStore, UsageSnapshot, UsageStore};
