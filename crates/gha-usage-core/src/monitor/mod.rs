mod refresher;

pub use refresher::{RefresherHandle, UsageRefresher};
