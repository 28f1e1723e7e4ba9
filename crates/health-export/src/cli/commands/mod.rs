pub mod activity;
pub mod data;
pub mod import;
pub mod summary;

pub use activity::run as activity;
pub use data::{metrics, reset};
pub use import::run as import;
pub use summary::{run as summary, SummaryArgs};
