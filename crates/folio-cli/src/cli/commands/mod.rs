pub mod dispatch;
pub mod ls;
pub mod run;

pub use dispatch::dispatch;
