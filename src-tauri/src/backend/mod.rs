pub mod locator;
pub mod stale;
pub mod supervisor;

pub use locator::{default_interpreter, locate, BackendLayout, LaunchPlan};
pub use supervisor::BackendSupervisor;
