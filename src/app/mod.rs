mod controller;
mod dispatch;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use controller::LifecycleController;
pub use types::{Collaborators, ControllerTimings};
