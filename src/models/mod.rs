pub mod alert;
pub mod draft;
pub mod enums;
pub mod form;
pub mod lenient;
pub mod phase;

pub use alert::*;
pub use draft::*;
pub use form::*;
pub use phase::{PhaseDescriptor, PhaseNavigator, PHASES};
