pub mod alerts;
pub mod calculations;
pub mod guidance;
pub mod protocols;

pub use alerts::{generate_alerts, summarize_severity};
pub use calculations::{calculate_all, CalculatedValues};
pub use guidance::{build_guidance, ClinicalGuidance};
pub use protocols::activated_protocols;
