//! Rule-based emergency triage
//!
//! The deterministic core of the assistant: a keyword classifier over a
//! closed category set, a regex detail extractor, a static protocol
//! library, and the report renderer that assembles the final guidance
//! block. The assistant falls back to this path whenever the model is
//! unavailable or misses its deadline.
//!
//! ```text
//!              ┌──> classify ────────> EmergencyCategory ──> protocol
//! user input ──┤                                                 │
//!              └──> extract_details ──> SituationDetails ──┐     │
//!                                                          ▼     ▼
//!                                                       render_report
//! ```
//!
//! # Example
//!
//! ```ignore
//! use era::triage::{classify, extract_details, render_report};
//!
//! let input = "Wildfire approaching town in 2 hours, 500 residents need evacuation";
//! let category = classify(input);
//! let details = extract_details(input);
//! let report = render_report(category, &details, None);
//! println!("{}", report);
//! ```

pub mod classifier;
pub mod details;
pub mod protocols;
pub mod report;

pub use classifier::{classify, EmergencyCategory};
pub use details::{extract_details, SituationDetails};
pub use protocols::{protocol, Protocol};
pub use report::render_report;
