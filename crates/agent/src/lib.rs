//! Turn orchestration for filachat.
//!
//! A turn is at most two completion requests:
//!
//! 1. **Phase 1**: preamble, session context and transcript go out with the
//!    tool catalog attached
//! 2. **Tools**: each proposed call is corrected, dispatched and its result
//!    folded back into the session
//! 3. **Phase 2**: the model writes the final reply from the tool results
//!
//! The reply is sanitized before it leaves the crate.

pub mod extract;
pub mod guard;
pub mod orchestrator;

pub use extract::{Attribute, AttributeExtractor, ExtractorChain};
pub use guard::{ArgumentCorrector, Correction, Sanitizer};
pub use orchestrator::{EMPTY_REPLY, HealthReport, Orchestrator, Reply};
