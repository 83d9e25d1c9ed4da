//! Command types sent from API handlers to the skill loop.
//!
//! Each command carries a oneshot reply channel so the handler can
//! await the result and translate it into an HTTP response.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::types::SiteId;

/// Commands from the API to the skill.
#[derive(Debug)]
pub enum SkillCommand {
    /// Stop a ringing site without starting a dialogue.
    ///
    /// Replies whether the site was ringing.
    StopRinging {
        site_id: SiteId,
        reply: oneshot::Sender<Result<bool>>,
    },
}
