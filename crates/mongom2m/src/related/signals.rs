//! The `m2m_changed` signal.
//!
//! Every mutation of a relationship sends a pre and a post notification on
//! [`M2M_CHANGED`], with the synthetic through type's label as sender. A
//! receiver connected with `connect_to(through.label_lower(), ..)` therefore
//! only hears about one relationship.

use std::fmt;
use std::sync::Arc;

use mongom2m_signals::Signal;
use once_cell::sync::Lazy;

use crate::document::{Document, DocumentType};
use crate::related::rel::ManyToManyRel;
use crate::related::through::ThroughType;

/// The kind of change being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum M2MAction {
    /// Targets are about to be added.
    PreAdd,
    /// Targets were added.
    PostAdd,
    /// Targets are about to be removed.
    PreRemove,
    /// Targets were removed.
    PostRemove,
    /// The relationship is about to be emptied.
    PreClear,
    /// The relationship was emptied.
    PostClear,
}

impl M2MAction {
    /// The conventional action name, e.g. `"pre_add"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreAdd => "pre_add",
            Self::PostAdd => "post_add",
            Self::PreRemove => "pre_remove",
            Self::PostRemove => "post_remove",
            Self::PreClear => "pre_clear",
            Self::PostClear => "post_clear",
        }
    }

    /// Whether this is the notification sent before the change.
    pub const fn is_pre(self) -> bool {
        matches!(self, Self::PreAdd | Self::PreRemove | Self::PreClear)
    }
}

impl fmt::Display for M2MAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `m2m_changed` notification.
#[derive(Debug, Clone)]
pub struct M2MChanged {
    /// The through type of the relationship; `None` for abstract hosts.
    pub sender: Option<Arc<ThroughType>>,
    /// A snapshot of the host taken when the notification was sent.
    pub instance: Document,
    /// What is happening.
    pub action: M2MAction,
    /// Always `false`: changes are only made from the host side.
    pub reverse: bool,
    /// The target type.
    pub model: Arc<DocumentType>,
    /// Hex identifiers of the affected targets. For clears, every identifier
    /// held before the clear.
    pub pk_set: Vec<String>,
    /// The database alias of the host's database.
    pub using: String,
}

/// Sent around every `add`, `remove`, and `clear`.
pub static M2M_CHANGED: Lazy<Signal<M2MChanged>> = Lazy::new(Signal::new);

/// Dispatches one notification for `rel`. The payload is only built when
/// somebody listens.
pub(crate) fn send_m2m_changed(
    rel: &ManyToManyRel,
    instance: &Document,
    action: M2MAction,
    pk_set: &[String],
    using: &str,
) {
    let sender = rel.signal_sender();
    if !M2M_CHANGED.has_listeners(&sender) {
        return;
    }
    let payload = M2MChanged {
        sender: rel.through().cloned(),
        instance: instance.clone(),
        action,
        reverse: false,
        model: Arc::clone(rel.target()),
        pk_set: pk_set.to_vec(),
        using: using.to_string(),
    };
    M2M_CHANGED.send(&sender, &payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(M2MAction::PreAdd.as_str(), "pre_add");
        assert_eq!(M2MAction::PostClear.to_string(), "post_clear");
        assert!(M2MAction::PreRemove.is_pre());
        assert!(!M2MAction::PostAdd.is_pre());
    }
}
