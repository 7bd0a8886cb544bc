use echomind_core::ConversationId;

/// Reuse a client-supplied conversation id verbatim or mint a fresh one.
///
/// A blank supplied id counts as absent.
pub fn resolve(supplied: Option<&str>) -> ConversationId {
    match supplied {
        Some(id) if !id.trim().is_empty() => ConversationId::from_raw(id),
        _ => ConversationId::new(),
    }
}
