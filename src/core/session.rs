use std::sync::RwLock;

use uuid::Uuid;

/// Identity shared by every component of one running process.
///
/// Constructed once at startup and handed out by `Arc`. The session id never
/// changes; the user id may be attached later once the host knows it.
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    user_id: RwLock<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: RwLock::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<String> {
        match self.user_id.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::debug!(%user_id, "session user id attached");
        match self.user_id.write() {
            Ok(mut guard) => *guard = Some(user_id),
            Err(poisoned) => *poisoned.into_inner() = Some(user_id),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_session_gets_a_fresh_uuid() {
        let a = SessionContext::new();
        let b = SessionContext::new();
        assert_eq!(a.session_id().len(), 36);
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn user_id_can_be_attached_after_start() {
        let session = SessionContext::with_id("fixed");
        assert_eq!(session.user_id(), None);
        session.set_user_id("user-7");
        assert_eq!(session.user_id().as_deref(), Some("user-7"));
        assert_eq!(session.session_id(), "fixed");
    }
}
