use std::sync::Arc;

use crate::api::User;
use crate::auth::{SessionManager, SessionPhase};
use crate::constants::{HOME_ROUTE, LOGIN_ROUTE, SESSION_EXPIRED_MESSAGE};

/// Outcome of asking whether a view may render
#[derive(Debug, Clone, PartialEq)]
pub enum ViewAccess {
    /// The session is still bootstrapping; show a placeholder
    Loading,
    Granted(User),
    Redirect {
        to: &'static str,
        message: Option<String>,
    },
}

/// Gate for views that need, or must not have, a signed-in viewer
#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<SessionManager>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Access check for a protected view
    pub fn check(&self) -> ViewAccess {
        let session = self.session.snapshot();
        match (session.phase, session.user) {
            (SessionPhase::Bootstrapping, _) => ViewAccess::Loading,
            (SessionPhase::Authenticated, Some(user)) => ViewAccess::Granted(user),
            _ => ViewAccess::Redirect {
                to: LOGIN_ROUTE,
                message: session
                    .expired
                    .then(|| SESSION_EXPIRED_MESSAGE.to_string()),
            },
        }
    }

    /// Access check for the login and signup views: a signed-in viewer is
    /// sent home. Returns `None` when the view may render.
    pub fn check_public(&self) -> Option<ViewAccess> {
        match self.session.phase() {
            SessionPhase::Bootstrapping => Some(ViewAccess::Loading),
            SessionPhase::Authenticated => Some(ViewAccess::Redirect {
                to: HOME_ROUTE,
                message: None,
            }),
            SessionPhase::Anonymous => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockGateway;
    use crate::auth::{token_expiring_at, ManualClock, MemorySessionStore, SessionStore};
    use crate::constants::{STORE_TOKEN_KEY, STORE_USER_KEY};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    fn ada() -> User {
        User {
            id: 1,
            username: "ada".to_string(),
            display_name: None,
            bio: None,
            profile_photo_url: None,
            created_at: None,
        }
    }

    fn manager(token_exp: Option<i64>) -> Arc<SessionManager> {
        let store = Arc::new(MemorySessionStore::new());
        if let Some(exp) = token_exp {
            store.set(STORE_TOKEN_KEY, &token_expiring_at(exp)).unwrap();
            store
                .set(STORE_USER_KEY, &serde_json::to_string(&ada()).unwrap())
                .unwrap();
        }
        Arc::new(SessionManager::new(
            Arc::new(MockGateway::new()),
            store,
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn test_waits_for_bootstrap() {
        let session = manager(Some(NOW + 60));
        let guard = RouteGuard::new(session.clone());
        assert_eq!(guard.check(), ViewAccess::Loading);
        assert_eq!(guard.check_public(), Some(ViewAccess::Loading));

        session.bootstrap();
        assert_eq!(guard.check(), ViewAccess::Granted(ada()));
        assert_eq!(
            guard.check_public(),
            Some(ViewAccess::Redirect { to: "/", message: None })
        );
    }

    #[test]
    fn test_anonymous_is_redirected_to_login() {
        let session = manager(None);
        session.bootstrap();
        let guard = RouteGuard::new(session);

        assert_eq!(
            guard.check(),
            ViewAccess::Redirect { to: "/login", message: None }
        );
        assert_eq!(guard.check_public(), None);
    }

    #[test]
    fn test_expired_session_redirect_explains_why() {
        let session = manager(Some(NOW - 1));
        session.bootstrap();

        assert_eq!(
            RouteGuard::new(session).check(),
            ViewAccess::Redirect {
                to: "/login",
                message: Some(SESSION_EXPIRED_MESSAGE.to_string()),
            }
        );
    }
}
