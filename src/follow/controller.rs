use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ApiError, ApiResult, FollowStats, Gateway, UserId};
use crate::auth::SessionManager;

/// Which way a relationship mutation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Follow,
    Unfollow,
}

impl Direction {
    fn self_message(self) -> &'static str {
        match self {
            Direction::Follow => "You cannot follow yourself",
            Direction::Unfollow => "You cannot unfollow yourself",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Direction::Follow => "Failed to follow user",
            Direction::Unfollow => "Failed to unfollow user",
        }
    }
}

/// The optimistic change that was actually applied, so it can be undone
/// exactly
#[derive(Debug, Clone, Copy)]
struct AppliedDelta {
    direction: Direction,
    /// +1, -1, or 0 when the count was already at a bound
    followers_change: i8,
}

#[derive(Debug, Default)]
struct ControllerState {
    target: Option<UserId>,
    /// Viewer the current stats were fetched for
    viewer: Option<UserId>,
    stats: FollowStats,
    /// Outstanding remote calls
    pending: u32,
    mutation_in_flight: bool,
    error: Option<String>,
    /// Bumped on retarget and detach; results from an older epoch are dropped
    epoch: u64,
    /// Bumped whenever server stats replace the local ones
    stats_version: u64,
    detached: bool,
}

impl ControllerState {
    fn apply(&mut self, direction: Direction) -> AppliedDelta {
        let followers_change = match direction {
            Direction::Follow => {
                self.stats.is_following = true;
                match self.stats.followers_count.checked_add(1) {
                    Some(count) => {
                        self.stats.followers_count = count;
                        1
                    }
                    None => 0,
                }
            }
            Direction::Unfollow => {
                self.stats.is_following = false;
                match self.stats.followers_count.checked_sub(1) {
                    Some(count) => {
                        self.stats.followers_count = count;
                        -1
                    }
                    None => 0,
                }
            }
        };
        AppliedDelta {
            direction,
            followers_change,
        }
    }

    fn revert(&mut self, delta: AppliedDelta) {
        self.stats.is_following = delta.direction == Direction::Unfollow;
        let count = self.stats.followers_count;
        self.stats.followers_count = match delta.followers_change {
            1 => count.saturating_sub(1),
            -1 => count.saturating_add(1),
            _ => count,
        };
    }

    fn finish(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

/// Follow relationship between the current viewer and one target user
///
/// Follow and unfollow are applied locally before the server confirms them
/// and rolled back exactly on failure. Only `refresh_stats` reconciles with
/// the server's counts.
pub struct RelationshipController {
    gateway: Arc<dyn Gateway>,
    session: Arc<SessionManager>,
    state: Mutex<ControllerState>,
}

impl RelationshipController {
    pub fn new(gateway: Arc<dyn Gateway>, session: Arc<SessionManager>) -> Self {
        Self {
            gateway,
            session,
            state: Mutex::new(ControllerState::default()),
        }
    }

    fn viewer_id(&self) -> Option<UserId> {
        self.session.current_user().map(|user| user.id)
    }

    /// Point the controller at `target`, fetching stats when the target or
    /// the viewer changed since the last fetch
    pub async fn bind(&self, target: UserId) -> ApiResult<FollowStats> {
        let viewer = self.viewer_id();
        {
            let mut state = self.state.lock();
            if !state.detached && state.target == Some(target) && state.viewer == viewer {
                return Ok(state.stats);
            }
            if state.target != Some(target) {
                // Another user's counts must not linger
                state.stats = FollowStats::default();
            }
            state.target = Some(target);
            state.viewer = viewer;
            state.epoch += 1;
            state.pending = 0;
            state.mutation_in_flight = false;
            state.error = None;
            state.detached = false;
        }
        self.load_stats("Failed to fetch follow stats").await
    }

    /// Fetch the stats of the bound target
    pub async fn fetch_stats(&self) -> ApiResult<FollowStats> {
        self.load_stats("Failed to fetch follow stats").await
    }

    /// Replace local stats with the server's, e.g. after a profile edit
    pub async fn refresh_stats(&self) -> ApiResult<FollowStats> {
        self.load_stats("Failed to refresh follow stats").await
    }

    async fn load_stats(&self, fallback: &str) -> ApiResult<FollowStats> {
        let (target, epoch) = {
            let mut state = self.state.lock();
            let target = state
                .target
                .ok_or_else(|| ApiError::validation("User ID required", None))?;
            state.pending += 1;
            state.error = None;
            (target, state.epoch)
        };

        let result = self.gateway.follow_stats(target).await;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!(user_id = target, "Discarding stats for a stale binding");
            return result.map_err(|e| e.or_message(fallback));
        }
        state.finish();

        match result {
            Ok(stats) => {
                state.stats = stats;
                state.stats_version += 1;
                Ok(stats)
            }
            Err(err) => {
                self.session.observe_error(&err);
                let err = err.or_message(fallback);
                warn!(user_id = target, error = %err, "Failed to load follow stats");
                state.error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    /// Follow when not following, unfollow otherwise
    pub async fn toggle_follow(&self) -> ApiResult<FollowStats> {
        let following = self.state.lock().stats.is_following;
        if following {
            self.unfollow().await
        } else {
            self.follow().await
        }
    }

    pub async fn follow(&self) -> ApiResult<FollowStats> {
        self.mutate(Direction::Follow).await
    }

    pub async fn unfollow(&self) -> ApiResult<FollowStats> {
        self.mutate(Direction::Unfollow).await
    }

    async fn mutate(&self, direction: Direction) -> ApiResult<FollowStats> {
        let viewer = self.viewer_id();
        let (target, epoch, version, delta) = {
            let mut state = self.state.lock();
            let target = state
                .target
                .ok_or_else(|| ApiError::validation("User ID required", None))?;
            let Some(viewer) = viewer else {
                return Err(ApiError::validation("Please log in to follow users", None));
            };
            if viewer == target {
                return Err(ApiError::validation(direction.self_message(), None));
            }
            if state.mutation_in_flight {
                return Err(ApiError::validation(
                    "A follow request is already in progress",
                    None,
                ));
            }

            state.mutation_in_flight = true;
            state.pending += 1;
            state.error = None;
            let delta = state.apply(direction);
            (target, state.epoch, state.stats_version, delta)
        };

        let result = match direction {
            Direction::Follow => self.gateway.follow(target).await,
            Direction::Unfollow => self.gateway.unfollow(target).await,
        };

        let mut state = self.state.lock();
        if state.epoch != epoch {
            // Rebound or detached meanwhile; the delta belonged to the old view
            debug!(user_id = target, "Discarding relationship result for a stale binding");
            return result
                .map(|_| state.stats)
                .map_err(|e| e.or_message(direction.failure_message()));
        }
        state.finish();
        state.mutation_in_flight = false;

        match result {
            Ok(()) => Ok(state.stats),
            Err(err) => {
                if state.stats_version == version {
                    state.revert(delta);
                } else {
                    // Server counts arrived meanwhile and already exclude the change
                    debug!(user_id = target, "Keeping refreshed stats over the rollback");
                }
                self.session.observe_error(&err);
                let err = err.or_message(direction.failure_message());
                warn!(user_id = target, error = %err, "Relationship change rolled back");
                state.error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    /// Tear the view down; results still in flight are ignored
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.detached = true;
        state.epoch += 1;
        state.pending = 0;
        state.mutation_in_flight = false;
    }

    pub fn stats(&self) -> FollowStats {
        self.state.lock().stats
    }

    pub fn is_following(&self) -> bool {
        self.state.lock().stats.is_following
    }

    pub fn followers_count(&self) -> u64 {
        self.state.lock().stats.followers_count
    }

    pub fn following_count(&self) -> u64 {
        self.state.lock().stats.following_count
    }

    pub fn target(&self) -> Option<UserId> {
        self.state.lock().target
    }

    pub fn loading(&self) -> bool {
        self.state.lock().pending > 0
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    /// Whether the follow affordance should be offered at all
    pub fn can_follow(&self) -> bool {
        let viewer = self.viewer_id();
        match self.state.lock().target {
            Some(target) => viewer.is_some() && viewer != Some(target),
            None => false,
        }
    }
}
