//! Service layer API for friendship workflow operations.

use std::sync::Arc;
use tracing::debug;

use crate::error::EngineError;
use crate::reconcile::{self, PreparedWrite, RetryPolicy};
use crate::store::UserStore;
use crate::user::{PendingFriendRequest, User};

pub struct FriendshipService {
    store: Arc<UserStore>,
    policy: RetryPolicy,
}

impl FriendshipService {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<UserStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Opens a pending friend request from `sender_id` to `receiver_id`.
    ///
    /// The request record lands on both aggregates so either side can list
    /// it without a join. At most one request may be active per unordered
    /// pair; a prior request in the opposite direction counts as the same
    /// pair and is reported as `DuplicateRequest`.
    pub fn send_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<PendingFriendRequest, EngineError> {
        if sender_id == receiver_id {
            return Err(EngineError::InvalidTarget(
                "cannot send a friend request to yourself".into(),
            ));
        }

        reconcile::with_retry(&self.policy, || {
            let sender = self.store.require(sender_id)?;
            let receiver = self.store.require(receiver_id)?;

            if sender.value.is_friend(receiver_id) || receiver.value.is_friend(sender_id) {
                return Err(EngineError::AlreadyFriends(
                    sender_id.to_owned(),
                    receiver_id.to_owned(),
                ));
            }
            // the receiver's copy is authoritative for the pair check, but a
            // half-delivered request on the sender's side counts too
            if receiver.value.pending_with(sender_id, receiver_id).is_some()
                || sender.value.pending_with(sender_id, receiver_id).is_some()
            {
                return Err(EngineError::DuplicateRequest(
                    sender_id.to_owned(),
                    receiver_id.to_owned(),
                ));
            }

            let request = PendingFriendRequest::new(sender_id, receiver_id);

            let mut next_sender = sender.value.clone();
            next_sender.pending_friends.push(request.clone());
            let mut next_receiver = receiver.value.clone();
            next_receiver.pending_friends.push(request.clone());

            reconcile::commit_pair(
                &self.store,
                PreparedWrite::new(next_sender, sender.version, sender.value.clone()),
                PreparedWrite::new(next_receiver, receiver.version, receiver.value.clone()),
            )?;

            debug!(request_id = %request.request_id, %sender_id, %receiver_id, "friend request sent");
            Ok(request)
        })
    }

    /// Accepts the pending request sent by `counterpart_id`. Only the
    /// receiving side may accept; the sender should not be the one
    /// accepting. Removes the request from both aggregates and links both
    /// friend sets in one logical unit. Returns the updated pair
    /// `(current, counterpart)`.
    pub fn accept(
        &self,
        current_user_id: &str,
        counterpart_id: &str,
    ) -> Result<(User, User), EngineError> {
        self.resolve(current_user_id, counterpart_id, true)
    }

    /// Declines the pending request sent by `counterpart_id`. Symmetric to
    /// [`accept`](Self::accept) but creates no friendship.
    pub fn decline(
        &self,
        current_user_id: &str,
        counterpart_id: &str,
    ) -> Result<(User, User), EngineError> {
        self.resolve(current_user_id, counterpart_id, false)
    }

    fn resolve(
        &self,
        current_user_id: &str,
        counterpart_id: &str,
        befriend: bool,
    ) -> Result<(User, User), EngineError> {
        if current_user_id == counterpart_id {
            return Err(EngineError::InvalidTarget(
                "cannot resolve a friend request with yourself".into(),
            ));
        }

        reconcile::with_retry(&self.policy, || {
            let current = self.store.require(current_user_id)?;
            let counterpart = self.store.require(counterpart_id)?;

            let request = match current.value.pending_with(current_user_id, counterpart_id) {
                Some(request) => request,
                // also the double-resolve case: the record is already gone
                None => {
                    return Err(EngineError::RequestNotFound {
                        current: current_user_id.to_owned(),
                        counterpart: counterpart_id.to_owned(),
                    });
                }
            };
            if request.receiver != current_user_id {
                return Err(EngineError::InvalidTarget(
                    "only the receiving side may resolve a friend request".into(),
                ));
            }
            let request_id = request.request_id.clone();

            let mut next_current = current.value.clone();
            let mut next_counterpart = counterpart.value.clone();
            next_current.remove_pending_with(current_user_id, counterpart_id);
            next_counterpart.remove_pending_with(current_user_id, counterpart_id);
            if befriend {
                next_current.add_friend(counterpart_id);
                next_counterpart.add_friend(current_user_id);
            }

            let updated = reconcile::commit_pair(
                &self.store,
                PreparedWrite::new(next_current, current.version, current.value.clone()),
                PreparedWrite::new(next_counterpart, counterpart.version, counterpart.value.clone()),
            )?;

            debug!(
                %request_id,
                accepted = befriend,
                "friend request resolved"
            );
            Ok(updated)
        })
    }
}
