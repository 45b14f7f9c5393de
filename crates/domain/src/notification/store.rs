use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{NotificationId, UserId};
use tokio::sync::RwLock;

use super::{Notification, NotificationError};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Stores a notification. Returns `false` without storing when one with
    /// the same `source` is already held.
    async fn save(&self, notification: Notification) -> Result<bool, NotificationError>;

    /// A user's notifications, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, NotificationError>;

    async fn unread_count(&self, user_id: UserId) -> Result<usize, NotificationError>;

    /// Marks a notification read on behalf of its owner.
    async fn mark_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification, NotificationError>;
}

#[async_trait]
impl<S: NotificationStore + ?Sized> NotificationStore for Arc<S> {
    async fn save(&self, notification: Notification) -> Result<bool, NotificationError> {
        (**self).save(notification).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, NotificationError> {
        (**self).list_for_user(user_id).await
    }

    async fn unread_count(&self, user_id: UserId) -> Result<usize, NotificationError> {
        (**self).unread_count(user_id).await
    }

    async fn mark_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification, NotificationError> {
        (**self).mark_read(notification_id, user_id).await
    }
}

#[derive(Default)]
struct Inbox {
    notifications: HashMap<NotificationId, Notification>,
    sources: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    inbox: Arc<RwLock<Inbox>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn save(&self, notification: Notification) -> Result<bool, NotificationError> {
        let mut inbox = self.inbox.write().await;
        if let Some(source) = &notification.source {
            if !inbox.sources.insert(source.clone()) {
                return Ok(false);
            }
        }
        inbox.notifications.insert(notification.id, notification);
        Ok(true)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, NotificationError> {
        let inbox = self.inbox.read().await;
        let mut found: Vec<Notification> = inbox
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn unread_count(&self, user_id: UserId) -> Result<usize, NotificationError> {
        Ok(self
            .inbox
            .read()
            .await
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.read)
            .count())
    }

    async fn mark_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification, NotificationError> {
        let mut inbox = self.inbox.write().await;
        let notification = inbox
            .notifications
            .get_mut(&notification_id)
            .ok_or(NotificationError::NotFound(notification_id))?;
        if notification.user_id != user_id {
            return Err(NotificationError::Forbidden {
                notification_id,
                user_id,
            });
        }
        notification.read = true;
        Ok(notification.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationKind;

    #[tokio::test]
    async fn mark_read_is_owner_only_and_updates_unread_count() {
        let store = InMemoryNotificationStore::new();
        let owner = UserId::new();
        let first = Notification::new(owner, NotificationKind::Info, "a", "first");
        let second = Notification::new(owner, NotificationKind::Success, "b", "second");
        let first_id = first.id;
        store.save(first).await.unwrap();
        store.save(second).await.unwrap();
        store
            .save(Notification::new(UserId::new(), NotificationKind::Info, "c", "other"))
            .await
            .unwrap();

        assert_eq!(store.list_for_user(owner).await.unwrap().len(), 2);
        assert_eq!(store.unread_count(owner).await.unwrap(), 2);

        assert!(matches!(
            store.mark_read(first_id, UserId::new()).await,
            Err(NotificationError::Forbidden { .. })
        ));
        let read = store.mark_read(first_id, owner).await.unwrap();
        assert!(read.read);
        assert_eq!(store.unread_count(owner).await.unwrap(), 1);

        assert!(matches!(
            store.mark_read(NotificationId::new(), owner).await,
            Err(NotificationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn same_source_is_stored_once() {
        let store = InMemoryNotificationStore::new();
        let owner = UserId::new();
        let first = Notification::new(owner, NotificationKind::Info, "a", "x").with_source("k-1");
        let again = Notification::new(owner, NotificationKind::Info, "a", "x").with_source("k-1");

        assert!(store.save(first).await.unwrap());
        assert!(!store.save(again).await.unwrap());
        assert!(
            store
                .save(Notification::new(owner, NotificationKind::Info, "b", "y"))
                .await
                .unwrap()
        );
        assert_eq!(store.list_for_user(owner).await.unwrap().len(), 2);
    }
}
