//! Consumer-group bookkeeping: membership, partition ownership, committed
//! offsets and in-flight leases.

use std::collections::{BTreeSet, HashMap};

use tokio::time::{Duration, Instant};

use crate::{Message, Offset};

/// A message handed to a group member and not yet acknowledged.
#[derive(Debug, Clone)]
pub(crate) struct Lease {
    pub offset: Offset,
    pub member: String,
    pub deadline: Instant,
    pub attempt: u32,
}

/// Read position of a group on one partition.
///
/// At most one lease exists per partition, which is what keeps messages of
/// one key flowing to consumers strictly in publish order.
#[derive(Debug, Clone, Default)]
pub(crate) struct PartitionCursor {
    pub committed: Offset,
    pub lease: Option<Lease>,
}

/// Outcome of acknowledging a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The lease matched and the partition moved past the message.
    Committed,
    /// The offset was already committed; a redelivered duplicate was acked.
    AlreadyCommitted,
    /// No lease covers this offset any more.
    Stale,
}

/// A lease selected for delivery by [`ConsumerGroup::claim`].
#[derive(Debug, Clone)]
pub(crate) struct Claim {
    pub partition: u32,
    pub offset: Offset,
    pub attempt: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ConsumerGroup {
    members: BTreeSet<String>,
    cursors: HashMap<String, Vec<PartitionCursor>>,
}

impl ConsumerGroup {
    pub fn join(&mut self, member: &str) -> bool {
        self.members.insert(member.to_string())
    }

    /// Removes a member and expires every lease it holds, so its
    /// unacknowledged messages go to the new owners on their next poll.
    pub fn leave(&mut self, member: &str, now: Instant) -> bool {
        let removed = self.members.remove(member);
        for partitions in self.cursors.values_mut() {
            for cursor in partitions.iter_mut() {
                if let Some(lease) = cursor.lease.as_mut()
                    && lease.member == member
                {
                    lease.deadline = now;
                }
            }
        }
        removed
    }

    pub fn is_member(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    pub fn members(&self) -> impl Iterator<Item = &String> {
        self.members.iter()
    }

    /// Returns the member owning `partition`, assigning partitions
    /// round-robin over the sorted member list.
    pub fn owner(&self, partition: u32) -> Option<&String> {
        if self.members.is_empty() {
            return None;
        }
        let index = partition as usize % self.members.len();
        self.members.iter().nth(index)
    }

    /// Partitions of a topic currently owned by `member`.
    pub fn assigned(&self, member: &str, partitions: u32) -> Vec<u32> {
        (0..partitions)
            .filter(|p| self.owner(*p).is_some_and(|m| m == member))
            .collect()
    }

    fn cursors_for(&mut self, topic: &str, partitions: usize) -> &mut Vec<PartitionCursor> {
        let cursors = self.cursors.entry(topic.to_string()).or_default();
        if cursors.len() < partitions {
            cursors.resize_with(partitions, PartitionCursor::default);
        }
        cursors
    }

    /// Leases up to `max` messages of `topic` to `member`.
    ///
    /// Expired leases on owned partitions are redelivered before new
    /// messages. Returns the claims and the earliest deadline among leases
    /// still outstanding on the member's partitions, which tells a waiting
    /// poller when a redelivery could become due.
    pub fn claim(
        &mut self,
        topic: &str,
        member: &str,
        log: &[Vec<Message>],
        now: Instant,
        redelivery_timeout: Duration,
        max: usize,
    ) -> (Vec<Claim>, Option<Instant>) {
        let owned = self.assigned(member, log.len() as u32);
        let cursors = self.cursors_for(topic, log.len());

        let mut claims = Vec::new();
        let mut next_deadline: Option<Instant> = None;

        for partition in owned {
            if claims.len() >= max {
                break;
            }
            let cursor = &mut cursors[partition as usize];
            let messages = &log[partition as usize];

            match cursor.lease.as_mut() {
                Some(lease) if lease.deadline <= now => {
                    lease.member = member.to_string();
                    lease.deadline = now + redelivery_timeout;
                    lease.attempt += 1;
                    claims.push(Claim {
                        partition,
                        offset: lease.offset,
                        attempt: lease.attempt,
                    });
                }
                Some(lease) => {
                    next_deadline = Some(match next_deadline {
                        Some(d) => d.min(lease.deadline),
                        None => lease.deadline,
                    });
                }
                None => {
                    let next = cursor.committed;
                    if (next.as_u64() as usize) < messages.len() {
                        cursor.lease = Some(Lease {
                            offset: next,
                            member: member.to_string(),
                            deadline: now + redelivery_timeout,
                            attempt: 1,
                        });
                        claims.push(Claim {
                            partition,
                            offset: next,
                            attempt: 1,
                        });
                    }
                }
            }
        }

        (claims, next_deadline)
    }

    pub fn ack(&mut self, topic: &str, partition: u32, offset: Offset) -> AckOutcome {
        let Some(cursor) = self
            .cursors
            .get_mut(topic)
            .and_then(|c| c.get_mut(partition as usize))
        else {
            return AckOutcome::Stale;
        };

        if offset < cursor.committed {
            return AckOutcome::AlreadyCommitted;
        }
        match cursor.lease.as_ref() {
            Some(lease) if lease.offset == offset => {
                cursor.committed = offset.next();
                cursor.lease = None;
                AckOutcome::Committed
            }
            _ => AckOutcome::Stale,
        }
    }

    /// Committed offset of a partition, for lag inspection.
    pub fn committed(&self, topic: &str, partition: u32) -> Offset {
        self.cursors
            .get(topic)
            .and_then(|c| c.get(partition as usize))
            .map(|c| c.committed)
            .unwrap_or_default()
    }
}
