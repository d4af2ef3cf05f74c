use std::fmt::{Display, Formatter};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::internal::common::clock::Expiry;
use crate::internal::common::error::validation_error;
use crate::internal::common::ids::WorkItemId;
use crate::internal::common::utils::{fix_empty_and_trim, format_space_delimited, split_tokens};
use crate::{Map, Result};

/// Token identifying who holds a lock, usually a running build.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LockOwner(String);

impl LockOwner {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockOwner {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProperty {
    pub name: String,
    pub value: String,
}

impl ResourceProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            value: if value.is_empty() {
                " ".to_string()
            } else {
                value
            },
        }
    }
}

/// Provisional claim of a resource by a work item that is still waiting in the queue.
#[derive(Debug, Clone)]
pub struct QueueTicket {
    pub owner: WorkItemId,
    pub project: String,
    pub since: Instant,
}

/// Externally observable state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Free,
    Queued {
        owner: WorkItemId,
        project: String,
        since: Instant,
    },
    Reserved {
        by: String,
    },
    Locked {
        owner: LockOwner,
    },
}

impl ResourceState {
    pub fn is_free(&self) -> bool {
        matches!(self, ResourceState::Free)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceState::Free => "free",
            ResourceState::Queued { .. } => "queued",
            ResourceState::Reserved { .. } => "reserved",
            ResourceState::Locked { .. } => "locked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    description: Option<String>,
    labels: Vec<String>,
    properties: Vec<ResourceProperty>,
    reserved_by: Option<String>,

    // Transient state, never persisted
    locked_by: Option<LockOwner>,
    ticket: Option<QueueTicket>,
}

impl Resource {
    pub fn new(name: &str) -> Result<Self> {
        let Some(name) = fix_empty_and_trim(Some(name)) else {
            return validation_error("Resource must have a name!");
        };
        if name.chars().any(char::is_whitespace) {
            return validation_error(format!(
                "Resource names cannot contain spaces: '{name}'"
            ));
        }
        Ok(Resource {
            name,
            description: None,
            labels: Vec::new(),
            properties: Vec::new(),
            reserved_by: None,
            locked_by: None,
            ticket: None,
        })
    }

    pub fn with_description(mut self, description: Option<&str>) -> Self {
        self.description = fix_empty_and_trim(description);
        self
    }

    /// Adds every whitespace separated label of `labels`, ignoring duplicates.
    pub fn with_labels(mut self, labels: &str) -> Self {
        for label in split_tokens(labels) {
            self.add_label(label);
        }
        self
    }

    pub fn with_properties(mut self, properties: Vec<ResourceProperty>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_reserved_by(mut self, user: Option<&str>) -> Self {
        self.reserved_by = fix_empty_and_trim(user);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Labels joined by single spaces, `None` for an unlabeled resource.
    pub fn labels_string(&self) -> Option<String> {
        if self.labels.is_empty() {
            None
        } else {
            Some(format_space_delimited(&self.labels))
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// True if the resource carries every label in `labels`.
    pub fn has_all_labels<T: AsRef<str>>(&self, labels: &[T]) -> bool {
        labels.iter().all(|l| self.has_label(l.as_ref()))
    }

    pub(crate) fn add_label(&mut self, label: &str) -> bool {
        if self.has_label(label) {
            false
        } else {
            self.labels.push(label.to_string());
            true
        }
    }

    pub(crate) fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        before != self.labels.len()
    }

    #[inline]
    pub fn properties(&self) -> &[ResourceProperty] {
        &self.properties
    }

    pub fn properties_map(&self) -> Map<&str, &str> {
        self.properties
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect()
    }

    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    #[inline]
    pub fn reserved_by(&self) -> Option<&str> {
        self.reserved_by.as_deref()
    }

    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }

    #[inline]
    pub fn locked_by(&self) -> Option<&LockOwner> {
        self.locked_by.as_ref()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    /// Returns the ticket unless it is missing or already too old.
    pub fn ticket(&self, expiry: &Expiry) -> Option<&QueueTicket> {
        self.ticket
            .as_ref()
            .filter(|ticket| !expiry.is_expired(ticket.since))
    }

    #[inline]
    pub fn is_queued(&self, expiry: &Expiry) -> bool {
        self.ticket(expiry).is_some()
    }

    /// Queued by anyone other than `work_item`.
    pub fn is_queued_by_other(&self, work_item: WorkItemId, expiry: &Expiry) -> bool {
        self.ticket(expiry).is_some_and(|t| t.owner != work_item)
    }

    pub fn is_queued_by(&self, work_item: WorkItemId, expiry: &Expiry) -> bool {
        self.ticket(expiry).is_some_and(|t| t.owner == work_item)
    }

    pub fn queue_project(&self, expiry: &Expiry) -> Option<&str> {
        self.ticket(expiry).map(|t| t.project.as_str())
    }

    pub fn is_free(&self, expiry: &Expiry) -> bool {
        !self.is_locked() && !self.is_reserved() && !self.is_queued(expiry)
    }

    pub fn state(&self, expiry: &Expiry) -> ResourceState {
        if let Some(owner) = &self.locked_by {
            ResourceState::Locked {
                owner: owner.clone(),
            }
        } else if let Some(user) = &self.reserved_by {
            ResourceState::Reserved { by: user.clone() }
        } else if let Some(ticket) = self.ticket(expiry) {
            ResourceState::Queued {
                owner: ticket.owner,
                project: ticket.project.clone(),
                since: ticket.since,
            }
        } else {
            ResourceState::Free
        }
    }

    /// Drops a ticket that outlived the timeout. Returns true if one was dropped.
    pub(crate) fn validate_queue_timeout(&mut self, expiry: &Expiry) -> bool {
        if self.ticket.as_ref().is_some_and(|t| expiry.is_expired(t.since)) {
            log::debug!("Queue ticket on {} expired", self.name);
            self.ticket = None;
            true
        } else {
            false
        }
    }

    /// Caller must have checked that the resource is free.
    pub(crate) fn queue(&mut self, work_item: WorkItemId, project: &str, now: Instant) {
        debug_assert!(!self.is_locked() && !self.is_reserved());
        self.ticket = Some(QueueTicket {
            owner: work_item,
            project: project.to_string(),
            since: now,
        });
    }

    pub(crate) fn unqueue(&mut self) {
        self.ticket = None;
    }

    /// Caller must have checked that the resource is neither reserved nor locked.
    /// Locking consumes any queue ticket.
    pub(crate) fn lock(&mut self, owner: LockOwner) {
        debug_assert!(!self.is_locked() && !self.is_reserved());
        self.ticket = None;
        self.locked_by = Some(owner);
    }

    pub(crate) fn unlock(&mut self) {
        self.ticket = None;
        self.locked_by = None;
    }

    pub(crate) fn reserve(&mut self, user: &str) {
        self.reserved_by = Some(user.to_string());
    }

    pub(crate) fn unreserve(&mut self) {
        self.reserved_by = None;
    }

    pub(crate) fn reset(&mut self) {
        self.unreserve();
        self.unqueue();
        self.locked_by = None;
    }

    /// Moves the transient state (lock and ticket) of `old` into `self`.
    pub(crate) fn inherit_transient_state(&mut self, old: &Resource) {
        self.locked_by = old.locked_by.clone();
        self.ticket = old.ticket.clone();
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::common::clock::{Clock, ManualClock};
    use std::time::Duration;

    fn resource() -> Resource {
        Resource::new("r1")
            .unwrap()
            .with_description(Some("d1"))
            .with_labels("l1 l2")
    }

    fn expiry(clock: &ManualClock) -> Expiry {
        Expiry::new(clock.now(), Duration::from_secs(60))
    }

    #[test]
    fn test_new_resource_is_free() {
        let clock = ManualClock::default();
        let r = resource();
        assert_eq!(r.name(), "r1");
        assert_eq!(r.description(), Some("d1"));
        assert_eq!(r.labels_string().as_deref(), Some("l1 l2"));
        assert_eq!(r.reserved_by(), None);
        assert!(!r.is_reserved());
        assert!(!r.is_locked());
        assert!(!r.is_queued(&expiry(&clock)));
        assert!(r.is_free(&expiry(&clock)));
        assert_eq!(r.state(&expiry(&clock)), ResourceState::Free);
    }

    #[test]
    fn test_invalid_names() {
        assert!(Resource::new("").is_err());
        assert!(Resource::new("   ").is_err());
        assert!(Resource::new("a b").is_err());
        assert!(Resource::new("a\tb").is_err());
        assert_eq!(Resource::new("  ok ").unwrap().name(), "ok");
    }

    #[test]
    fn test_labels_are_unique_and_ordered() {
        let r = Resource::new("r").unwrap().with_labels("b a  b c a");
        assert_eq!(r.labels(), ["b", "a", "c"]);
        assert!(r.has_all_labels(&["a", "c"]));
        assert!(!r.has_all_labels(&["a", "d"]));
        assert_eq!(Resource::new("r").unwrap().labels_string(), None);
    }

    #[test]
    fn test_queue_ticket_expires_lazily() {
        let clock = ManualClock::default();
        let mut r = resource();
        r.queue(WorkItemId::new(7), "proj", clock.now());
        assert!(r.is_queued(&expiry(&clock)));
        assert!(r.is_queued_by(WorkItemId::new(7), &expiry(&clock)));
        assert!(r.is_queued_by_other(WorkItemId::new(8), &expiry(&clock)));
        assert!(!r.is_queued_by_other(WorkItemId::new(7), &expiry(&clock)));
        assert_eq!(r.queue_project(&expiry(&clock)), Some("proj"));
        assert!(!r.is_free(&expiry(&clock)));

        clock.advance(Duration::from_secs(61));
        assert!(!r.is_queued(&expiry(&clock)));
        assert!(r.is_free(&expiry(&clock)));
        assert!(r.validate_queue_timeout(&expiry(&clock)));
        assert!(!r.validate_queue_timeout(&expiry(&clock)));
    }

    #[test]
    fn test_lock_consumes_ticket() {
        let clock = ManualClock::default();
        let mut r = resource();
        r.queue(WorkItemId::new(1), "proj", clock.now());
        r.lock(LockOwner::new("build#1"));
        assert!(!r.is_queued(&expiry(&clock)));
        assert_eq!(
            r.state(&expiry(&clock)),
            ResourceState::Locked {
                owner: LockOwner::new("build#1")
            }
        );
        r.unlock();
        assert!(r.is_free(&expiry(&clock)));
    }

    #[test]
    fn test_state_precedence() {
        let clock = ManualClock::default();
        let mut r = resource();
        r.queue(WorkItemId::new(1), "proj", clock.now());
        r.reserve("alice");
        assert_eq!(
            r.state(&expiry(&clock)),
            ResourceState::Reserved {
                by: "alice".to_string()
            }
        );
        r.reset();
        assert_eq!(r.state(&expiry(&clock)), ResourceState::Free);
    }

    #[test]
    fn test_empty_property_value() {
        let p = ResourceProperty::new("HOST", "");
        assert_eq!(p.value, " ");
        let r = resource().with_properties(vec![p, ResourceProperty::new("PORT", "22")]);
        assert_eq!(r.property_value("PORT"), Some("22"));
        assert_eq!(r.properties_map().len(), 2);
    }
}
