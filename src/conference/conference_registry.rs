use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::conference::{
    conference_error::{ConferenceError, Result},
    conference_record::ConferenceRecord,
};

/// Active conferences by id.
#[derive(Debug, Default)]
pub struct ConferenceRegistry {
    conferences: HashMap<String, ConferenceRecord>,
}

impl ConferenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New conference with a fresh v4 id; `host` is always a participant.
    pub fn create<I, S>(&mut self, host: &str, participants: I, now_ms: u64) -> &ConferenceRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = Uuid::new_v4().to_string();
        let record = Self::record(id.clone(), host, participants, now_ms);
        self.conferences.entry(id).or_insert(record)
    }

    /// Adopt a conference announced by a remote host (`conf_create`).
    ///
    /// Only unknown ids are adopted. A known id returns `None` and its record
    /// is left as is; membership then changes only through join and leave.
    pub fn insert_with_id<I, S>(
        &mut self,
        conference_id: String,
        host: &str,
        participants: I,
        now_ms: u64,
    ) -> Option<&ConferenceRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.conferences.entry(conference_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let record = Self::record(slot.key().clone(), host, participants, now_ms);
                Some(slot.insert(record))
            }
        }
    }

    fn record<I, S>(conference_id: String, host: &str, participants: I, now_ms: u64) -> ConferenceRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: BTreeSet<String> = participants
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        members.insert(host.to_owned());

        ConferenceRecord {
            conference_id,
            host: host.to_owned(),
            participants: members,
            created_at_ms: now_ms,
        }
    }

    /// Idempotent: joining twice succeeds. Returns whether `user` was added.
    ///
    /// # Errors
    /// [`ConferenceError::NotFound`] for an unknown id.
    pub fn join(&mut self, conference_id: &str, user: &str) -> Result<bool> {
        let rec = self
            .conferences
            .get_mut(conference_id)
            .ok_or_else(|| ConferenceError::NotFound(conference_id.to_owned()))?;
        Ok(rec.participants.insert(user.to_owned()))
    }

    /// Remove `user`. Returns `true` if the conference ended as a result.
    ///
    /// # Errors
    /// [`ConferenceError::NotFound`] for an unknown id,
    /// [`ConferenceError::NotParticipant`] if `user` was not a member.
    pub fn leave(&mut self, conference_id: &str, user: &str) -> Result<bool> {
        let rec = self
            .conferences
            .get_mut(conference_id)
            .ok_or_else(|| ConferenceError::NotFound(conference_id.to_owned()))?;
        if !rec.participants.remove(user) {
            return Err(ConferenceError::NotParticipant {
                conference_id: conference_id.to_owned(),
                user: user.to_owned(),
            });
        }
        if rec.participants.is_empty() {
            self.conferences.remove(conference_id);
            return Ok(true);
        }
        Ok(false)
    }

    /// # Errors
    /// [`ConferenceError::NotFound`] for an unknown id.
    pub fn end(&mut self, conference_id: &str) -> Result<ConferenceRecord> {
        self.conferences
            .remove(conference_id)
            .ok_or_else(|| ConferenceError::NotFound(conference_id.to_owned()))
    }

    /// # Errors
    /// [`ConferenceError::NotFound`] for an unknown id.
    pub fn participants(&self, conference_id: &str) -> Result<Vec<String>> {
        self.get(conference_id)
            .map(|rec| rec.participants.iter().cloned().collect())
            .ok_or_else(|| ConferenceError::NotFound(conference_id.to_owned()))
    }

    #[must_use]
    pub fn get(&self, conference_id: &str) -> Option<&ConferenceRecord> {
        self.conferences.get(conference_id)
    }

    #[must_use]
    pub fn is_participant(&self, conference_id: &str, user: &str) -> bool {
        self.get(conference_id).is_some_and(|rec| rec.contains(user))
    }

    /// Remove `user` from every conference (peer went offline). Returns the
    /// ids of conferences that ended.
    pub fn remove_user_everywhere(&mut self, user: &str) -> Vec<String> {
        let mut ended = Vec::new();
        self.conferences.retain(|id, rec| {
            rec.participants.remove(user);
            if rec.participants.is_empty() {
                ended.push(id.clone());
                false
            } else {
                true
            }
        });
        ended
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conferences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conferences.is_empty()
    }

    pub fn clear(&mut self) {
        self.conferences.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn create_always_includes_host() {
        let mut reg = ConferenceRegistry::new();
        let rec = reg.create("alice", ["bob"], 10).clone();
        assert!(rec.contains("alice"));
        assert!(rec.contains("bob"));
        assert_eq!(rec.host, "alice");
        assert_eq!(rec.conference_id.len(), 36);
        assert!(reg.is_participant(&rec.conference_id, "alice"));

        let rec2 = reg.create("alice", ["alice", "bob"], 11).clone();
        assert_ne!(rec.conference_id, rec2.conference_id);
        assert_eq!(rec2.participants.len(), 2);
    }

    #[test]
    fn join_is_idempotent() {
        let mut reg = ConferenceRegistry::new();
        let id = reg.create("alice", ["bob"], 0).conference_id.clone();
        assert_eq!(reg.join(&id, "carol"), Ok(true));
        assert_eq!(reg.join(&id, "carol"), Ok(false));
        assert_eq!(reg.participants(&id).unwrap(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn last_leave_removes_conference() {
        let mut reg = ConferenceRegistry::new();
        let id = reg.create("alice", ["bob"], 0).conference_id.clone();
        assert_eq!(reg.leave(&id, "alice"), Ok(false));
        assert_eq!(reg.leave(&id, "bob"), Ok(true));
        assert!(reg.get(&id).is_none());
        assert_eq!(reg.participants(&id), Err(ConferenceError::NotFound(id.clone())));
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_ids_and_members_are_reported() {
        let mut reg = ConferenceRegistry::new();
        assert!(matches!(reg.join("nope", "bob"), Err(ConferenceError::NotFound(_))));
        assert!(matches!(reg.end("nope"), Err(ConferenceError::NotFound(_))));

        let id = reg.create("alice", Vec::<String>::new(), 0).conference_id.clone();
        assert!(matches!(
            reg.leave(&id, "mallory"),
            Err(ConferenceError::NotParticipant { .. })
        ));
        assert_eq!(reg.end(&id).unwrap().participants.len(), 1);
        assert!(!reg.is_participant(&id, "alice"));
    }

    #[test]
    fn remote_announcement_keeps_its_id() {
        let mut reg = ConferenceRegistry::new();
        reg.insert_with_id("conf-1".into(), "bob", ["alice", "carol"], 0);
        assert_eq!(reg.participants("conf-1").unwrap(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn repeated_announcement_does_not_rewrite_membership() {
        let mut reg = ConferenceRegistry::new();
        let id = reg.create("alice", ["bob", "carol"], 0).conference_id.clone();

        assert!(reg.insert_with_id(id.clone(), "carol", ["carol"], 5).is_none());
        let rec = reg.get(&id).unwrap();
        assert_eq!(rec.host, "alice");
        assert_eq!(reg.participants(&id).unwrap(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn offline_user_is_removed_everywhere() {
        let mut reg = ConferenceRegistry::new();
        reg.insert_with_id("a".into(), "bob", ["carol"], 0);
        reg.insert_with_id("b".into(), "bob", Vec::<String>::new(), 0);
        let ended = reg.remove_user_everywhere("bob");
        assert_eq!(ended, vec!["b".to_owned()]);
        assert_eq!(reg.participants("a").unwrap(), vec!["carol"]);
    }
}
