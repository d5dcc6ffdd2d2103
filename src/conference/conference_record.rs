use std::collections::BTreeSet;

/// Membership of one multi-party call. Never observable with an empty
/// participant set: the registry removes it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceRecord {
    pub conference_id: String,
    pub host: String,
    pub participants: BTreeSet<String>,
    pub created_at_ms: u64,
}

impl ConferenceRecord {
    /// Participants other than `me`, in stable order.
    pub fn others<'a>(&'a self, me: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.participants
            .iter()
            .map(String::as_str)
            .filter(move |p| *p != me)
    }

    #[must_use]
    pub fn contains(&self, user: &str) -> bool {
        self.participants.contains(user)
    }
}
