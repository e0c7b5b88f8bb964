use crate::sdk::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub has_video: bool,
    pub is_sharing: bool,
}

/// Remote participants seen through stream events.
///
/// Updated by the event dispatcher. Read by UI layers.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRoster {
    entries: Vec<RosterEntry>,
    local_id: Option<ParticipantId>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local_id(&mut self, id: ParticipantId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local_id
    }

    pub fn set_video(&mut self, id: ParticipantId, on: bool) {
        self.entry_mut(id).has_video = on;
        self.prune(id);
    }

    pub fn set_sharing(&mut self, id: ParticipantId, on: bool) {
        self.entry_mut(id).is_sharing = on;
        self.prune(id);
    }

    pub fn remove(&mut self, id: ParticipantId) {
        self.entries.retain(|e| e.participant_id != id);
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn entry(&self, id: ParticipantId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.participant_id == id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.local_id = None;
    }

    fn entry_mut(&mut self, id: ParticipantId) -> &mut RosterEntry {
        let index = match self.entries.iter().position(|e| e.participant_id == id) {
            Some(index) => index,
            None => {
                self.entries.push(RosterEntry {
                    participant_id: id,
                    has_video: false,
                    is_sharing: false,
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    // Participants with no live stream carry no information worth keeping.
    fn prune(&mut self, id: ParticipantId) {
        self.entries
            .retain(|e| e.participant_id != id || e.has_video || e.is_sharing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_start_adds_participant() {
        let mut roster = ParticipantRoster::new();
        roster.set_video(7, true);
        assert_eq!(roster.len(), 1);
        assert!(roster.entry(7).unwrap().has_video);
    }

    #[test]
    fn no_duplicate_entries() {
        let mut roster = ParticipantRoster::new();
        roster.set_video(7, true);
        roster.set_sharing(7, true);
        assert_eq!(roster.len(), 1);
        let entry = roster.entry(7).unwrap();
        assert!(entry.has_video && entry.is_sharing);
    }

    #[test]
    fn stopping_every_stream_drops_entry() {
        let mut roster = ParticipantRoster::new();
        roster.set_video(7, true);
        roster.set_sharing(7, true);
        roster.set_video(7, false);
        assert!(roster.entry(7).is_some());
        roster.set_sharing(7, false);
        assert!(roster.is_empty());
    }

    #[test]
    fn stop_for_unknown_participant_is_ignored() {
        let mut roster = ParticipantRoster::new();
        roster.set_video(9, false);
        assert!(roster.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut roster = ParticipantRoster::new();
        roster.set_local_id(1);
        roster.set_video(2, true);
        roster.clear();
        assert!(roster.is_empty());
        assert!(roster.local_id().is_none());
    }
}
