//! Check-in registry.
//!
//! The first time a tag is seen at the check-in antenna it gets a rider
//! profile with the next free id and placeholder details, which the
//! operator then edits. Seeing the same tag again changes nothing.

use serde::{Deserialize, Serialize};

use crate::ledger::unregistered_name;

/// A registered rider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: u32,
    pub rfid_id: String,
    pub player_name: String,
    pub driver_number: u32,
}

/// All registered riders, in check-in order.
///
/// Serialized as a plain array of profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileBook {
    profiles: Vec<Profile>,
}

impl ProfileBook {
    pub fn new() -> Self {
        ProfileBook::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    pub fn as_slice(&self) -> &[Profile] {
        &self.profiles
    }

    /// Next profile id: one more than the highest in use, 1 for an empty book.
    pub fn next_id(&self) -> u32 {
        self.profiles
            .iter()
            .map(|p| p.profile_id)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn find_by_rfid(&self, rfid_id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.rfid_id == rfid_id)
    }

    pub fn find(&self, profile_id: u32) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.profile_id == profile_id)
    }

    /// Register a tag. Returns the new profile, or `None` if the tag
    /// already had one.
    pub fn checkin(&mut self, rfid_id: &str) -> Option<Profile> {
        if self.find_by_rfid(rfid_id).is_some() {
            return None;
        }
        let profile_id = self.next_id();
        let profile = Profile {
            profile_id,
            rfid_id: rfid_id.to_string(),
            player_name: format!("Rider {}", profile_id),
            driver_number: profile_id,
        };
        self.profiles.push(profile.clone());
        Some(profile)
    }

    /// Name to show for a tag: the rider's name, or a shortened tag id.
    pub fn display_name(&self, rfid_id: &str) -> String {
        match self.find_by_rfid(rfid_id) {
            Some(profile) => profile.player_name.clone(),
            None => unregistered_name(rfid_id),
        }
    }

    /// Change a rider's name and number. Returns false for an unknown id.
    pub fn update(&mut self, profile_id: u32, player_name: &str, driver_number: u32) -> bool {
        match self.profiles.iter_mut().find(|p| p.profile_id == profile_id) {
            Some(profile) => {
                profile.player_name = player_name.to_string();
                profile.driver_number = driver_number;
                true
            }
            None => false,
        }
    }

    /// Delete a rider. Returns false for an unknown id.
    pub fn remove(&mut self, profile_id: u32) -> bool {
        let before = self.profiles.len();
        self.profiles.retain(|p| p.profile_id != profile_id);
        before != self.profiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkin_assigns_sequential_ids() {
        let mut book = ProfileBook::new();
        assert_eq!(book.next_id(), 1);

        let a = book.checkin("AAAA").unwrap();
        let b = book.checkin("BBBB").unwrap();
        let c = book.checkin("CCCC").unwrap();
        assert_eq!((a.profile_id, b.profile_id, c.profile_id), (1, 2, 3));
        assert_eq!(a.rfid_id, "AAAA");
        assert_eq!(a.player_name, "Rider 1");
    }

    #[test]
    fn test_checkin_is_idempotent() {
        let mut book = ProfileBook::new();
        assert!(book.checkin("AAAA").is_some());
        assert!(book.checkin("AAAA").is_none());
        assert!(book.checkin("AAAA").is_none());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_next_id_after_delete() {
        let mut book = ProfileBook::new();
        book.checkin("AAAA");
        book.checkin("BBBB");
        book.checkin("CCCC");

        // Removing the newest frees its id, removing an older one does not
        assert!(book.remove(3));
        assert_eq!(book.checkin("DDDD").unwrap().profile_id, 3);
        assert!(book.remove(1));
        assert_eq!(book.checkin("EEEE").unwrap().profile_id, 4);
        assert!(!book.remove(42));
    }

    #[test]
    fn test_update_and_display_name() {
        let mut book = ProfileBook::new();
        book.checkin("E2003412AABBCCDD");
        assert!(book.update(1, "Valentino", 46));
        assert!(!book.update(2, "Nobody", 0));

        let profile = book.find(1).unwrap();
        assert_eq!(profile.player_name, "Valentino");
        assert_eq!(profile.driver_number, 46);
        assert_eq!(profile.rfid_id, "E2003412AABBCCDD");

        assert_eq!(book.display_name("E2003412AABBCCDD"), "Valentino");
        assert_eq!(book.display_name("E2009999AABBCCDD"), "E2009999...");
    }

    #[test]
    fn test_serializes_as_array() {
        let mut book = ProfileBook::new();
        book.checkin("AB12");
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "profile_id": 1,
                "rfid_id": "AB12",
                "player_name": "Rider 1",
                "driver_number": 1
            }])
        );
        let back: ProfileBook = serde_json::from_value(json).unwrap();
        assert_eq!(back, book);
    }
}
