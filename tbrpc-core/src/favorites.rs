//! Client-side favorite devices
//!
//! Stored apart from the fetched list and merged by id when rendering.

use crate::directory::Device;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Favorites {
    ids: Vec<String>,
}

impl Favorites {
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut favorites = Self::default();
        for id in ids {
            if !favorites.contains(&id) {
                favorites.ids.push(id);
            }
        }
        favorites
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.ids.iter().any(|id| id == device_id)
    }

    /// Flip the marker; returns whether the device is now a favorite
    pub fn toggle(&mut self, device_id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|id| id == device_id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.push(device_id.to_string());
            true
        }
    }

    /// Split devices into (favorites, others), keeping list order in both
    pub fn partition<'a, I>(&self, devices: I) -> (Vec<&'a Device>, Vec<&'a Device>)
    where
        I: IntoIterator<Item = &'a Device>,
    {
        devices.into_iter().partition(|d| self.contains(&d.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> Device {
        Device {
            id: id.to_string(),
            name: format!("dev-{id}"),
            device_type: None,
            active: true,
        }
    }

    #[test]
    fn test_toggle() {
        let mut favs = Favorites::default();
        assert!(favs.toggle("a"));
        assert!(favs.toggle("b"));
        assert!(favs.contains("a"));

        assert!(!favs.toggle("a"));
        assert!(!favs.contains("a"));
        assert_eq!(favs.ids(), ["b".to_string()]);
    }

    #[test]
    fn test_from_ids_drops_duplicates() {
        let favs = Favorites::from_ids(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(favs.ids(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_partition_keeps_order() {
        let devices = vec![device("1"), device("2"), device("3"), device("4")];
        let favs = Favorites::from_ids(vec!["3".into(), "1".into(), "gone".into()]);

        let (fav, rest) = favs.partition(&devices);
        fn ids(v: &[&Device]) -> Vec<String> {
            v.iter().map(|d| d.id.clone()).collect()
        }
        assert_eq!(ids(&fav), vec!["1", "3"]);
        assert_eq!(ids(&rest), vec!["2", "4"]);
    }
}
