use std::collections::HashSet;
use std::fmt;

use serde::de::{Error as _, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A plant row in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    #[sqlx(rename = "id")]
    pub local_id: i64,
    #[sqlx(rename = "refId")]
    pub remote_id: String,
    pub name: String,
    pub description: String,
    pub image: String,
}

/// Input for inserting a plant. The store assigns the local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlant {
    pub remote_id: String,
    pub name: String,
    pub description: String,
    pub image: String,
}

impl NewPlant {
    pub fn new(
        remote_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            description: description.into(),
            image: image.into(),
        }
    }

    /// Check that every field carries a value.
    /// Returns the name of the first empty field.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            ("remoteId", &self.remote_id),
            ("name", &self.name),
            ("description", &self.description),
            ("image", &self.image),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(field);
            }
        }
        Ok(())
    }
}

/// One plant as the remote store reports it, keyed externally by its remote id.
/// Unknown fields in the remote object are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlant {
    pub name: String,
    pub description: String,
    pub image: String,
}

impl RemotePlant {
    pub fn into_new_plant(self, remote_id: String) -> NewPlant {
        NewPlant {
            remote_id,
            name: self.name,
            description: self.description,
            image: self.image,
        }
    }
}

/// The full set of plants the remote store holds for one owner.
///
/// Entries keep the order of the keys in the remote document, which is
/// also the order rows are inserted during a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<(String, RemotePlant)>,
}

impl Snapshot {
    pub fn new(entries: Vec<(String, RemotePlant)>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, RemotePlant)] {
        &self.entries
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn into_new_plants(self) -> Vec<NewPlant> {
        self.entries
            .into_iter()
            .map(|(id, plant)| plant.into_new_plant(id))
            .collect()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = Snapshot;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of remote ids to plant objects")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Snapshot, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                let mut seen = HashSet::new();
                while let Some((key, plant)) = map.next_entry::<String, RemotePlant>()? {
                    if !seen.insert(key.clone()) {
                        return Err(A::Error::custom(format!("duplicate remote id '{}'", key)));
                    }
                    entries.push((key, plant));
                }
                Ok(Snapshot { entries })
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_complete_plant() {
        let plant = NewPlant::new("p1", "Fern", "d", "img");
        assert!(plant.validate().is_ok());
    }

    #[test]
    fn test_validate_names_first_empty_field() {
        assert_eq!(NewPlant::new("", "Fern", "d", "img").validate(), Err("remoteId"));
        assert_eq!(NewPlant::new("x", "", "d", "i").validate(), Err("name"));
        assert_eq!(NewPlant::new("x", "n", "  ", "i").validate(), Err("description"));
        assert_eq!(NewPlant::new("x", "n", "d", "").validate(), Err("image"));
    }

    #[test]
    fn test_snapshot_keeps_document_order() {
        let json = r#"{
            "zeta": {"name": "Z", "description": "dz", "image": "iz"},
            "alpha": {"name": "A", "description": "da", "image": "ia"},
            "mid": {"name": "M", "description": "dm", "image": "im"}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = snapshot.remote_ids().collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_snapshot_rejects_repeated_key() {
        let json = r#"{
            "a": {"name": "A", "description": "d", "image": "i"},
            "a": {"name": "A2", "description": "d", "image": "i"}
        }"#;
        let err = serde_json::from_str::<Snapshot>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate remote id 'a'"));
    }

    #[test]
    fn test_snapshot_ignores_extra_fields() {
        let json = r#"{"a": {"name": "Fern", "description": "d", "image": "i", "owner": "u1", "watered": 3}}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let plants = snapshot.into_new_plants();
        assert_eq!(plants, vec![NewPlant::new("a", "Fern", "d", "i")]);
    }

    #[test]
    fn test_snapshot_rejects_non_object() {
        assert!(serde_json::from_str::<Snapshot>("[1, 2]").is_err());
        assert!(serde_json::from_str::<Snapshot>(r#""plants""#).is_err());
        assert!(serde_json::from_str::<Snapshot>(r#"{"a": {"name": "x"}}"#).is_err());
    }

    #[test]
    fn test_plant_serializes_camel_case() {
        let plant = Plant {
            local_id: 7,
            remote_id: "p1".to_string(),
            name: "Fern".to_string(),
            description: "d".to_string(),
            image: "img".to_string(),
        };
        let value = serde_json::to_value(&plant).unwrap();
        assert_eq!(value["localId"], 7);
        assert_eq!(value["remoteId"], "p1");
    }
}
