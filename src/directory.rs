use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

use crate::error::BookingError;
use crate::model::{Renter, RenterId, Spot, SpotId};

/// Read access to the spot catalog.
#[async_trait]
pub trait SpotDirectory: Send + Sync {
    async fn find_spot(&self, id: SpotId) -> Result<Option<Spot>, BookingError>;
}

/// Read access to registered renters.
#[async_trait]
pub trait RenterDirectory: Send + Sync {
    async fn find_renter(&self, id: RenterId) -> Result<Option<Renter>, BookingError>;
}

/// JSON catalog: `{ "spots": [...], "renters": [...] }`. Prices are decimal strings.
#[derive(Debug, Default, Deserialize)]
struct Seed {
    #[serde(default)]
    spots: Vec<Spot>,
    #[serde(default)]
    renters: Vec<Renter>,
}

/// Spots and renters held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    spots: DashMap<SpotId, Spot>,
    renters: DashMap<RenterId, Renter>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let dir = Self::from_seed_json(&raw)?;
        info!(
            path = %path.display(),
            spots = dir.spots.len(),
            renters = dir.renters.len(),
            "loaded seed catalog"
        );
        Ok(dir)
    }

    pub fn from_seed_json(raw: &str) -> std::io::Result<Self> {
        let seed: Seed = serde_json::from_str(raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let dir = Self::new();
        for spot in seed.spots {
            dir.insert_spot(spot);
        }
        for renter in seed.renters {
            dir.insert_renter(renter);
        }
        Ok(dir)
    }

    pub fn insert_spot(&self, spot: Spot) {
        self.spots.insert(spot.id, spot);
    }

    pub fn insert_renter(&self, renter: Renter) {
        self.renters.insert(renter.id, renter);
    }

    pub fn spot_count(&self) -> usize {
        self.spots.len()
    }
}

#[async_trait]
impl SpotDirectory for InMemoryDirectory {
    async fn find_spot(&self, id: SpotId) -> Result<Option<Spot>, BookingError> {
        Ok(self.spots.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl RenterDirectory for InMemoryDirectory {
    async fn find_renter(&self, id: RenterId) -> Result<Option<Renter>, BookingError> {
        Ok(self.renters.get(&id).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SEED: &str = r#"{
        "spots": [
            {
                "id": "01HZZZZZZZZZZZZZZZZZZZZZZA",
                "title": "Garage on Elm",
                "city": "Springfield",
                "price_per_hour": "2.00",
                "price_per_day": "20.00"
            },
            {
                "id": "01HZZZZZZZZZZZZZZZZZZZZZZB",
                "price_per_hour": "1.50",
                "price_per_day": "12.00",
                "available_from": 1800000000000,
                "active": false
            }
        ],
        "renters": [
            { "id": "01HZZZZZZZZZZZZZZZZZZZZZZC", "email": "sam@example.com" }
        ]
    }"#;

    #[tokio::test]
    async fn loads_seed_catalog() {
        let dir = InMemoryDirectory::from_seed_json(SEED).unwrap();
        assert_eq!(dir.spot_count(), 2);

        let elm: SpotId = "01HZZZZZZZZZZZZZZZZZZZZZZA".parse().unwrap();
        let spot = dir.find_spot(elm).await.unwrap().unwrap();
        assert_eq!(spot.price_per_hour, dec!(2.00));
        assert!(spot.active);
        assert_eq!(spot.address, None);

        let closed: SpotId = "01HZZZZZZZZZZZZZZZZZZZZZZB".parse().unwrap();
        let spot = dir.find_spot(closed).await.unwrap().unwrap();
        assert!(!spot.active);
        assert_eq!(spot.available_from, Some(1_800_000_000_000));

        let renter: RenterId = "01HZZZZZZZZZZZZZZZZZZZZZZC".parse().unwrap();
        assert!(dir.find_renter(renter).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_ids_are_none() {
        let dir = InMemoryDirectory::new();
        assert!(dir.find_spot(ulid::Ulid::new()).await.unwrap().is_none());
        assert!(dir.find_renter(ulid::Ulid::new()).await.unwrap().is_none());
    }

    #[test]
    fn malformed_seed_is_invalid_data() {
        let err = InMemoryDirectory::from_seed_json("{\"spots\": 3}").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
