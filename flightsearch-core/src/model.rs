use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

// ============================================================================
// Airports
// ============================================================================

/// Identifies an airport. Identity is the IATA code; `name` is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportRef {
    pub iata_code: String,
    pub name: String,
}

impl AirportRef {
    pub fn new(iata_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            iata_code: iata_code.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for AirportRef {
    fn eq(&self, other: &Self) -> bool {
        self.iata_code == other.iata_code
    }
}

impl Eq for AirportRef {}

impl Hash for AirportRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iata_code.hash(state);
    }
}

/// Full airport row, `passengers` is the popularity metric used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub iata_code: String,
    pub name: String,
    pub passengers: i64,
}

impl Airport {
    pub fn new(iata_code: impl Into<String>, name: impl Into<String>, passengers: i64) -> Self {
        Self {
            iata_code: iata_code.into(),
            name: name.into(),
            passengers,
        }
    }

    pub fn to_ref(&self) -> AirportRef {
        AirportRef::new(self.iata_code.clone(), self.name.clone())
    }
}

// ============================================================================
// Favorites
// ============================================================================

/// A saved origin -> destination route, keyed by the ordered code pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FavoritePair {
    pub departure_code: String,
    pub destination_code: String,
}

impl FavoritePair {
    /// Returns `None` for a route that starts and ends at the same airport.
    pub fn new(departure_code: impl Into<String>, destination_code: impl Into<String>) -> Option<Self> {
        let pair = Self {
            departure_code: departure_code.into(),
            destination_code: destination_code.into(),
        };
        (!pair.is_self_route()).then_some(pair)
    }

    pub fn route(origin: &AirportRef, destination: &AirportRef) -> Option<Self> {
        Self::new(origin.iata_code.clone(), destination.iata_code.clone())
    }

    pub fn is_self_route(&self) -> bool {
        self.departure_code == self.destination_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_airport_identity_ignores_name() {
        let a = AirportRef::new("JFK", "John F Kennedy");
        let b = AirportRef::new("JFK", "Kennedy International");

        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_self_route_rejected() {
        assert!(FavoritePair::new("JFK", "JFK").is_none());

        let jfk = AirportRef::new("JFK", "John F Kennedy");
        let lax = AirportRef::new("LAX", "Los Angeles International");
        let pair = FavoritePair::route(&jfk, &lax).unwrap();
        assert_eq!(pair.departure_code, "JFK");
        assert_eq!(pair.destination_code, "LAX");
        assert!(FavoritePair::route(&jfk, &jfk).is_none());
    }

    #[test]
    fn test_pair_deserialization() {
        let json = r#"{ "departure_code": "JFK", "destination_code": "LAX" }"#;
        let pair: FavoritePair = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(pair, FavoritePair::new("JFK", "LAX").unwrap());
    }
}
