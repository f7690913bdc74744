use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Characters a room code may contain. Vowels are left out so codes never spell words.
pub const ROOM_CODE_CHARS: &str = "BCDFGHJKLMNPRQSTVWXYZ";
pub const ROOM_CODE_LEN: usize = 8;

/// An 8-character public room identifier. The first character selects the
/// region the room lives in, the remaining seven are random.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Build a new code for the given region index.
    ///
    /// An unknown region, or one past the end of the alphabet, falls back to
    /// the first character.
    pub fn generate(region_index: Option<usize>, rng: &mut impl Rng) -> Self {
        let alphabet = ROOM_CODE_CHARS.as_bytes();
        let prefix = region_index
            .filter(|&i| i < alphabet.len())
            .unwrap_or(0);

        let mut code = String::with_capacity(ROOM_CODE_LEN);
        code.push(alphabet[prefix] as char);
        for _ in 1..ROOM_CODE_LEN {
            code.push(alphabet[rng.gen_range(0..alphabet.len())] as char);
        }
        Self(code)
    }

    /// Build a new code using a generator seeded from the current wall-clock second.
    pub fn generate_now(region_index: Option<usize>) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::generate(region_index, &mut StdRng::seed_from_u64(seed))
    }

    /// Parse and validate user input against the number of regions known right now.
    pub fn parse(input: &str, known_regions: usize) -> Result<Self, RoomCodeError> {
        let code = Self::parse_format(input)?;
        let index = code.region_index();
        if index >= known_regions {
            return Err(RoomCodeError::UnknownRegion {
                index,
                known: known_regions,
            });
        }
        Ok(code)
    }

    /// Syntactic validation only: length and alphabet membership.
    pub fn parse_format(input: &str) -> Result<Self, RoomCodeError> {
        let upper = input.to_ascii_uppercase();
        if upper.chars().count() != ROOM_CODE_LEN {
            return Err(RoomCodeError::InvalidFormat);
        }
        if !upper.chars().all(|c| ROOM_CODE_CHARS.contains(c)) {
            return Err(RoomCodeError::InvalidFormat);
        }
        Ok(Self(upper))
    }

    /// Index of the first character in the alphabet, i.e. the region index.
    pub fn region_index(&self) -> usize {
        self.0
            .chars()
            .next()
            .and_then(|c| ROOM_CODE_CHARS.find(c))
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_format(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Returns the region index encoded in `input` if it is a usable room code.
pub fn is_valid_room_id(input: &str, known_regions: usize) -> Option<usize> {
    RoomCode::parse(input, known_regions)
        .ok()
        .map(|c| c.region_index())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    #[error("room codes are 8 characters from BCDFGHJKLMNPRQSTVWXYZ")]
    InvalidFormat,
    #[error("room code refers to region {index}, but only {known} regions are known")]
    UnknownRegion { index: usize, known: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_alphabet_has_21_unique_chars() {
        let mut chars: Vec<char> = ROOM_CODE_CHARS.chars().collect();
        assert_eq!(chars.len(), 21);
        chars.sort();
        chars.dedup();
        assert_eq!(chars.len(), 21);
    }

    #[test]
    fn test_unknown_region_falls_back_to_first_char() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = RoomCode::generate(None, &mut rng);
        assert!(code.as_str().starts_with('B'));

        let code = RoomCode::generate(Some(99), &mut rng);
        assert!(code.as_str().starts_with('B'));
    }

    #[test]
    fn test_parse_normalizes_case() {
        let code = RoomCode::parse("cbbbbbbb", 3).unwrap();
        assert_eq!(code.as_str(), "CBBBBBBB");
        assert_eq!(code.region_index(), 1);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(RoomCode::parse("", 3), Err(RoomCodeError::InvalidFormat));
        assert_eq!(RoomCode::parse("BBBBBBB", 3), Err(RoomCodeError::InvalidFormat));
        assert_eq!(RoomCode::parse("BBBBBBBBB", 3), Err(RoomCodeError::InvalidFormat));
    }

    #[test]
    fn test_parse_rejects_vowels_and_digits() {
        assert_eq!(RoomCode::parse("BBBBBBBA", 3), Err(RoomCodeError::InvalidFormat));
        assert_eq!(RoomCode::parse("BBBB1BBB", 3), Err(RoomCodeError::InvalidFormat));
    }

    #[test]
    fn test_parse_rejects_unknown_region() {
        // 'D' is index 2
        assert_eq!(
            RoomCode::parse("DBBBBBBB", 2),
            Err(RoomCodeError::UnknownRegion { index: 2, known: 2 })
        );
        assert_eq!(is_valid_room_id("DBBBBBBB", 3), Some(2));
        assert_eq!(is_valid_room_id("DBBBBBBB", 0), None);
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&RoomCode::parse_format("BCDFGHJK").unwrap()).unwrap();
        assert_eq!(json, "\"BCDFGHJK\"");
        assert!(serde_json::from_str::<RoomCode>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn generated_codes_decode_to_their_region(region in 0usize..21, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let code = RoomCode::generate(Some(region), &mut rng);
            prop_assert_eq!(code.as_str().len(), ROOM_CODE_LEN);
            prop_assert_eq!(code.as_str().as_bytes()[0], ROOM_CODE_CHARS.as_bytes()[region]);
            prop_assert_eq!(RoomCode::parse(code.as_str(), 21).map(|c| c.region_index()), Ok(region));
        }

        #[test]
        fn codes_outside_known_regions_are_rejected(region in 0usize..21, known in 0usize..21, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let code = RoomCode::generate(Some(region), &mut rng);
            prop_assert_eq!(is_valid_room_id(code.as_str(), known).is_some(), region < known);
        }

        #[test]
        fn arbitrary_lengths_other_than_eight_are_rejected(s in "[B-Z]{0,16}") {
            prop_assume!(s.len() != ROOM_CODE_LEN);
            prop_assert_eq!(RoomCode::parse(&s, 21), Err(RoomCodeError::InvalidFormat));
        }
    }
}
