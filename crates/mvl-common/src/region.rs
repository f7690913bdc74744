use serde::{Deserialize, Serialize};

/// A network region advertised by the lobby backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
}

impl Region {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let name = display_name(&code);
        Self { code, name }
    }
}

/// The currently known regions, always kept sorted by region code.
///
/// A region's position in this list is what the first character of a room
/// code refers to, so every node must agree on the ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub fn new(mut regions: Vec<Region>) -> Self {
        regions.sort_by(|a, b| a.code.cmp(&b.code));
        regions.dedup_by(|a, b| a.code == b.code);
        Self { regions }
    }

    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(codes.into_iter().map(Region::new).collect())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// Case-insensitive lookup of a region code.
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.regions
            .iter()
            .position(|r| r.code.eq_ignore_ascii_case(code))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }
}

fn display_name(code: &str) -> String {
    match code.to_ascii_lowercase().as_str() {
        "asia" => "Asia".to_string(),
        "eu" => "Europe".to_string(),
        "jp" => "Japan".to_string(),
        "sa" => "South America".to_string(),
        "us" => "USA, East".to_string(),
        "usw" => "USA, West".to_string(),
        _ => code.to_uppercase(),
    }
}
