//! County name suggestions for the county filter field
//!
//! Purely local: filters a fixed reference list, never touches the network.

/// The 62 counties of New York State
pub const NEW_YORK_COUNTIES: [&str; 62] = [
    "Albany", "Allegany", "Bronx", "Broome", "Cattaraugus", "Cayuga", "Chautauqua",
    "Chemung", "Chenango", "Clinton", "Columbia", "Cortland", "Delaware", "Dutchess",
    "Erie", "Essex", "Franklin", "Fulton", "Genesee", "Greene", "Hamilton", "Herkimer",
    "Jefferson", "Kings", "Lewis", "Livingston", "Madison", "Monroe", "Montgomery",
    "Nassau", "New York", "Niagara", "Oneida", "Onondaga", "Ontario", "Orange",
    "Orleans", "Oswego", "Otsego", "Putnam", "Queens", "Rensselaer", "Richmond",
    "Rockland", "Saratoga", "Schenectady", "Schoharie", "Schuyler", "Seneca",
    "St. Lawrence", "Steuben", "Suffolk", "Sullivan", "Tioga", "Tompkins", "Ulster",
    "Warren", "Washington", "Wayne", "Westchester", "Wyoming", "Yates",
];

/// Names from `names` starting with `prefix`, case-insensitively, in list order
///
/// An empty (or whitespace-only) prefix yields no suggestions.
pub fn suggest<'a>(prefix: &str, names: &[&'a str]) -> Vec<&'a str> {
    let prefix = prefix.trim_start().to_lowercase();
    if prefix.trim().is_empty() {
        return Vec::new();
    }

    names
        .iter()
        .copied()
        .filter(|name| name.to_lowercase().starts_with(&prefix))
        .collect()
}

/// Suggestions from the New York county reference list
pub fn suggest_counties(prefix: &str) -> Vec<&'static str> {
    suggest(prefix, &NEW_YORK_COUNTIES)
}
