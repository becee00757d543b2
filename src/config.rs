use lazy_static::lazy_static;
use serde::Serialize;

/// A named rating criterion with its weight in percent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Aspect {
    pub name: &'static str,
    pub weight: u32,
}

/// A candidate on the ballot, grouped under a district.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub name: &'static str,
    pub district: &'static str,
}

/// The fixed aspect list. Weights are percentages and sum to 100.
pub const ASPECTS: [Aspect; 8] = [
    Aspect { name: "Kejujuran", weight: 15 },
    Aspect { name: "Loyalitas", weight: 15 },
    Aspect { name: "Penyelesaian pekerjaan", weight: 15 },
    Aspect { name: "Kualitas pekerjaan", weight: 15 },
    Aspect { name: "Kerjasama", weight: 10 },
    Aspect { name: "Pengembangan diri", weight: 10 },
    Aspect { name: "Komunikasi", weight: 10 },
    Aspect { name: "Percaya diri", weight: 10 },
];

/// The (district, candidate names) roster. Static configuration; votes only
/// store the candidate name and are trusted to match this list.
pub const DISTRICTS: [(&str, [&str; 3]); 8] = [
    ("Tanah Abang", ["Siti Sofwati", "Suherno", "Luli Huriah"]),
    ("Menteng", ["Lisnawati", "Ratwi", "Roberto"]),
    ("Senen", ["Puji Lestari", "Rina Rulina", "Annisa Eka Aulia"]),
    ("Johar Baru", ["Umi Nadiroh", "Yuliani zaizah", "dewi damayanti"]),
    ("Cempaka Putih", ["Murni Asih", "Caesar agni", "fitri mulyant"]),
    ("Kemayoran", ["naufal", "meita yosnita", "rizalina"]),
    ("Sawah besar", ["nilam sarwani simbolon", "tasya khafifah", "M Ajid"]),
    ("Gambir", ["Siti Ramayanti", "Padame Siahaan", "Corina"]),
];

lazy_static! {
    /// Roster flattened in declaration order.
    pub static ref ALL_CANDIDATES: Vec<Candidate> = DISTRICTS
        .iter()
        .flat_map(|(district, names)| {
            names.iter().map(move |name| Candidate { name, district })
        })
        .collect();
}

/// Canonical form of an aspect name: trimmed and lowercased. Score-mapping
/// keys are normalized with this at write time so that aggregation can match
/// them by plain equality instead of fuzzy case-insensitive search.
pub fn normalize_aspect(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Weight of the aspect whose normalized name equals `normalized`, if any.
pub fn aspect_weight(normalized: &str) -> Option<u32> {
    ASPECTS
        .iter()
        .find(|aspect| normalize_aspect(aspect.name) == normalized)
        .map(|aspect| aspect.weight)
}

pub fn all_candidates() -> &'static [Candidate] {
    &ALL_CANDIDATES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: u32 = ASPECTS.iter().map(|a| a.weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn roster_has_three_candidates_per_district() {
        assert_eq!(all_candidates().len(), 24);
    }

    #[test]
    fn aspect_lookup_is_case_insensitive_via_normalization() {
        assert_eq!(aspect_weight(&normalize_aspect("KEJUJURAN")), Some(15));
        assert_eq!(aspect_weight(&normalize_aspect("  kerjasama ")), Some(10));
        assert_eq!(aspect_weight(&normalize_aspect("tidak ada")), None);
    }
}
