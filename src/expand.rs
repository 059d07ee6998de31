//! Static query expansion for domain vocabulary.
//!
//! The embedding model associates some sports terms poorly, so a handful of
//! topical phrases are widened into fixed synonym lists before retrieval.
//! The table is an ordered slice: the first matching trigger wins.

const FOOTBALL: &str = "football";
const SOCCER: &str = "soccer (association football)";

/// Trigger phrase → synonym phrases, in match-priority order.
const EXPANSIONS: &[(&str, &[&str])] = &[
    (
        "football rules",
        &[
            "soccer rules",
            "FIFA rules",
            "laws of the game",
            "association football regulations",
        ],
    ),
    (
        "football positions",
        &[
            "soccer positions",
            "striker",
            "midfielder",
            "defender",
            "goalkeeper",
        ],
    ),
    (
        "football training",
        &[
            "soccer drills",
            "soccer practice",
            "ball control exercises",
            "passing drills",
            "shooting drills",
        ],
    ),
    (
        "basketball rules",
        &[
            "FIBA rules",
            "basketball regulations",
            "official basketball rules",
        ],
    ),
    (
        "basketball positions",
        &[
            "point guard",
            "shooting guard",
            "small forward",
            "power forward",
            "center",
        ],
    ),
    (
        "basketball training",
        &[
            "basketball drills",
            "shooting practice",
            "dribbling drills",
            "defensive drills",
        ],
    ),
    (
        "tennis rules",
        &["ITF rules", "tennis regulations", "tennis scoring system"],
    ),
    (
        "tennis training",
        &[
            "tennis drills",
            "serve practice",
            "forehand drills",
            "backhand drills",
        ],
    ),
    (
        "padel rules",
        &[
            "padel regulations",
            "official padel rules",
            "world padel tour rules",
        ],
    ),
    (
        "padel training",
        &[
            "padel drills",
            "padel forehand",
            "padel backhand",
            "padel serve practice",
        ],
    ),
    (
        "swimming styles",
        &[
            "swimming strokes",
            "butterfly stroke",
            "backstroke",
            "breaststroke",
            "freestyle",
        ],
    ),
    (
        "swimming training",
        &[
            "swimming drills",
            "swimming endurance",
            "kickboard exercises",
        ],
    ),
    (
        "cardio exercise",
        &[
            "aerobic exercise",
            "endurance training",
            "running",
            "cycling",
            "jump rope",
        ],
    ),
    (
        "yoga",
        &[
            "asanas",
            "yoga poses",
            "yoga practice",
            "yoga breathing",
            "yoga styles",
        ],
    ),
    (
        "warm up",
        &[
            "pre-exercise warmup",
            "dynamic stretching",
            "mobility exercises",
        ],
    ),
    (
        "cooldown",
        &[
            "post-exercise cooldown",
            "static stretching",
            "relaxation exercises",
        ],
    ),
    (
        "hiit",
        &[
            "high intensity interval training",
            "interval workouts",
            "tabata training",
        ],
    ),
    (
        "stretching",
        &[
            "flexibility exercises",
            "mobility drills",
            "static stretches",
            "dynamic stretches",
        ],
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExpander;

impl QueryExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a query into search variants. Never empty; the first element
    /// is always the normalized query.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let normalized = normalize_football(query);
        let haystack = normalized.to_lowercase();

        for (trigger, synonyms) in EXPANSIONS {
            let trigger = normalize_football(trigger).to_lowercase();
            if haystack.contains(&trigger) {
                let mut variants = Vec::with_capacity(1 + synonyms.len());
                variants.push(normalized);
                variants.extend(synonyms.iter().map(|s| s.to_string()));
                return variants;
            }
        }

        vec![normalized]
    }
}

/// Rewrites every case-insensitive occurrence of "football" to the
/// unambiguous soccer wording.
pub fn normalize_football(text: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in lower.match_indices(FOOTBALL) {
        out.push_str(&text[last..idx]);
        out.push_str(SOCCER);
        last = idx + FOOTBALL.len();
    }
    out.push_str(&text[last..]);
    out
}
