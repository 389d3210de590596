//! Persona roster construction, the INITIALIZING-phase work.
//!
//! Personas are drawn from a fixed table of audience archetypes rather than
//! generated by an LLM: the expensive, failable model call belongs to the
//! evaluator seam, not to roster setup. `diversity_level` controls how many
//! distinct archetypes the roster draws from; minority-perspective
//! archetypes get a reserved share when enabled. Composition is
//! deterministic for a given seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crowdlens_common::{Persona, SimulationConfig};

struct SegmentArchetype {
    name: &'static str,
    age_range: &'static str,
    occupations: &'static [&'static str],
    interests: &'static [&'static str],
    media_diet: &'static str,
    minority_perspective: bool,
}

const ARCHETYPES: &[SegmentArchetype] = &[
    SegmentArchetype {
        name: "young professionals",
        age_range: "25-34",
        occupations: &["software engineer", "product manager", "consultant", "nurse"],
        interests: &["career growth", "technology", "fitness", "travel"],
        media_diet: "newsletters and social feeds, mostly on mobile",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "established parents",
        age_range: "35-49",
        occupations: &["teacher", "accountant", "operations manager", "physician"],
        interests: &["family", "education", "personal finance", "local news"],
        media_diet: "morning news sites and a few trusted podcasts",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "students",
        age_range: "18-24",
        occupations: &["undergraduate", "graduate student", "barista", "intern"],
        interests: &["pop culture", "gaming", "social causes", "music"],
        media_diet: "short-form video and group chats",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "retirees",
        age_range: "65+",
        occupations: &["retired teacher", "retired engineer", "volunteer coordinator"],
        interests: &["health", "gardening", "community events", "history"],
        media_diet: "print papers, evening TV news, email digests",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "skilled trades",
        age_range: "30-54",
        occupations: &["electrician", "contractor", "machinist", "chef"],
        interests: &["tools and gear", "sports", "small business", "DIY"],
        media_diet: "radio, YouTube channels, trade forums",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "creative freelancers",
        age_range: "25-44",
        occupations: &["designer", "writer", "photographer", "musician"],
        interests: &["art", "design", "indie media", "side projects"],
        media_diet: "niche blogs and curated feeds",
        minority_perspective: false,
    },
    SegmentArchetype {
        name: "recent immigrants",
        age_range: "22-45",
        occupations: &["lab technician", "rideshare driver", "restaurant owner", "researcher"],
        interests: &["community networks", "language learning", "remittances", "local services"],
        media_diet: "diaspora media and messaging apps alongside local outlets",
        minority_perspective: true,
    },
    SegmentArchetype {
        name: "rural households",
        age_range: "30-64",
        occupations: &["farmer", "school bus driver", "clinic aide", "co-op manager"],
        interests: &["agriculture", "weather", "county politics", "faith community"],
        media_diet: "local radio and weekly papers, patchy broadband",
        minority_perspective: true,
    },
];

const FIRST_NAMES: &[&str] = &[
    "Alex", "Bea", "Carmen", "Dmitri", "Elena", "Farid", "Grace", "Hiro", "Imani", "Jonas",
    "Keisha", "Luca", "Mei", "Noor", "Otis", "Priya", "Quinn", "Rosa", "Sam", "Tomas",
];

/// Build the persona roster for a job. The segment composition and
/// attributes are deterministic for a given seed; ids are fresh uuids.
pub fn build_roster(config: &SimulationConfig, seed: u64) -> Vec<Persona> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mainstream: Vec<&SegmentArchetype> =
        ARCHETYPES.iter().filter(|a| !a.minority_perspective).collect();
    let minority: Vec<&SegmentArchetype> =
        ARCHETYPES.iter().filter(|a| a.minority_perspective).collect();

    // diversity 0.0 draws a single archetype, 1.0 draws all of them.
    let draw = 1 + (config.diversity_level * (mainstream.len() - 1) as f64).round() as usize;
    let chosen: Vec<&SegmentArchetype> = mainstream.into_iter().take(draw).collect();

    let total = config.num_personas;
    let minority_slots = if config.include_minority_perspectives {
        (total / 10).max(1)
    } else {
        0
    };

    let mut roster = Vec::with_capacity(total);
    for i in 0..total {
        let archetype = if i < minority_slots {
            minority[i % minority.len()]
        } else {
            chosen[(i - minority_slots) % chosen.len()]
        };
        roster.push(sample_persona(archetype, &mut rng));
    }
    roster
}

fn sample_persona(archetype: &SegmentArchetype, rng: &mut StdRng) -> Persona {
    let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
    let initial = (b'A' + rng.random_range(0..26u8)) as char;
    let occupation = archetype.occupations[rng.random_range(0..archetype.occupations.len())];

    // Two or three interests, order preserved from the archetype pool.
    let count = 2 + rng.random_range(0..2usize);
    let start = rng.random_range(0..archetype.interests.len());
    let interests: Vec<String> = (0..count)
        .map(|k| archetype.interests[(start + k) % archetype.interests.len()].to_string())
        .collect();

    Persona {
        id: Uuid::new_v4(),
        name: format!("{first} {initial}."),
        segment: archetype.name.to_string(),
        age_range: archetype.age_range.to_string(),
        occupation: occupation.to_string(),
        interests,
        media_diet: archetype.media_diet.to_string(),
        minority_perspective: archetype.minority_perspective,
    }
}
