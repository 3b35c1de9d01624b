use regex::Regex;
use std::sync::OnceLock;

/// Separator used when turning a canonical title into a catalog slug.
pub const SLUG_SEPARATOR: char = '-';

/// Filler tokens that storefronts append to titles (edition qualifiers,
/// platform tags, regional pass names). Matched as whole words only, in
/// this order, so multi-word phrases run before the single words they contain.
pub const FILLER_TOKENS: [&str; 14] = [
    "game of the year",
    "director's cut",
    "friend's pass",
    "xbox series x",
    "xbox one",
    "edition",
    "premium",
    "deluxe",
    "standard",
    "ultimate",
    "goty",
    "ps4",
    "ps5",
    "pc",
];

const MARK_GLYPHS: [char; 3] = ['\u{2122}', '\u{00ae}', '\u{00a9}'];

fn filler_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FILLER_TOKENS
            .iter()
            .map(|word| {
                Regex::new(&format!(r"\b{}\b", regex::escape(word)))
                    .expect("filler token pattern is a valid regex")
            })
            .collect()
    })
}

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]").expect("static regex"))
}

/// Filler phrases re-expressed as canonical token sequences ("director's cut"
/// becomes `["director", "s", "cut"]`).
fn canonical_fillers() -> &'static [Vec<String>] {
    static FILLERS: OnceLock<Vec<Vec<String>>> = OnceLock::new();
    FILLERS.get_or_init(|| {
        FILLER_TOKENS
            .iter()
            .map(|word| {
                disallowed_chars()
                    .replace_all(word, " ")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    })
}

/// Canonicalize a raw storefront title into the form used for cross-store matching.
///
/// Steps:
/// - lowercase
/// - drop trademark, registration and copyright glyphs
/// - remove filler tokens on word boundaries ("pc" survives inside "topcat")
/// - replace anything outside `[a-z0-9\s]` with a space
/// - collapse whitespace and trim
///
/// A final token pass removes filler sequences that only become whole words
/// after punctuation is flattened (`xbox_one`), which keeps the function idempotent.
pub fn normalize(raw_title: &str) -> String {
    let mut title = raw_title.to_lowercase();
    title.retain(|c| !MARK_GLYPHS.contains(&c));

    for pattern in filler_patterns() {
        if pattern.is_match(&title) {
            title = pattern.replace_all(&title, "").into_owned();
        }
    }

    let flattened = disallowed_chars().replace_all(&title, " ");
    let mut tokens: Vec<&str> = flattened.split_whitespace().collect();
    strip_filler_sequences(&mut tokens);
    tokens.join(" ")
}

fn strip_filler_sequences(tokens: &mut Vec<&str>) {
    loop {
        let mut changed = false;
        let mut i = 0;
        while i < tokens.len() {
            let hit = canonical_fillers().iter().find(|filler| {
                !filler.is_empty()
                    && tokens.len() - i >= filler.len()
                    && filler.iter().zip(&tokens[i..]).all(|(f, t)| f.as_str() == *t)
            });
            match hit {
                Some(filler) => {
                    tokens.drain(i..i + filler.len());
                    changed = true;
                }
                None => i += 1,
            }
        }
        if !changed {
            break;
        }
    }
}

/// Slug for an already-canonical title.
pub fn slug_for(canonical_title: &str) -> String {
    canonical_title.replace(' ', &SLUG_SEPARATOR.to_string())
}

/// Canonical title plus its slug, computed together at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTitle {
    pub title: String,
    pub slug: String,
}

impl CanonicalTitle {
    pub fn new(raw_title: &str) -> Self {
        let title = normalize(raw_title);
        let slug = slug_for(&title);
        Self { title, slug }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
    }
}
