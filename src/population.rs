//! Generated item names for populating zones.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use spasy_tree::geocode::ALPHABET;
use std::io;
use std::path::Path;

/// Words used when no word list is configured.
pub const DEFAULT_WORDS: &[&str] = &[
    "ball", "bench", "bike", "cone", "door", "flag", "hydrant", "lamp", "mailbox", "net",
    "rock", "sign", "statue", "tree", "well",
];

/// Read a word list, one word per line. Blank lines and `#` comments are
/// skipped; slashes are not allowed inside a word.
pub fn load_words(path: Option<&Path>) -> io::Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(DEFAULT_WORDS.iter().map(|w| w.to_string()).collect());
    };

    let words: Vec<String> = std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.replace('/', "_").to_lowercase())
        .collect();

    if words.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("word list {} is empty", path.display()),
        ));
    }
    Ok(words)
}

/// A random location code inside `zone`, `depth` characters longer.
pub fn random_code(rng: &mut impl Rng, zone: &str, depth: usize) -> String {
    let alphabet = ALPHABET.as_bytes();
    let mut code = String::with_capacity(zone.len() + depth);
    code.push_str(zone);
    for _ in 0..depth {
        code.push(alphabet[rng.gen_range(0..alphabet.len())] as char);
    }
    code
}

/// `count` distinct item names in `zone`, reproducible from `seed`.
pub fn item_names(zone: &str, depth: usize, count: usize, seed: u64, words: &[String]) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| item_name(&mut rng, zone, depth, words, &format!("{}-{}", seed, i)))
        .collect()
}

/// One item name shaped `/<owner>/<thing>-<tag>/_v0/<code>`.
pub fn item_name(rng: &mut impl Rng, zone: &str, depth: usize, words: &[String], tag: &str) -> String {
    let owner = words.choose(rng).map(String::as_str).unwrap_or("item");
    let thing = words.choose(rng).map(String::as_str).unwrap_or("item");
    format!("/{}/{}-{}/_v0/{}", owner, thing, tag, random_code(rng, zone, depth))
}
