//! Deterministic media filenames.
//!
//! Every derived artifact (audio, images, cache folders) is named from the
//! row index plus the source text, so re-running on identical input
//! reproduces identical names. The short content hash keeps two texts that
//! truncate to the same slug from colliding.

use sha2::{Digest, Sha256};

/// Maximum slug length before the hash suffix takes over disambiguation.
const SLUG_MAX_LEN: usize = 40;

/// Slugify a sentence to a short, stable, filesystem-friendly name.
///
/// Lowercases, strips diacritics, drops everything outside `[a-z0-9 -]`,
/// collapses whitespace runs to single hyphens, and caps the length.
pub fn slugify_sentence(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut last_was_space = true;

    for c in text.chars() {
        let c = fold_diacritic(c);
        if c.is_ascii_alphanumeric() {
            cleaned.push(c.to_ascii_lowercase());
            last_was_space = false;
        } else if c == '-' {
            cleaned.push('-');
            last_was_space = false;
        } else if c.is_whitespace() {
            if !last_was_space {
                cleaned.push('-');
                last_was_space = true;
            }
        }
        // everything else is dropped
    }

    let mut short: String = cleaned.chars().take(SLUG_MAX_LEN).collect();
    while short.ends_with('-') {
        short.pop();
    }

    if short.is_empty() {
        "media".to_string()
    } else {
        short
    }
}

/// ASCII-fold the Latin diacritics that show up in front/back language
/// pairs (German and friends). Unmapped characters pass through and are
/// filtered by the alphanumeric check in [`slugify_sentence`].
fn fold_diacritic(c: char) -> char {
    match c {
        'ä' | 'à' | 'á' | 'â' | 'ã' | 'å' => 'a',
        'Ä' | 'À' | 'Á' | 'Â' | 'Ã' | 'Å' => 'A',
        'ö' | 'ò' | 'ó' | 'ô' | 'õ' => 'o',
        'Ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' => 'O',
        'ü' | 'ù' | 'ú' | 'û' => 'u',
        'Ü' | 'Ù' | 'Ú' | 'Û' => 'U',
        'ë' | 'è' | 'é' | 'ê' => 'e',
        'Ë' | 'È' | 'É' | 'Ê' => 'E',
        'ï' | 'ì' | 'í' | 'î' => 'i',
        'Ï' | 'Ì' | 'Í' | 'Î' => 'I',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        'ß' => 's',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Stable short hash so filenames stay unique even when slugs repeat.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}

/// Build a filename combining zero-padded index, slug, and content hash.
///
/// Pass an empty `ext` to get a bare name suitable for a cache folder.
pub fn build_filename(index: usize, sentence: &str, ext: &str) -> String {
    format!(
        "{:03}-{}-{}{}",
        index,
        slugify_sentence(sentence),
        short_hash(sentence),
        ext
    )
}
