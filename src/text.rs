//! Text helpers for prompts, search queries, and card formatting.
//!
//! Rows carry sentences like `Ich füttere (die Katze).` — the parenthetical
//! marks the vocabulary term. These helpers turn that into a clean image
//! generation prompt, a focused search query, and a colorized card back.

use std::sync::OnceLock;

use regex::Regex;

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"))
}

fn article_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(der|die|das|den|dem|des)\s+").expect("valid regex"))
}

fn verb_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-zäöüß]+(en|ern|eln)$").expect("valid regex"))
}

/// First parenthetical term in the text, trimmed.
pub fn extract_paren_term(text: &str) -> Option<String> {
    paren_re()
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Inline parentheticals (keeping the word), collapse whitespace, tidy
/// punctuation spacing, and make sure the sentence ends with punctuation.
pub fn clean_sentence(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let inlined = paren_re().replace_all(text, |caps: &regex::Captures| {
        format!(" {} ", &caps[1])
    });

    let mut out = String::with_capacity(inlined.len());
    let mut last_was_space = true;
    for c in inlined.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            if matches!(c, '.' | ',' | '!' | '?' | ';' | ':') && out.ends_with(' ') {
                out.pop();
            }
            out.push(c);
            last_was_space = false;
        }
    }
    let mut out = out.trim().to_string();

    while out.contains("..") {
        out = out.replace("..", ".");
    }
    if !out.is_empty() && !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Build the generation prompt for a row: cleaned sentence, emphasis on the
/// parenthetical term when present, optional style hint, and an explicit
/// no-text constraint so the renderer does not letter the image.
pub fn build_generation_prompt(text: &str, style: Option<&str>) -> String {
    let sentence = clean_sentence(text);
    let focus = match extract_paren_term(text) {
        Some(term) => format!(" Emphasize \"{term}\" as the main, clearly recognizable subject."),
        None => String::new(),
    };
    let style_hint = match style {
        Some(s) if !s.is_empty() => format!(" Style: {s}."),
        _ => String::new(),
    };
    format!(
        "{sentence} The image should represent this sentence faithfully.{focus}{style_hint} \
         No text, letters, numbers, captions, watermarks, logos, or typography. \
         Simple composition, clean background if needed."
    )
}

/// Derive an image search query: prefer the parenthetical term with any
/// leading German article stripped, else the raw trimmed text.
pub fn image_query_from_sentence(text: &str) -> String {
    match extract_paren_term(text) {
        Some(term) => article_re().replace(&term, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Wrap the first parenthetical term in a colored span.
///
/// The color follows a fixed heuristic on the term: grammatical gender
/// article picks the article color, a verb-like suffix picks the verb
/// color, anything else gets the default. Text without a parenthetical
/// passes through unchanged.
pub fn colorize_paren_term(back: &str) -> String {
    let Some(m) = paren_re().captures(back) else {
        return back.to_string();
    };
    let term = m[1].trim().to_string();
    let lower = term.to_lowercase();

    let mut color = "#ca8a04";
    if lower.starts_with("der ") {
        color = "#1e40af";
    } else if lower.starts_with("die ") {
        color = "#dc2626";
    } else if lower.starts_with("das ") {
        color = "#16a34a";
    } else if verb_suffix_re().is_match(&lower) {
        color = "#ca8a04";
    }

    let span = format!("(<span style=\"color:{color}\">{term}</span>)");
    back.replacen(&m[0], &span, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_sentence_inlines_parenthetical() {
        assert_eq!(
            clean_sentence("Ich füttere (die Katze)"),
            "Ich füttere die Katze."
        );
    }

    #[test]
    fn test_clean_sentence_tidies_spacing_and_dots() {
        assert_eq!(clean_sentence("Hallo ,  Welt .."), "Hallo, Welt.");
    }

    #[test]
    fn test_query_prefers_paren_term_without_article() {
        assert_eq!(image_query_from_sentence("Ich sehe (die Katze)."), "Katze");
        assert_eq!(image_query_from_sentence("den Hund füttern"), "den Hund füttern");
    }

    #[test]
    fn test_colorize_without_paren_is_identity() {
        assert_eq!(colorize_paren_term("plain text"), "plain text");
    }

    #[test]
    fn test_colorize_die_uses_red() {
        let out = colorize_paren_term("Ich sehe (die Katze).");
        assert!(out.contains("color:#dc2626"));
        assert!(out.contains(">die Katze</span>"));
    }

    #[test]
    fn test_colorize_der_and_das() {
        assert!(colorize_paren_term("(der Hund)").contains("#1e40af"));
        assert!(colorize_paren_term("(das Haus)").contains("#16a34a"));
    }

    #[test]
    fn test_colorize_verb_suffix_uses_default() {
        assert!(colorize_paren_term("(füttern)").contains("#ca8a04"));
    }

    #[test]
    fn test_prompt_mentions_term_and_no_text() {
        let prompt = build_generation_prompt("Ich sehe (die Katze)", Some("comic"));
        assert!(prompt.contains("die Katze"));
        assert!(prompt.contains("Style: comic."));
        assert!(prompt.contains("No text"));
    }
}
