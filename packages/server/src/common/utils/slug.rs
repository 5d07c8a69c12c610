use sha2::{Digest, Sha256};

/// Normalize a display name into a URL slug.
///
/// Normalization rules:
/// - Fold the accented characters found in French civil-status names to ASCII
/// - Convert to lowercase
/// - Collapse every run of non-alphanumeric characters into a single hyphen
/// - Trim leading/trailing hyphens
pub fn slugify(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for c in input.chars() {
        match fold_diacritic(c) {
            Some(ascii) => folded.push_str(ascii),
            None if c.is_ascii_alphanumeric() => folded.push(c.to_ascii_lowercase()),
            None => folded.push(' '),
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Short deterministic fingerprint appended to slugs: the first 6 hex
/// characters of a SHA-256 over the identity fields.
pub fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..6].to_string()
}

/// Fold the accented characters that occur in French civil-status names.
fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' | 'å' | 'À' | 'Â' | 'Ä' | 'Á' | 'Ã' | 'Å' => "a",
        'ç' | 'Ç' => "c",
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => "e",
        'î' | 'ï' | 'í' | 'ì' | 'Î' | 'Ï' | 'Í' | 'Ì' => "i",
        'ñ' | 'Ñ' => "n",
        'ô' | 'ö' | 'ó' | 'ò' | 'õ' | 'Ô' | 'Ö' | 'Ó' | 'Ò' | 'Õ' => "o",
        'ù' | 'û' | 'ü' | 'ú' | 'Ù' | 'Û' | 'Ü' | 'Ú' => "u",
        'ÿ' | 'ý' | 'Ÿ' | 'Ý' => "y",
        'æ' | 'Æ' => "ae",
        'œ' | 'Œ' => "oe",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_hyphenates() {
        assert_eq!(slugify("Jean Dupont"), "jean-dupont");
    }

    #[test]
    fn test_folds_diacritics() {
        assert_eq!(slugify("Éléonore Dupré"), "eleonore-dupre");
        assert_eq!(slugify("François Lœb"), "francois-loeb");
    }

    #[test]
    fn test_collapses_separator_runs() {
        assert_eq!(slugify("Jean--Pierre  d'Arc"), "jean-pierre-d-arc");
    }

    #[test]
    fn test_trims_leading_and_trailing_separators() {
        assert_eq!(slugify("--abc--"), "abc");
        assert_eq!(slugify("  abc  "), "abc");
    }

    #[test]
    fn test_unmapped_characters_become_separators() {
        assert_eq!(slugify("Jean\u{4e2d}Dupont"), "jean-dupont");
    }

    #[test]
    fn test_empty_input_gives_empty_slug() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_short_hash_is_deterministic() {
        assert_eq!(
            short_hash(&["Jean", "Dupont", "20251201"]),
            short_hash(&["Jean", "Dupont", "20251201"])
        );
    }

    #[test]
    fn test_short_hash_is_six_hex_chars() {
        let hash = short_hash(&["Jean", "Dupont", "20251201"]);
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_hash_differs_per_identity() {
        assert_ne!(
            short_hash(&["Jean", "Dupont", "20251201"]),
            short_hash(&["Jean", "Dupont", "20251202"])
        );
        // Separator keeps field boundaries significant.
        assert_ne!(
            short_hash(&["ab", "c"]),
            short_hash(&["a", "bc"])
        );
    }
}
