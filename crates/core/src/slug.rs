//! URL slugs for products and categories.

/// Fold the accented letters used in Spanish product names to ASCII.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other,
    }
}

/// Split `input` into ASCII alphanumeric words after accent folding.
pub(crate) fn words(input: &str) -> impl Iterator<Item = String> + '_ {
    input
        .split(|c: char| !fold_accent(c).is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.chars().map(fold_accent).collect())
}

/// Build a lowercase, hyphen-separated slug.
///
/// ```
/// use vitrina_core::slug::slugify;
///
/// assert_eq!(slugify("Remera Algodón  Niño"), "remera-algodon-nino");
/// assert_eq!(slugify("  --  "), "");
/// ```
#[must_use]
pub fn slugify(input: &str) -> String {
    words(input)
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_separators() {
        assert_eq!(slugify("Buzo / Hoodie (Oversize)"), "buzo-hoodie-oversize");
    }

    #[test]
    fn test_keeps_digits() {
        assert_eq!(slugify("Pack x3 Medias 2024"), "pack-x3-medias-2024");
    }

    #[test]
    fn test_drops_unmapped_symbols() {
        assert_eq!(slugify("Café & Té ☕"), "cafe-te");
    }
}
