//! Color x size variant generation.
//!
//! The back-office lets an admin type a list of colors and a list of sizes and
//! get one variant per combination, each with its own SKU and stock. The
//! server owns the generation so SKUs are consistent no matter which client
//! created them.

use serde::{Deserialize, Serialize};

use crate::slug::words;

/// A variant to be created for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Color label as entered (trimmed); empty when the product has no colors.
    pub color: String,
    /// Size label as entered (trimmed); empty when the product has no sizes.
    pub size: String,
    /// Generated stock keeping unit.
    pub sku: String,
    /// Initial stock.
    pub stock: i32,
}

impl VariantSpec {
    /// Human label, e.g. `Negro / XL`.
    #[must_use]
    pub fn label(&self) -> String {
        variant_label(&self.color, &self.size)
    }
}

/// Human label for a color/size pair, skipping empty parts.
#[must_use]
pub fn variant_label(color: &str, size: &str) -> String {
    [color, size]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Build a SKU from a base code and the variant axes.
///
/// Each part is uppercased with runs of non-alphanumerics collapsed to `-`;
/// empty parts are skipped.
///
/// ```
/// use vitrina_core::variants::build_sku;
///
/// assert_eq!(build_sku("rem-01", "Azul marino", "XL"), "REM-01-AZUL-MARINO-XL");
/// assert_eq!(build_sku("REM", "", "M"), "REM-M");
/// ```
#[must_use]
pub fn build_sku(base: &str, color: &str, size: &str) -> String {
    [base, color, size]
        .into_iter()
        .flat_map(words)
        .map(|w| w.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Trim, drop blanks and drop case-insensitive duplicates, keeping the first.
fn clean_axis(values: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(values.len());
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(trimmed.to_owned());
    }
    out
}

/// Generate one variant per color x size combination.
///
/// Colors form the outer loop so the output groups sizes under each color,
/// in the order they were given. When only one axis has values the other
/// contributes a single empty value; when both are empty nothing is generated.
#[must_use]
pub fn generate_variants(
    base_sku: &str,
    colors: &[String],
    sizes: &[String],
    default_stock: i32,
) -> Vec<VariantSpec> {
    let colors = clean_axis(colors);
    let sizes = clean_axis(sizes);

    if colors.is_empty() && sizes.is_empty() {
        return Vec::new();
    }

    let colors = if colors.is_empty() { vec![String::new()] } else { colors };
    let sizes = if sizes.is_empty() { vec![String::new()] } else { sizes };
    let stock = default_stock.max(0);

    let mut variants = Vec::with_capacity(colors.len() * sizes.len());
    for color in &colors {
        for size in &sizes {
            variants.push(VariantSpec {
                color: color.clone(),
                size: size.clone(),
                sku: build_sku(base_sku, color, size),
                stock,
            });
        }
    }
    variants
}
