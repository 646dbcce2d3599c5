/// String normalization and similarity utilities shared by the city
/// resolver, the deduplicator and slug generation.
pub struct TextUtils;

impl TextUtils {
    /// Replace accented latin characters with their plain ASCII equivalent.
    pub fn strip_accents(input: &str) -> String {
        input
            .chars()
            .map(|c| match c {
                'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
                'é' | 'è' | 'ê' | 'ë' => 'e',
                'í' | 'ì' | 'î' | 'ï' => 'i',
                'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
                'ú' | 'ù' | 'û' | 'ü' => 'u',
                'ñ' => 'n',
                'ç' => 'c',
                'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'A',
                'É' | 'È' | 'Ê' | 'Ë' => 'E',
                'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
                'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
                'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
                'Ñ' => 'N',
                'Ç' => 'C',
                other => other,
            })
            .collect()
    }

    /// Normalize a string for matching: accent-stripped, lowercased, trimmed,
    /// inner whitespace collapsed to single spaces.
    pub fn normalize(input: &str) -> String {
        Self::strip_accents(input)
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Levenshtein distance between two strings, by chars.
    pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
        let chars1: Vec<char> = s1.chars().collect();
        let chars2: Vec<char> = s2.chars().collect();
        let len1 = chars1.len();
        let len2 = chars2.len();

        let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

        for i in 0..=len1 {
            matrix[i][0] = i;
        }
        for j in 0..=len2 {
            matrix[0][j] = j;
        }

        for i in 1..=len1 {
            for j in 1..=len2 {
                let cost = if chars1[i - 1] == chars2[j - 1] { 0 } else { 1 };
                matrix[i][j] = (matrix[i - 1][j] + 1)
                    .min(matrix[i][j - 1] + 1)
                    .min(matrix[i - 1][j - 1] + cost);
            }
        }

        matrix[len1][len2]
    }

    /// Similarity in [0, 1] as `1 - distance / max_len` over normalized text.
    pub fn similarity(s1: &str, s2: &str) -> f64 {
        let n1 = Self::normalize(s1);
        let n2 = Self::normalize(s2);

        if n1 == n2 {
            return 1.0;
        }

        let len1 = n1.chars().count();
        let len2 = n2.chars().count();
        if len1 == 0 || len2 == 0 {
            return 0.0;
        }

        let max_len = len1.max(len2);
        let distance = Self::levenshtein_distance(&n1, &n2);

        1.0 - (distance as f64 / max_len as f64)
    }

    /// True when any artist appears in both lists, case/accent-insensitive.
    pub fn artists_overlap(a: &[String], b: &[String]) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        let right: Vec<String> = b.iter().map(|s| Self::normalize(s)).collect();
        a.iter()
            .map(|s| Self::normalize(s))
            .any(|artist| right.contains(&artist))
    }

    /// URL-friendly slug base: accents stripped, lowercased, runs of
    /// non-alphanumerics collapsed into single hyphens.
    pub fn slug_base(input: &str) -> String {
        Self::strip_accents(input)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_accents() {
        assert_eq!(TextUtils::strip_accents("Córdoba"), "Cordoba");
        assert_eq!(TextUtils::strip_accents("Año Nuevo"), "Ano Nuevo");
        assert_eq!(TextUtils::strip_accents("peña"), "pena");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(TextUtils::normalize("  Mar   del  Plata "), "mar del plata");
        assert_eq!(TextUtils::normalize("CÓRDOBA"), "cordoba");
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = "Festival de Jazz";
        let b = "Festival del Jazz";
        assert_eq!(TextUtils::similarity(a, b), TextUtils::similarity(b, a));
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(TextUtils::similarity("teatro colon", "Teatro Colón"), 1.0);
        assert_eq!(TextUtils::similarity("", "algo"), 0.0);
        let s = TextUtils::similarity("milonga en el patio", "feria del libro");
        assert!(s >= 0.0 && s < 0.5);
    }

    #[test]
    fn test_artists_overlap() {
        let a = vec!["La Delio Valdez".to_string(), "Acru".to_string()];
        let b = vec!["ACRU".to_string()];
        let c = vec!["Wos".to_string()];
        assert!(TextUtils::artists_overlap(&a, &b));
        assert!(!TextUtils::artists_overlap(&a, &c));
        assert!(!TextUtils::artists_overlap(&a, &[]));
    }

    #[test]
    fn test_slug_base() {
        assert_eq!(TextUtils::slug_base("Noche de Peña: ¡Folklore!"), "noche-de-pena-folklore");
        assert_eq!(TextUtils::slug_base("  Feria  del Libro  "), "feria-del-libro");
        assert_eq!(TextUtils::slug_base("Rock & Pop"), "rock-pop");
    }
}
