//! Algorithmic lookalike fuzzers
//!
//! String-mutation generators producing typosquat candidates from a seed
//! domain: homoglyphs, keyboard-adjacent insertions and replacements,
//! omissions, transpositions, repetitions, bitsquatting, hyphenation,
//! subdomain splits, vowel swaps, and TLD substitution. Output is
//! deduplicated by exact FQDN with the seed itself excluded.

use std::collections::HashSet;

/// TLDs commonly swapped in by typosquatters.
const COMMON_TLDS: &[&str] = &[
    "com", "net", "org", "info", "biz", "co", "io", "app", "dev", "site",
];

/// Abuse-heavy TLDs appended to the seed's base label.
/// Source: top TLDs by malicious phishing domain share.
pub const MALICIOUS_TLDS: &[&str] = &[
    "tk", "buzz", "xyz", "top", "ga", "ml", "info", "cf", "gq", "icu", "wang", "live", "net", "cn",
    "online", "host", "org", "us", "ru",
];

/// ASCII confusables for the homoglyph fuzzer.
const HOMOGLYPHS: &[(char, &[&str])] = &[
    ('a', &["4"]),
    ('b', &["d", "lb"]),
    ('d', &["b", "cl"]),
    ('e', &["3"]),
    ('g', &["q", "9"]),
    ('i', &["1", "l"]),
    ('l', &["1", "i"]),
    ('m', &["rn", "nn"]),
    ('n', &["m"]),
    ('o', &["0"]),
    ('q', &["g"]),
    ('s', &["5"]),
    ('u', &["v"]),
    ('v', &["u"]),
    ('w', &["vv", "uu"]),
    ('z', &["2"]),
];

/// QWERTY adjacency for insertion/replacement fuzzers.
const KEYBOARD_ADJACENT: &[(char, &str)] = &[
    ('q', "wa"),
    ('w', "qes"),
    ('e', "wrd"),
    ('r', "etf"),
    ('t', "ryg"),
    ('y', "tuh"),
    ('u', "yij"),
    ('i', "uok"),
    ('o', "ipl"),
    ('p', "o"),
    ('a', "qsz"),
    ('s', "awdzx"),
    ('d', "sefxc"),
    ('f', "drgcv"),
    ('g', "fthvb"),
    ('h', "gyjbn"),
    ('j', "huknm"),
    ('k', "jilm"),
    ('l', "ko"),
    ('z', "asx"),
    ('x', "zsdc"),
    ('c', "xdfv"),
    ('v', "cfgb"),
    ('b', "vghn"),
    ('n', "bhjm"),
    ('m', "njk"),
];

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u'];

/// A generated domain variant tagged with the fuzzer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub domain: String,
    pub fuzzer: &'static str,
}

/// Split a domain into base label and TLD: "acme.com" -> ("acme", "com").
pub fn split_domain(domain: &str) -> Option<(&str, &str)> {
    let (label, tld) = domain.rsplit_once('.')?;
    if label.is_empty() || tld.is_empty() {
        return None;
    }
    Some((label, tld))
}

fn adjacent_keys(c: char) -> &'static str {
    KEYBOARD_ADJACENT
        .iter()
        .find(|(key, _)| *key == c)
        .map(|(_, adj)| *adj)
        .unwrap_or("")
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn homoglyph(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        if let Some((_, subs)) = HOMOGLYPHS.iter().find(|(orig, _)| orig == c) {
            for sub in *subs {
                let mut mutated: String = chars[..i].iter().collect();
                mutated.push_str(sub);
                mutated.extend(&chars[i + 1..]);
                out.push(mutated);
            }
        }
    }
    out
}

fn insertion(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        for adj in adjacent_keys(*c).chars() {
            let mut before: String = chars[..i].iter().collect();
            before.push(adj);
            before.extend(&chars[i..]);
            out.push(before);

            let mut after: String = chars[..=i].iter().collect();
            after.push(adj);
            after.extend(&chars[i + 1..]);
            out.push(after);
        }
    }
    out
}

fn replacement(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        for adj in adjacent_keys(*c).chars() {
            let mut mutated: String = chars[..i].iter().collect();
            mutated.push(adj);
            mutated.extend(&chars[i + 1..]);
            out.push(mutated);
        }
    }
    out
}

fn omission(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    (0..chars.len())
        .map(|i| {
            let mut mutated: String = chars[..i].iter().collect();
            mutated.extend(&chars[i + 1..]);
            mutated
        })
        .collect()
}

fn transposition(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for i in 0..chars.len().saturating_sub(1) {
        if chars[i] == chars[i + 1] {
            continue;
        }
        let mut mutated = chars.clone();
        mutated.swap(i, i + 1);
        out.push(mutated.into_iter().collect());
    }
    out
}

fn repetition(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    (0..chars.len())
        .map(|i| {
            let mut mutated: String = chars[..=i].iter().collect();
            mutated.push(chars[i]);
            mutated.extend(&chars[i + 1..]);
            mutated
        })
        .collect()
}

fn bitsquatting(label: &str) -> Vec<String> {
    if !label.is_ascii() {
        return Vec::new();
    }
    let bytes = label.as_bytes();
    let mut out = Vec::new();
    for (i, byte) in bytes.iter().enumerate() {
        for shift in 0..8 {
            let flipped = byte ^ (1 << shift);
            let c = flipped as char;
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                let mut mutated = label.to_string();
                // Domain labels are ASCII, so byte offsets are char offsets.
                mutated.replace_range(i..i + 1, &c.to_string());
                out.push(mutated);
            }
        }
    }
    out
}

fn hyphenation(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    (1..chars.len())
        .map(|i| {
            let mut mutated: String = chars[..i].iter().collect();
            mutated.push('-');
            mutated.extend(&chars[i..]);
            mutated
        })
        .collect()
}

fn vowel_swap(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        if !VOWELS.contains(c) {
            continue;
        }
        for vowel in VOWELS {
            if vowel == c {
                continue;
            }
            let mut mutated = chars.clone();
            mutated[i] = *vowel;
            out.push(mutated.into_iter().collect());
        }
    }
    out
}

/// Subdomain split: "acme.com" -> "a.cme.com".
fn subdomain(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for i in 1..chars.len() {
        if chars[i] == '-' || chars[i - 1] == '-' {
            continue;
        }
        let mut mutated: String = chars[..i].iter().collect();
        mutated.push('.');
        mutated.extend(&chars[i..]);
        out.push(mutated);
    }
    out
}

/// Run every algorithmic fuzzer against a seed domain.
///
/// Results are deduplicated by FQDN (first fuzzer wins) and never include
/// the seed itself.
pub fn all_variants(seed: &str) -> Vec<Variant> {
    let seed = seed.trim().to_lowercase();
    let Some((label, tld)) = split_domain(&seed) else {
        return Vec::new();
    };

    let fuzzers: [(&'static str, Vec<String>); 9] = [
        ("homoglyph", homoglyph(label)),
        ("insertion", insertion(label)),
        ("replacement", replacement(label)),
        ("omission", omission(label)),
        ("transposition", transposition(label)),
        ("repetition", repetition(label)),
        ("bitsquatting", bitsquatting(label)),
        ("hyphenation", hyphenation(label)),
        ("vowel-swap", vowel_swap(label)),
    ];

    let mut seen: HashSet<String> = HashSet::new();
    let mut variants = Vec::new();

    let mut push = |domain: String, fuzzer: &'static str, variants: &mut Vec<Variant>| {
        if domain != seed && seen.insert(domain.clone()) {
            variants.push(Variant { domain, fuzzer });
        }
    };

    for (fuzzer, labels) in fuzzers {
        for mutated in labels {
            if !valid_label(&mutated) {
                continue;
            }
            push(format!("{mutated}.{tld}"), fuzzer, &mut variants);
        }
    }

    // Subdomain splits keep the label intact but shift a dot into it.
    for mutated in subdomain(label) {
        push(format!("{mutated}.{tld}"), "subdomain", &mut variants);
    }

    // TLD substitution across the common gTLDs.
    for swap_tld in COMMON_TLDS {
        if *swap_tld != tld {
            push(format!("{label}.{swap_tld}"), "tld-swap", &mut variants);
        }
    }

    variants
}

/// Expand the seed's base label across the abuse-heavy TLD list, skipping
/// the seed's own TLD.
pub fn malicious_tld_variants(seed: &str) -> Vec<Variant> {
    let seed = seed.trim().to_lowercase();
    let Some((label, tld)) = split_domain(&seed) else {
        return Vec::new();
    };

    MALICIOUS_TLDS
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(tld))
        .map(|t| Variant {
            domain: format!("{label}.{t}"),
            fuzzer: "tld-swap",
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_domain() {
        assert_eq!(split_domain("acme.com"), Some(("acme", "com")));
        assert_eq!(split_domain("www.acme.com"), Some(("www.acme", "com")));
        assert_eq!(split_domain("acme"), None);
    }

    #[test]
    fn test_seed_never_included() {
        let variants = all_variants("acme.com");
        assert!(!variants.iter().any(|v| v.domain == "acme.com"));
        assert!(!variants.is_empty());
    }

    #[test]
    fn test_variants_are_unique() {
        let variants = all_variants("acme.com");
        let mut seen = HashSet::new();
        for v in &variants {
            assert!(seen.insert(&v.domain), "duplicate variant: {}", v.domain);
        }
    }

    #[test]
    fn test_homoglyph_examples() {
        let variants = all_variants("acme.com");
        assert!(variants
            .iter()
            .any(|v| v.domain == "acrne.com" && v.fuzzer == "homoglyph"));
    }

    #[test]
    fn test_omission_and_transposition() {
        let variants = all_variants("acme.com");
        assert!(variants
            .iter()
            .any(|v| v.domain == "cme.com" && v.fuzzer == "omission"));
        assert!(variants
            .iter()
            .any(|v| v.domain == "came.com" && v.fuzzer == "transposition"));
    }

    #[test]
    fn test_repetition_and_hyphenation() {
        let variants = all_variants("acme.com");
        assert!(variants
            .iter()
            .any(|v| v.domain == "aacme.com" && v.fuzzer == "repetition"));
        assert!(variants
            .iter()
            .any(|v| v.domain == "ac-me.com" && v.fuzzer == "hyphenation"));
    }

    #[test]
    fn test_tld_swap_skips_own_tld() {
        let variants = all_variants("acme.com");
        let tld_swaps: Vec<_> = variants.iter().filter(|v| v.fuzzer == "tld-swap").collect();
        assert!(!tld_swaps.is_empty());
        assert!(!tld_swaps.iter().any(|v| v.domain == "acme.com"));
        assert!(tld_swaps.iter().any(|v| v.domain == "acme.net"));
    }

    #[test]
    fn test_malicious_tld_expansion() {
        let variants = malicious_tld_variants("acme.com");
        assert!(variants.iter().any(|v| v.domain == "acme.tk"));
        assert!(variants.iter().any(|v| v.domain == "acme.xyz"));
        // The seed's own TLD is skipped; "com" is not in the list anyway.
        assert_eq!(variants.len(), MALICIOUS_TLDS.len());

        let net_variants = malicious_tld_variants("acme.net");
        assert!(!net_variants.iter().any(|v| v.domain == "acme.net"));
        assert_eq!(net_variants.len(), MALICIOUS_TLDS.len() - 1);
    }

    #[test]
    fn test_no_invalid_labels() {
        for v in all_variants("a-b.com") {
            let label = v.domain.split('.').next().unwrap();
            assert!(!label.starts_with('-'), "bad label in {}", v.domain);
            assert!(!label.is_empty());
        }
    }

    #[test]
    fn test_subdomain_split() {
        let variants = all_variants("acme.com");
        assert!(variants
            .iter()
            .any(|v| v.domain == "a.cme.com" && v.fuzzer == "subdomain"));
    }
}
