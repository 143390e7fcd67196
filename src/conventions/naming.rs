//! Table naming convention: snake-cased, pluralized resource names
//!
//! Handles the common English pluralization rules, which is all entity
//! names in practice need.

/// Convert a singular noun to its plural form
///
/// # Examples
///
/// ```
/// use gateway::conventions::naming::pluralize;
///
/// assert_eq!(pluralize("client"), "clients");
/// assert_eq!(pluralize("company"), "companies");
/// assert_eq!(pluralize("address"), "addresses");
/// assert_eq!(pluralize("knife"), "knives");
/// ```
pub fn pluralize(singular: &str) -> String {
    if singular.is_empty() {
        return String::new();
    }

    let lower = singular.to_ascii_lowercase();
    let stem = |n: usize| &singular[..singular.len() - n];

    match lower.as_str() {
        // Consonant + y -> ies
        s if s.len() > 1 && s.ends_with('y') && !ends_with_any(&s[..s.len() - 1], VOWELS) => {
            format!("{}ies", stem(1))
        }

        // Sibilants -> es
        s if ["s", "sh", "ch", "x", "z"].iter().any(|suffix| s.ends_with(suffix)) => {
            format!("{}es", singular)
        }

        s if s.len() > 2 && s.ends_with("fe") => format!("{}ves", stem(2)),

        s if s.len() > 1 && s.ends_with('f') && !s.ends_with("ff") => {
            format!("{}ves", stem(1))
        }

        // Consonant + o -> oes, with the usual exceptions
        s if s.len() > 1 && s.ends_with('o') && !ends_with_any(&s[..s.len() - 1], VOWELS) => {
            match s {
                "photo" | "piano" | "halo" | "memo" | "logo" | "info" => format!("{}s", singular),
                _ => format!("{}es", singular),
            }
        }

        _ => format!("{}s", singular),
    }
}

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u'];

fn ends_with_any(s: &str, chars: &[char]) -> bool {
    s.chars().last().is_some_and(|c| chars.contains(&c))
}

/// `BudgetLine` / `budget-line` / `budget line` -> `budget_line`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Table name for a resource: pluralize the last word of its snake-cased name
pub fn table_name(resource: &str) -> String {
    let snake = snake_case(resource);
    match snake.rsplit_once('_') {
        Some((head, last)) => format!("{}_{}", head, pluralize(last)),
        None => pluralize(&snake),
    }
}
