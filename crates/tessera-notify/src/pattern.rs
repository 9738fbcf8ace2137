//! Subject and topic matching.
//!
//! Subjects match exactly unless the pattern is `*`. Topics use shell glob
//! rules: `*` matches any run of characters (dots included), `?` matches
//! one character, `[abc]`/`[a-z]` match a set and `[!abc]` its complement.

/// The wildcard that matches every subject and every topic.
pub const WILDCARD: &str = "*";

/// Returns `true` if `subject` is selected by `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    pattern == WILDCARD || pattern == subject
}

/// Returns `true` if `topic` is selected by the glob `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let topic: Vec<char> = topic.chars().collect();
    glob(&pattern, &topic)
}

/// Iterative glob matcher with single-star backtracking.
fn glob(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == '[' {
                        // Unterminated class: `[` is a literal.
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                c if c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        }
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Evaluates the character class starting at `pattern[start] == '['`.
///
/// Returns whether `c` is in the class and the index just past the closing
/// `]`, or `None` if the class is never closed.
fn class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some('!'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let lo = pattern[i];
        if lo == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if pattern.get(i + 1) == Some(&'-')
            && pattern.get(i + 2).is_some_and(|&hi| hi != ']')
        {
            let hi = pattern[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
