//! Redis-style glob matching for key enumeration.
//!
//! Supported syntax:
//!
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from a class; `[^...]` or `[!...]`
//!   negates it
//! - `\x` matches `x` literally
//!
//! An unterminated `[` is matched literally.

/// Check whether `text` matches the glob `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // Position of the last `*` seen and the text index it currently covers up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pattern.get(pi) == Some(&'*') {
            backtrack = Some((pi, ti));
            pi += 1;
            continue;
        }

        if pi < pattern.len() {
            if let Some(next) = step(&pattern, pi, text[ti]) {
                pi = next;
                ti += 1;
                continue;
            }
        }

        match backtrack {
            Some((star, covered)) => {
                pi = star + 1;
                ti = covered + 1;
                backtrack = Some((star, covered + 1));
            }
            None => return false,
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

/// Match a single non-`*` token at `pi` against `c`, returning the index of
/// the next token on success.
fn step(pattern: &[char], pi: usize, c: char) -> Option<usize> {
    match pattern[pi] {
        '?' => Some(pi + 1),
        '\\' if pi + 1 < pattern.len() => (pattern[pi + 1] == c).then_some(pi + 2),
        '[' => match class(pattern, pi + 1, c) {
            Some((matched, next)) => matched.then_some(next),
            None => (c == '[').then_some(pi + 1),
        },
        literal => (literal == c).then_some(pi + 1),
    }
}

/// Evaluate the character class starting after `[`.
///
/// Returns whether `c` is in the class and the index after the closing `]`,
/// or `None` if the class is never closed.
fn class(pattern: &[char], mut i: usize, c: char) -> Option<(bool, usize)> {
    let negate = matches!(pattern.get(i), Some('^') | Some('!'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let mut lo = *pattern.get(i)?;
        if lo == ']' {
            return Some((matched != negate, i + 1));
        }
        if lo == '\\' {
            i += 1;
            lo = *pattern.get(i)?;
        }

        let is_range =
            pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|&e| e != ']');

        if is_range {
            let mut end = i + 2;
            let mut hi = pattern[end];
            if hi == '\\' {
                end += 1;
                hi = *pattern.get(end)?;
            }
            if (lo.min(hi)..=lo.max(hi)).contains(&c) {
                matched = true;
            }
            i = end + 1;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
}
