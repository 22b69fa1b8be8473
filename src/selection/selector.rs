//! Index selection
//!
//! Resolves explicit names, a name regex and the exclude flag into a sorted,
//! duplicate-free set of test indices.

use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use super::SelectionError;

/// Select test indices from `names` (the library's test names, by index).
///
/// - `explicit` names must all exist; every unknown name is reported at once.
/// - With no explicit names and no regex every test is selected.
/// - `regex` adds every test whose name matches from the start.
/// - `exclude` inverts the result over the full index range.
pub fn select<S: AsRef<str>>(
    names: &[S],
    explicit: &[String],
    exclude: bool,
    regex: Option<&str>,
) -> Result<Vec<usize>, SelectionError> {
    let mut selected = BTreeSet::new();
    let mut missing = Vec::new();

    for name in explicit {
        match names.iter().position(|n| n.as_ref() == name) {
            Some(index) => {
                selected.insert(index);
            }
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(SelectionError::NotFound(missing));
    }

    if let Some(pattern) = regex {
        let re = Regex::new(&format!("^(?:{pattern})")).map_err(|e| SelectionError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        selected.extend(
            names
                .iter()
                .enumerate()
                .filter(|(_, n)| re.is_match(n.as_ref()))
                .map(|(i, _)| i),
        );
    } else if explicit.is_empty() && !exclude {
        selected.extend(0..names.len());
    }

    let indices: Vec<usize> = if exclude {
        (0..names.len()).filter(|i| !selected.contains(i)).collect()
    } else {
        selected.into_iter().collect()
    };

    debug!("Selected {} of {} tests", indices.len(), names.len());
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<&'static str> {
        vec!["A", "B", "C"]
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_all() {
        assert_eq!(select(&names(), &[], false, None).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_select_exclude_nothing_named() {
        assert_eq!(select(&names(), &[], true, None).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_select_explicit() {
        let explicit = strings(&["C", "A", "C"]);
        assert_eq!(select(&names(), &explicit, false, None).unwrap(), vec![0, 2]);
        assert_eq!(select(&names(), &explicit, true, None).unwrap(), vec![1]);
    }

    #[test]
    fn test_select_unknown_names_batched() {
        let explicit = strings(&["A", "X", "Y"]);
        let err = select(&names(), &explicit, false, None).unwrap_err();
        assert_eq!(err, SelectionError::NotFound(strings(&["X", "Y"])));
        assert_eq!(err.to_string(), "Unknown tests: X, Y");
    }

    #[test]
    fn test_select_regex_matches_from_start() {
        let names = vec!["math/add", "math/sub", "io/math", "mathematics"];
        assert_eq!(select(&names, &[], false, Some("math/")).unwrap(), vec![0, 1]);
        assert_eq!(select(&names, &[], false, Some("math")).unwrap(), vec![0, 1, 3]);
        assert_eq!(select(&names, &[], true, Some("math")).unwrap(), vec![2]);
    }

    #[test]
    fn test_select_regex_with_explicit() {
        let names = vec!["math/add", "math/sub", "io/read"];
        let explicit = strings(&["io/read"]);
        assert_eq!(
            select(&names, &explicit, false, Some("math/s")).unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_select_bad_regex() {
        let err = select(&names(), &[], false, Some("(")).unwrap_err();
        assert!(matches!(err, SelectionError::Regex { .. }));
    }

    #[test]
    fn test_select_is_sorted_and_unique() {
        let names: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let explicit = strings(&["t19", "t3", "t3", "t0"]);
        let out = select(&names, &explicit, false, Some("t1")).unwrap();
        assert!(out.windows(2).all(|w| w[0] < w[1]));
        assert!(out.iter().all(|&i| i < names.len()));
        assert_eq!(out, vec![0, 1, 3, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);
    }
}
