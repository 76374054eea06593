use std::collections::BTreeMap;

use crate::error::CommandError;

/// Tablespace name -> destination path.
pub type TablespaceRules = BTreeMap<String, String>;

/// Parses `NAME:LOCATION` rules, stopping at the first malformed one.
///
/// Only the first `:` separates name from location, so the location may
/// contain colons. A repeated name keeps the last location given.
pub fn parse_rules<S: AsRef<str>>(raw: &[S]) -> Result<TablespaceRules, CommandError> {
    let mut rules = TablespaceRules::new();

    for rule in raw {
        let rule = rule.as_ref();
        match rule.split_once(':') {
            Some((name, location)) if !name.is_empty() && !location.is_empty() => {
                rules.insert(name.to_string(), location.to_string());
            }
            _ => return Err(CommandError::MalformedRule(rule.to_string())),
        }
    }

    Ok(rules)
}

/// Every rule must name a tablespace of the backup being recovered.
pub fn validate_rules(rules: &TablespaceRules, known: &[String]) -> Result<(), CommandError> {
    match rules.keys().find(|name| !known.contains(name)) {
        Some(name) => Err(CommandError::UnknownTablespace {
            name: name.clone(),
            known: known.to_vec(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn known(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules(&["a:/x", "b:/y"]).unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules["a"], "/x");
        assert_eq!(rules["b"], "/y");
    }

    #[test]
    fn test_parse_rules_last_wins() {
        let rules = parse_rules(&["a:/x", "a:/z"]).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules["a"], "/z");
    }

    #[test]
    fn test_location_keeps_extra_colons() {
        let rules = parse_rules(&["a:/mnt/c:d"]).unwrap();
        assert_eq!(rules["a"], "/mnt/c:d");
    }

    #[rstest]
    #[case("malformed")]
    #[case(":/x")]
    #[case("a:")]
    #[case("")]
    fn test_parse_malformed(#[case] rule: &str) {
        assert_eq!(
            parse_rules(&[rule]),
            Err(CommandError::MalformedRule(rule.to_string()))
        );
    }

    #[test]
    fn test_parse_stops_at_first_malformed() {
        assert_eq!(
            parse_rules(&["a:/x", "first", "second"]),
            Err(CommandError::MalformedRule("first".to_string()))
        );
    }

    #[test]
    fn test_validate_rules() {
        let rules = parse_rules(&["a:/x"]).unwrap();
        assert_eq!(validate_rules(&rules, &known(&["a", "b"])), Ok(()));
    }

    #[test]
    fn test_validate_unknown_tablespace() {
        let rules = parse_rules(&["unknownTs:/x"]).unwrap();

        assert_eq!(
            validate_rules(&rules, &known(&["a", "b"])),
            Err(CommandError::UnknownTablespace {
                name: "unknownTs".to_string(),
                known: known(&["a", "b"]),
            })
        );
    }

    #[test]
    fn test_validate_against_empty_set() {
        let rules = parse_rules(&["a:/x"]).unwrap();
        assert!(validate_rules(&rules, &[]).is_err());
        assert_eq!(validate_rules(&TablespaceRules::new(), &[]), Ok(()));
    }
}
