//! Reader for the INI-style format used by `wg-quick` configuration files.

/// One `[Name]` section with its `Key = Value` entries in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

/// Parse error with 1-based line number.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub line: usize,
    pub reason: String,
}

/// Split `text` into sections.
///
/// Blank lines and `#` comments are skipped. Entries before the first section header are
/// rejected.
pub(crate) fn parse(text: &str) -> Result<Vec<Section>, ParseError> {
    let mut sections: Vec<Section> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            sections.push(Section {
                name: name.trim().to_string(),
                entries: Vec::new(),
            });
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ParseError {
                line: number + 1,
                reason: format!("expected `Key = Value`, found `{line}`"),
            });
        };
        let Some(section) = sections.last_mut() else {
            return Err(ParseError {
                line: number + 1,
                reason: "entry outside of a section".into(),
            });
        };
        section
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sections() {
        let text = "\n[Interface]\nAddress = 10.0.0.1/32\n# comment\nPostUp = a; b = c\n\n\
            [Peer]\nPublicKey = abc=\n";
        let sections = parse(text).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "Interface");
        assert_eq!(
            sections[0].entries,
            vec![
                ("Address".to_string(), "10.0.0.1/32".to_string()),
                // only the first `=` separates key and value
                ("PostUp".to_string(), "a; b = c".to_string()),
            ]
        );
        assert_eq!(
            sections[1].entries,
            vec![("PublicKey".to_string(), "abc=".to_string())]
        );
    }

    #[test]
    fn reject_orphan_entry() {
        let err = parse("Address = 10.0.0.1/32\n[Interface]\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn reject_garbage_line() {
        let err = parse("[Interface]\nthis is not an entry\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
