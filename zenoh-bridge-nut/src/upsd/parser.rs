//! Response parsing for the upsd network protocol.
//!
//! Two response shapes exist:
//!
//! ```text
//! LIST UPS        -> BEGIN LIST UPS / UPS <name> "<description>" ... / END LIST UPS
//! GET VAR <u> <v> -> VAR <u> <v> "<value>"
//! ```

use super::{UpsdError, VarMap};

/// Parse a framed response to `command` into key/value pairs.
pub fn parse_response(raw: &str, command: &str) -> Result<VarMap, UpsdError> {
    let mut lines: Vec<&str> = raw.split('\n').collect();

    // Drop trailing newline
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let mut values = VarMap::new();

    if lines.is_empty() {
        return Ok(values);
    }

    if let Some(reason) = lines[0].strip_prefix("ERR ") {
        return Err(UpsdError::Server {
            command: command.to_string(),
            reason: reason.trim().to_string(),
        });
    }

    if command.starts_with("LIST") {
        let begin = format!("BEGIN {}", command);
        let end = format!("END {}", command);

        if !lines[0].starts_with(&begin) {
            return Err(UpsdError::Framing(format!(
                "no BEGIN preamble in {} response",
                command
            )));
        }
        if lines.len() < 2 || !lines[lines.len() - 1].starts_with(&end) {
            return Err(UpsdError::Framing(format!(
                "no END addendum in {} response",
                command
            )));
        }

        for line in &lines[1..lines.len() - 1] {
            if let Some((key, value)) = parse_line(line)? {
                values.insert(key, value);
            }
        }
        return Ok(values);
    }

    if command.starts_with("GET") {
        if lines.len() > 1 {
            return Err(UpsdError::Protocol(format!(
                "multiple response lines from {}",
                command
            )));
        }
        if let Some((key, value)) = parse_line(lines[0])? {
            values.insert(key, value);
        }
        return Ok(values);
    }

    Err(UpsdError::Unsupported(command.to_string()))
}

/// Parse a single body line.
///
/// Returns `Ok(None)` for an empty line.
pub fn parse_line(line: &str) -> Result<Option<(String, String)>, UpsdError> {
    if line.is_empty() {
        return Ok(None);
    }

    let mut tokens = line.splitn(2, ' ');
    let noun = tokens.next().unwrap_or_default();
    let rest = tokens.next().unwrap_or_default();

    // Number of name tokens preceding the quoted value
    let names = match noun {
        "UPS" => 1,
        "VAR" => 2,
        _ => {
            return Err(UpsdError::Parse {
                line: line.to_string(),
                reason: format!("unknown response noun '{}'", noun),
            });
        }
    };

    let mut remainder = rest;
    let mut key = "";
    for _ in 0..names {
        let (token, tail) = remainder.split_once(' ').ok_or_else(|| UpsdError::Parse {
            line: line.to_string(),
            reason: "missing fields".to_string(),
        })?;
        if token.is_empty() {
            return Err(UpsdError::Parse {
                line: line.to_string(),
                reason: "empty field".to_string(),
            });
        }
        key = token;
        remainder = tail;
    }

    let value = unquote(remainder.trim()).ok_or_else(|| UpsdError::Parse {
        line: line.to_string(),
        reason: "value is not a quoted string".to_string(),
    })?;

    Ok(Some((key.to_string(), value)))
}

/// Strip the surrounding quotes and resolve `\"` / `\\` escapes.
fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> VarMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_line_blank() {
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn test_parse_line_unknown_noun() {
        let err = parse_line("TEAPOT name  capacity").unwrap_err();
        match err {
            UpsdError::Parse { line, .. } => assert_eq!(line, "TEAPOT name  capacity"),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_line_ups() {
        assert_eq!(
            parse_line("UPS myups \"makes a beeping sound\"").unwrap(),
            Some(("myups".to_string(), "makes a beeping sound".to_string()))
        );
    }

    #[test]
    fn test_parse_line_var() {
        assert_eq!(
            parse_line("VAR myups battery.charge \"100\"").unwrap(),
            Some(("battery.charge".to_string(), "100".to_string()))
        );
    }

    #[test]
    fn test_parse_line_escaped_value() {
        assert_eq!(
            parse_line(r#"VAR myups ups.mfr "Cyber \"Power\" \\ Systems""#).unwrap(),
            Some((
                "ups.mfr".to_string(),
                r#"Cyber "Power" \ Systems"#.to_string()
            ))
        );
    }

    #[test]
    fn test_parse_line_unquoted_value() {
        assert!(parse_line("VAR myups battery.charge 100").is_err());
        assert!(parse_line("UPS myups").is_err());
        assert!(parse_line("VAR myups \"x").is_err());
    }

    #[test]
    fn test_get_no_lines() {
        assert_eq!(
            parse_response("", "GET VAR myups stuff.things").unwrap(),
            VarMap::new()
        );
    }

    #[test]
    fn test_get_multi_line() {
        let err = parse_response("line\nother line", "GET VAR myups stuff.things").unwrap_err();
        assert!(matches!(err, UpsdError::Protocol(_)));
    }

    #[test]
    fn test_get_normal() {
        assert_eq!(
            parse_response(
                "VAR myups stuff.things \"yokes\"\n",
                "GET VAR myups stuff.things"
            )
            .unwrap(),
            map(&[("stuff.things", "yokes")])
        );
    }

    #[test]
    fn test_not_implemented() {
        let err = parse_response("UPS stuff \"things\"", "FUNGE blarg").unwrap_err();
        assert!(matches!(err, UpsdError::Unsupported(_)));
    }

    #[test]
    fn test_server_error() {
        let err = parse_response("ERR UNKNOWN-UPS\n", "LIST VAR nope").unwrap_err();
        match err {
            UpsdError::Server { reason, .. } => assert_eq!(reason, "UNKNOWN-UPS"),
            other => panic!("Expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_list_no_lines() {
        assert_eq!(
            parse_response("BEGIN LIST UPS\nEND LIST UPS\n", "LIST UPS").unwrap(),
            VarMap::new()
        );
    }

    #[test]
    fn test_list_missing_sentinels() {
        let cases = [
            "UPS myups \"description\"\nEND LIST UPS\n",
            "BEGIN LIST UPS\nUPS myups \"description\"\n",
            "BEGIN LIST UPS\n",
            "TEAPOT\nEND LIST UPS\n",
            "BEGIN LIST VAR other\nEND LIST VAR other\n",
        ];
        for raw in cases {
            let err = parse_response(raw, "LIST UPS").unwrap_err();
            assert!(
                matches!(err, UpsdError::Framing(_)),
                "{:?} should fail framing, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_list_several_elements() {
        let raw = "BEGIN LIST UPS\nUPS myups \"description\"\nUPS myotherups \"other one\"\nEND LIST UPS\n";
        assert_eq!(
            parse_response(raw, "LIST UPS").unwrap(),
            map(&[("myups", "description"), ("myotherups", "other one")])
        );
    }

    #[test]
    fn test_list_body_count_matches() {
        let body: Vec<String> = (0..25)
            .map(|i| format!("VAR myups var.{} \"{}\"", i, i))
            .collect();
        let raw = format!(
            "BEGIN LIST VAR myups\n{}\nEND LIST VAR myups\n",
            body.join("\n")
        );
        assert_eq!(parse_response(&raw, "LIST VAR myups").unwrap().len(), 25);
    }

    #[test]
    fn test_list_bad_body_line() {
        let raw = "BEGIN LIST UPS\nTEAPOT name capacity\nEND LIST UPS\n";
        assert!(matches!(
            parse_response(raw, "LIST UPS").unwrap_err(),
            UpsdError::Parse { .. }
        ));
    }
}
