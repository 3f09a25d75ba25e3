/// Splits a command line into words the way a shell would for the simple
/// cases: whitespace separates words, and single or double quotes group a
/// segment (spaces included) into the current word. Quotes are removed.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    in_word = true;
                }
                ch if ch.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                ch => {
                    current.push(ch);
                    in_word = true;
                }
            },
        }
    }

    // An unterminated quote keeps what it collected.
    if in_word {
        words.push(current);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_quoted_path() {
        let words = split_command_line(r#"open -a "My Emulator.app" /path/to/x.gba"#);
        assert_eq!(words, ["open", "-a", "My Emulator.app", "/path/to/x.gba"]);
    }

    #[test]
    fn test_split_whitespace_runs() {
        assert_eq!(split_command_line("  mgba-qt\t -f  "), ["mgba-qt", "-f"]);
        assert!(split_command_line("").is_empty());
    }

    #[test]
    fn test_split_mixed_quotes() {
        let words = split_command_line(r#"run --name='a b'"c d" "" end"#);
        assert_eq!(words, ["run", "--name=a bc d", "", "end"]);
    }

    #[test]
    fn test_split_unterminated_quote() {
        assert_eq!(split_command_line(r#"emu "C:\Games\x"#), ["emu", r"C:\Games\x"]);
    }
}
