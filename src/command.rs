use crate::error::{ClshError, Result};

/// The command sent to every node of a round, as an argv-style token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    tokens: Vec<String>,
}

impl RemoteCommand {
    pub fn new(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(ClshError::EmptyCommand);
        }
        Ok(Self { tokens })
    }

    /// Tokenize an interactive input line.
    pub fn parse(line: &str) -> Result<Self> {
        Self::new(tokenize(line)?)
    }

    /// Append piped stdin as one extra trailing token (xargs-style).
    /// Input is trimmed; nothing is appended when it is empty.
    pub fn with_piped_input(mut self, input: &str) -> Self {
        let trimmed = input.trim();
        if !trimmed.is_empty() {
            self.tokens.push(trimmed.to_string());
        }
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl std::fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

/// Split a line into words using POSIX-shell-like quoting rules.
///
/// Single quotes are literal, double quotes honour `\"` and `\\`, and a
/// backslash outside quotes escapes the next character. An unterminated quote
/// or a dangling backslash is an error.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => {
                            return Err(ClshError::Tokenize(
                                "unterminated single quote".into(),
                            ))
                        }
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => {
                                return Err(ClshError::Tokenize(
                                    "unterminated double quote".into(),
                                ))
                            }
                        },
                        Some(ch) => current.push(ch),
                        None => {
                            return Err(ClshError::Tokenize(
                                "unterminated double quote".into(),
                            ))
                        }
                    }
                }
            }
            '\\' => match chars.next() {
                Some(ch) => {
                    in_token = true;
                    current.push(ch);
                }
                None => return Err(ClshError::Tokenize("trailing backslash".into())),
            },
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(words("  ls   -la\t/tmp "), vec!["ls", "-la", "/tmp"]);
        assert!(words("   ").is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(words("echo 'hello world'"), vec!["echo", "hello world"]);
        assert_eq!(words(r#"echo "a \"b\" c""#), vec!["echo", r#"a "b" c"#]);
        assert_eq!(words("echo ''"), vec!["echo", ""]);
        assert_eq!(words("pre'fix'ed"), vec!["prefixed"]);
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(words(r"echo '$HOME \n'"), vec!["echo", r"$HOME \n"]);
    }

    #[test]
    fn backslash_escapes_next_char() {
        assert_eq!(words(r"echo a\ b"), vec!["echo", "a b"]);
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(matches!(tokenize("echo 'oops"), Err(ClshError::Tokenize(_))));
        assert!(matches!(tokenize("echo \"oops"), Err(ClshError::Tokenize(_))));
        assert!(matches!(tokenize("echo oops\\"), Err(ClshError::Tokenize(_))));
    }

    #[test]
    fn empty_command_rejected() {
        assert!(matches!(RemoteCommand::parse("   "), Err(ClshError::EmptyCommand)));
        assert!(matches!(RemoteCommand::new(vec![]), Err(ClshError::EmptyCommand)));
    }

    #[test]
    fn piped_input_appended_as_one_token() {
        let cmd = RemoteCommand::new(vec!["grep".into()])
            .unwrap()
            .with_piped_input("  needle in\n a haystack \n");
        assert_eq!(cmd.tokens(), ["grep", "needle in\n a haystack"]);
        assert_eq!(cmd.to_string(), "grep needle in\n a haystack");
    }

    #[test]
    fn blank_piped_input_ignored() {
        let cmd = RemoteCommand::new(vec!["uptime".into()])
            .unwrap()
            .with_piped_input(" \n\t");
        assert_eq!(cmd.tokens(), ["uptime"]);
    }
}
