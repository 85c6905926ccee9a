//! Pluggable steps used when running a command line given as a string

use std::path::PathBuf;

/// Locates an executable by name
pub trait CommandResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Expands placeholders in a command line before it is split
pub trait Renderer: Send + Sync {
    fn render(&self, input: &str) -> String;
}

/// Splits a command line into program and arguments
pub trait Tokenizer: Send + Sync {
    fn split(&self, line: &str) -> Vec<String>;
}

/// Resolves through `PATH`
#[derive(Debug, Default, Clone, Copy)]
pub struct PathResolver;

impl CommandResolver for PathResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Leaves input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRenderer;

impl Renderer for IdentityRenderer {
    fn render(&self, input: &str) -> String {
        input.to_string()
    }
}

impl<F> Renderer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn render(&self, input: &str) -> String {
        self(input)
    }
}

/// Whitespace splitting with single and double quote grouping.
///
/// A backslash outside single quotes escapes the next character.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn split(&self, line: &str) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = String::new();
        let mut in_word = false;
        let mut quote: Option<char> = None;
        let mut chars = line.chars();

        while let Some(c) = chars.next() {
            match (quote, c) {
                (Some('\''), '\'') => quote = None,
                (Some('"'), '"') => quote = None,
                (Some('"') | None, '\\') => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                (Some(_), c) => current.push(c),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    in_word = true;
                }
                (None, c) if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                (None, c) => {
                    current.push(c);
                    in_word = true;
                }
            }
        }

        if in_word {
            words.push(current);
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            WordTokenizer.split("  cargo  build --release "),
            vec!["cargo", "build", "--release"]
        );
    }

    #[test]
    fn test_split_quotes() {
        assert_eq!(
            WordTokenizer.split(r#"git commit -m "a message" 'it''s' """#),
            vec!["git", "commit", "-m", "a message", "its", ""]
        );
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(
            WordTokenizer.split(r"echo a\ b 'c\d'"),
            vec!["echo", "a b", r"c\d"]
        );
    }

    #[test]
    fn test_closure_renderer() {
        let renderer = |s: &str| s.replace("{{name}}", "gantry");
        assert_eq!(
            Renderer::render(&renderer, "hello {{name}}"),
            "hello gantry"
        );
        assert_eq!(IdentityRenderer.render("x {{y}}"), "x {{y}}");
    }

    #[test]
    fn test_path_resolver_misses_unknown() {
        assert!(PathResolver.resolve("gantry-no-such-binary-xyz").is_none());
    }
}
