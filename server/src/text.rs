//! Texts the players race against.

use log::info;
use rand::seq::SliceRandom;
use std::io;
use std::path::Path;

const DEFAULT_TEXT: &str = "According to all known laws of aviation, there is no way a bee \
    should be able to fly. Its wings are too small to get its fat little body off the ground. \
    The bee, of course, flies anyway because bees don't care what humans think is impossible.";

/// Supplies the text for a new round.
pub trait TextProvider: Send + Sync {
    fn current_text(&self) -> String;
}

/// A fixed pool of texts; each call picks one at random.
#[derive(Debug, Clone)]
pub struct TextSource {
    texts: Vec<String>,
}

impl TextSource {
    /// Builds a source from raw texts. Blank texts are dropped; if nothing
    /// remains the built-in default text is used.
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut texts: Vec<String> = texts
            .into_iter()
            .map(|text| normalize(text.as_ref()))
            .filter(|text| !text.is_empty())
            .collect();

        if texts.is_empty() {
            texts.push(DEFAULT_TEXT.to_string());
        }

        Self { texts }
    }

    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> io::Result<Self> {
        let mut texts = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(path)?;
            if normalize(&content).is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("text file {} is empty", path.as_ref().display()),
                ));
            }
            info!("Loaded text from {}", path.as_ref().display());
            texts.push(content);
        }
        Ok(Self::new(texts))
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl Default for TextSource {
    fn default() -> Self {
        Self::new([DEFAULT_TEXT])
    }
}

impl TextProvider for TextSource {
    fn current_text(&self) -> String {
        self.texts
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_TEXT.to_string())
    }
}

/// Collapses every whitespace run (line breaks included) into one space.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_text_is_typeable() {
        let text = TextSource::default().current_text();
        assert!(!text.is_empty());
        assert!(!text.contains('\n'));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_normalizes_whitespace() {
        let source = TextSource::new(["  hello\n\tworld  again \r\n"]);
        assert_eq!(source.current_text(), "hello world again");
    }

    #[test]
    fn test_blank_texts_fall_back_to_default() {
        let source = TextSource::new(["", "   \n "]);
        assert_eq!(source.len(), 1);
        assert_eq!(source.current_text(), normalize(DEFAULT_TEXT));
    }

    #[test]
    fn test_picks_from_pool() {
        let source = TextSource::new(["one", "two"]);
        for _ in 0..20 {
            let text = source.current_text();
            assert!(text == "one" || text == "two");
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = TextSource::from_files(&["/definitely/not/here.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_loads_file() {
        let path = std::env::temp_dir().join(format!("typeracer-text-{}.txt", std::process::id()));
        std::fs::write(&path, "first line\nsecond line\n").unwrap();

        let source = TextSource::from_files(&[&path]).unwrap();
        assert_eq!(source.current_text(), "first line second line");

        std::fs::remove_file(&path).unwrap();
    }
}
