// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexicon extraction from `KenLM` ARPA language models.
//!
//! A lexicon maps every unigram word of an ARPA file to its spelling in
//! acoustic-model units, one `word\tunit unit ...` line per word.  Without a
//! tokenizer the units are the word's characters; with one they are the
//! tokenizer's subword tokens, and words containing unknown tokens are
//! left out.
//!
//! # Example
//!
//! ```
//! use candle_mm_encode::lexicon::LexiconBuilder;
//!
//! # fn main() -> candle_mm_encode::Result<()> {
//! let arpa = "\\1-grams:\n-1.5\tHello\t-0.3\n-2.0\t<s>\n";
//! let mut out = Vec::new();
//! let stats = LexiconBuilder::new(true)?.write_lexicon(arpa.as_bytes(), &mut out)?;
//! assert_eq!(String::from_utf8_lossy(&out), "hello\th e l l o\n");
//! assert_eq!(stats.words_written, 1);
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};

use crate::error::{MMError, Result};
use crate::tokenizer::MMTokenizer;

/// Shape of an ARPA unigram entry: `logprob \t word [\t backoff]`.
const UNIGRAM_PATTERN: &str = r"^-*[0-9.]+\t\S+\t*-*[0-9.]*$";

/// Sentence markers and unknown-word entries never written to a lexicon.
const RESERVED_WORDS: [&str; 4] = ["<UNK>", "<unk>", "<s>", "</s>"];

/// Extension of generated lexicon files.
pub const LEXICON_EXTENSION: &str = "lexicon";

/// Counters reported after a lexicon has been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexiconStats {
    /// Lines read from the ARPA input.
    pub lines_read: usize,
    /// Lines recognized as unigram entries.
    pub unigrams: usize,
    /// Words written to the lexicon.
    pub words_written: usize,
    /// Unigrams left out (reserved words, unknown tokens).
    pub words_skipped: usize,
}

/// How words are spelled out.
#[derive(Debug)]
enum Speller<'a> {
    /// Space-separated characters.
    Characters,
    /// Space-separated subword tokens.
    Tokens {
        tokenizer: &'a MMTokenizer,
        unk_id: Option<u32>,
    },
}

/// Converts ARPA unigrams into lexicon lines.
#[derive(Debug)]
pub struct LexiconBuilder<'a> {
    unigram: Regex,
    lower: bool,
    speller: Speller<'a>,
}

impl<'a> LexiconBuilder<'a> {
    /// Create a builder spelling words as characters.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Lexicon`] if the unigram pattern fails to compile.
    pub fn new(lower: bool) -> Result<Self> {
        let unigram = Regex::new(UNIGRAM_PATTERN)
            .map_err(|e| MMError::Lexicon(format!("invalid unigram pattern: {e}")))?;
        Ok(Self {
            unigram,
            lower,
            speller: Speller::Characters,
        })
    }

    /// Spell words with `tokenizer` instead of characters.
    ///
    /// Words whose encoding contains the id of `unk_token` are skipped.  If
    /// the tokenizer has no such entry, no word is skipped.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: &'a MMTokenizer, unk_token: &str) -> Self {
        let unk_id = tokenizer.token_to_id(unk_token);
        if unk_id.is_none() {
            warn!(unk_token, "tokenizer has no unknown token, no words will be filtered");
        }
        self.speller = Speller::Tokens { tokenizer, unk_id };
        self
    }

    /// Extract the word of an ARPA unigram line, or `None` for other lines.
    ///
    /// The word is trimmed and, if configured, lowercased.
    pub fn parse_unigram(&self, line: &str) -> Option<String> {
        if !self.unigram.is_match(line) {
            return None;
        }
        let word = line.split('\t').nth(1)?.trim();
        Some(if self.lower {
            word.to_lowercase()
        } else {
            word.to_owned()
        })
    }

    /// Spell out `word`, or `None` if it must not appear in the lexicon.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if tokenization fails.
    pub fn spell(&self, word: &str) -> Result<Option<String>> {
        if RESERVED_WORDS.contains(&word) {
            return Ok(None);
        }
        match &self.speller {
            Speller::Characters => {
                let chars: Vec<String> = word.chars().map(String::from).collect();
                Ok(Some(chars.join(" ")))
            }
            Speller::Tokens { tokenizer, unk_id } => {
                let (ids, tokens) = tokenizer.encode_raw_with_tokens(word)?;
                if unk_id.is_some_and(|unk| ids.contains(&unk)) {
                    return Ok(None);
                }
                Ok(Some(tokens.join(" ")))
            }
        }
    }

    /// Stream an ARPA file from `reader` and write the lexicon to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Io`] on read/write failures (including invalid
    /// UTF-8) and [`MMError::Tokenizer`] if tokenization fails.
    pub fn write_lexicon(&self, reader: impl BufRead, mut writer: impl Write) -> Result<LexiconStats> {
        let mut stats = LexiconStats::default();
        for line in reader.lines() {
            let line = line?;
            stats.lines_read += 1;

            let Some(word) = self.parse_unigram(&line) else {
                continue;
            };
            stats.unigrams += 1;

            match self.spell(&word)? {
                Some(spelling) => {
                    writeln!(writer, "{word}\t{spelling}")?;
                    stats.words_written += 1;
                }
                None => stats.words_skipped += 1,
            }
        }
        writer.flush()?;
        Ok(stats)
    }

    /// Read the ARPA file at `arpa` and write the lexicon to `lexicon_file`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Lexicon`] if `arpa` does not exist, plus the
    /// errors of [`write_lexicon`](Self::write_lexicon).
    pub fn save(&self, arpa: &Path, lexicon_file: &Path) -> Result<LexiconStats> {
        if !arpa.is_file() {
            return Err(MMError::Lexicon(format!(
                "ARPA file [ {} ] not found",
                arpa.display()
            )));
        }
        info!(lexicon = %lexicon_file.display(), "writing lexicon file");

        let reader = BufReader::new(File::open(arpa)?);
        let writer = BufWriter::new(File::create(lexicon_file)?);
        let stats = self.write_lexicon(reader, writer)?;

        info!(
            unigrams = stats.unigrams,
            written = stats.words_written,
            skipped = stats.words_skipped,
            "lexicon complete"
        );
        Ok(stats)
    }
}

/// Path of the lexicon generated for `arpa`, creating its directory.
///
/// The file is named after the ARPA file's stem with a `.lexicon`
/// extension and placed in `dst`, or next to the ARPA file.
///
/// # Errors
///
/// Returns [`MMError::Lexicon`] if `arpa` has no file name and
/// [`MMError::Io`] if the directory cannot be created.
pub fn lexicon_path(arpa: &Path, dst: Option<&Path>) -> Result<PathBuf> {
    let stem = arpa
        .file_stem()
        .ok_or_else(|| MMError::Lexicon(format!("no file name in '{}'", arpa.display())))?;
    let dir = match dst {
        Some(dir) => dir.to_path_buf(),
        None => arpa.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(&dir)?;
    }
    let mut file_name = stem.to_os_string();
    file_name.push(".");
    file_name.push(LEXICON_EXTENSION);
    Ok(dir.join(file_name))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ARPA: &str = "\
\\data\\
ngram 1=6
ngram 2=1

\\1-grams:
-1.0\t<s>\t-0.5
-99\t</s>
-2.5\t<unk>\t0
-1.25\tCat\t-0.25
-1.5\tdog
-3.0\tzebra\t-0.1

\\2-grams:
-0.5\tCat dog
\\end\\
";

    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "<unk>": 0, "cat": 1, "dog": 2 },
            "unk_token": "<unk>"
        }
    }"#;

    #[test]
    fn unigram_lines_only() {
        let builder = LexiconBuilder::new(false).unwrap();
        assert_eq!(builder.parse_unigram("-1.25\tCat\t-0.25").as_deref(), Some("Cat"));
        assert_eq!(builder.parse_unigram("-1.5\tdog").as_deref(), Some("dog"));
        assert!(builder.parse_unigram("\\1-grams:").is_none());
        assert!(builder.parse_unigram("ngram 1=6").is_none());
        // Bigrams have a space inside the second field.
        assert!(builder.parse_unigram("-0.5\tCat dog").is_none());
        assert!(builder.parse_unigram("").is_none());
    }

    #[test]
    fn character_lexicon_lowercased() {
        let mut out = Vec::new();
        let stats = LexiconBuilder::new(true)
            .unwrap()
            .write_lexicon(ARPA.as_bytes(), &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "cat\tc a t\ndog\td o g\nzebra\tz e b r a\n"
        );
        assert_eq!(stats.unigrams, 6);
        assert_eq!(stats.words_written, 3);
        assert_eq!(stats.words_skipped, 3);
    }

    #[test]
    fn character_lexicon_keeps_case() {
        let mut out = Vec::new();
        LexiconBuilder::new(false)
            .unwrap()
            .write_lexicon(ARPA.as_bytes(), &mut out)
            .unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Cat\tC a t\n"));
    }

    #[test]
    fn multibyte_characters_are_spelled() {
        let builder = LexiconBuilder::new(false).unwrap();
        assert_eq!(builder.spell("über").unwrap().as_deref(), Some("ü b e r"));
    }

    #[test]
    fn tokenizer_lexicon_skips_unknown_words() {
        let tokenizer = MMTokenizer::from_hf_json(TOKENIZER_JSON).unwrap();
        let builder = LexiconBuilder::new(true)
            .unwrap()
            .with_tokenizer(&tokenizer, "<unk>");
        let mut out = Vec::new();
        let stats = builder.write_lexicon(ARPA.as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "cat\tcat\ndog\tdog\n");
        assert_eq!(stats.words_skipped, 4);
    }

    #[test]
    fn lexicon_path_next_to_arpa_or_in_dst() {
        let dir = tempfile::tempdir().unwrap();
        let arpa = dir.path().join("english.3gram.arpa");
        assert_eq!(
            lexicon_path(&arpa, None).unwrap(),
            dir.path().join("english.3gram.lexicon")
        );

        let dst = dir.path().join("out/nested");
        let path = lexicon_path(&arpa, Some(&dst)).unwrap();
        assert_eq!(path, dst.join("english.3gram.lexicon"));
        assert!(dst.is_dir());
    }

    #[test]
    fn save_round_trip_and_missing_arpa() {
        let dir = tempfile::tempdir().unwrap();
        let arpa = dir.path().join("lm.arpa");
        fs::write(&arpa, ARPA).unwrap();
        let lexicon = lexicon_path(&arpa, None).unwrap();

        let builder = LexiconBuilder::new(true).unwrap();
        let stats = builder.save(&arpa, &lexicon).unwrap();
        assert_eq!(stats.words_written, 3);
        assert!(fs::read_to_string(&lexicon).unwrap().contains("dog\td o g\n"));

        let err = builder
            .save(&dir.path().join("missing.arpa"), &lexicon)
            .unwrap_err();
        assert!(matches!(err, MMError::Lexicon(_)));
    }
}
