// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generate a decoder lexicon from a `KenLM` ARPA file.
//!
//! ```bash
//! arpa-lexicon --arpa lm/english.arpa --lower
//! arpa-lexicon --arpa lm/english.arpa --dst out --tokenizer tokenizer.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use candle_mm_encode::MMTokenizer;
use candle_mm_encode::lexicon::{LexiconBuilder, lexicon_path};

#[derive(Parser)]
#[command(name = "arpa-lexicon")]
#[command(about = "Generate a lexicon file from a KenLM arpa file")]
struct Cli {
    /// Path to the ARPA file
    #[arg(long)]
    arpa: PathBuf,

    /// Directory to store the generated lexicon (defaults to the ARPA file's directory)
    #[arg(long)]
    dst: Option<PathBuf>,

    /// Lowercase the ARPA vocabulary
    #[arg(long)]
    lower: bool,

    /// Path to a tokenizer.json used to spell words as subword tokens
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Unknown token of the tokenizer; words containing it are skipped
    #[arg(long, default_value = "<unk>")]
    unk_token: String,
}

fn run(cli: &Cli) -> candle_mm_encode::Result<()> {
    let lexicon_file = lexicon_path(&cli.arpa, cli.dst.as_deref())?;

    let tokenizer = cli
        .tokenizer
        .as_ref()
        .map(MMTokenizer::from_hf_path)
        .transpose()?;

    let mut builder = LexiconBuilder::new(cli.lower)?;
    if let Some(tokenizer) = &tokenizer {
        builder = builder.with_tokenizer(tokenizer, &cli.unk_token);
    }

    let stats = builder.save(&cli.arpa, &lexicon_file)?;
    info!(
        path = %lexicon_file.display(),
        words = stats.words_written,
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install tracing subscriber");
    }

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(255)
        }
    }
}
