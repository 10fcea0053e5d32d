use crate::domain::ports::Confirmation;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

/// Interactive y/n prompt. Anything other than yes/no re-asks; EOF counts as no.
///
/// The read blocks, so it runs on the blocking pool and the caller can race
/// it against cancellation.
pub struct PromptConfirmation<R, W> {
    input: Arc<Mutex<R>>,
    output: Arc<Mutex<W>>,
}

pub type StdinConfirmation = PromptConfirmation<io::BufReader<io::Stdin>, io::Stderr>;

impl StdinConfirmation {
    pub fn stdin() -> Self {
        PromptConfirmation::new(io::BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Arc::new(Mutex::new(input)),
            output: Arc::new(Mutex::new(output)),
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn ask<R: BufRead, W: Write>(input: &Mutex<R>, output: &Mutex<W>, question: &str) -> bool {
    let (Ok(mut input), Ok(mut output)) = (input.lock(), output.lock()) else {
        return false;
    };

    loop {
        if write!(output, "{} (y/n): ", question)
            .and_then(|_| output.flush())
            .is_err()
        {
            return false;
        }

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }

        match parse_answer(&line) {
            Some(answer) => return answer,
            None => {
                let _ = writeln!(output, "Please answer 'y' or 'n'.");
            }
        }
    }
}

#[async_trait]
impl<R, W> Confirmation for PromptConfirmation<R, W>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    async fn confirm(&self, question: &str) -> bool {
        let input = Arc::clone(&self.input);
        let output = Arc::clone(&self.output);
        let question = question.to_string();

        match tokio::task::spawn_blocking(move || ask(&input, &output, &question)).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("⚠️ Confirmation prompt failed: {}", e);
                false
            }
        }
    }
}
