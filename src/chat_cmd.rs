//! `mindful chat`: the retrieval-augmented pipeline in a terminal.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::history::HistoryStore;
use crate::pipeline::RagPipeline;

pub async fn run_chat(config: &Config) -> Result<()> {
    let pipeline = RagPipeline::from_config(config).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Mindful chat. Type 'exit', 'quit' or 'bye' to leave.")?;
    let history = converse(&pipeline, stdin, &mut stdout).await?;
    tracing::debug!(turns = history.len(), "chat ended");
    Ok(())
}

/// Read one message per line until an exit command or end of input.
/// Blank lines are ignored.
pub async fn converse<R, W>(pipeline: &RagPipeline, input: R, out: &mut W) -> Result<HistoryStore>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut history = HistoryStore::new();
    let mut lines = input.lines();

    loop {
        write!(out, "you> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = pipeline.respond(&mut history, &line).await;
        writeln!(out, "mindful> {}", outcome.response)?;
        if outcome.exit {
            break;
        }
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generation::{BackendReply, GenerationBackend, ResponseGenerator};
    use crate::models::ModelRequest;
    use crate::retriever::InMemoryRetriever;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: &ModelRequest) -> Result<BackendReply, GenerationError> {
            Ok(BackendReply::PlainText(format!("you said: {}", request.user_input)))
        }
    }

    fn pipeline() -> RagPipeline {
        RagPipeline::new(
            Arc::new(InMemoryRetriever::empty()),
            ResponseGenerator::new(Arc::new(Echo)),
            4,
        )
    }

    #[tokio::test]
    async fn test_stops_at_exit_command() {
        let input: &[u8] = b"hello\n\nquit\nnever read\n";
        let mut out = Vec::new();
        let history = converse(&pipeline(), input, &mut out).await.unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("mindful> you said: hello"));
        assert!(printed.contains("mindful> Goodbye! Take care. 💙"));
        assert!(!printed.contains("never read"));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_end_of_input() {
        let input: &[u8] = b"one\ntwo";
        let mut out = Vec::new();
        let history = converse(&pipeline(), input, &mut out).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.turns()[2].content, "two");
    }
}
