//! Interactive event naming.

use async_trait::async_trait;
use lens_library::{DayCount, EventNamer, NamingDecision};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

/// Asks for an event name per date on a line-based terminal.
///
/// An empty answer skips the date, `q` stops asking altogether, and so does
/// the end of input.
pub struct Prompt<R, W> {
    io: Mutex<(R, W)>,
}
impl Prompt<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}
impl<R, W> Prompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { io: Mutex::new((reader, writer)) }
    }
}

fn decide(answer: Option<&str>) -> NamingDecision {
    match answer.map(str::trim) {
        None => NamingDecision::Stop,
        Some("") => NamingDecision::Skip,
        Some(q) if q.eq_ignore_ascii_case("q") => NamingDecision::Stop,
        Some(label) => NamingDecision::Label(label.to_string()),
    }
}

#[async_trait]
impl<R, W> EventNamer for Prompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn name(&self, date: &str, count: DayCount) -> NamingDecision {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;
        let question = format!("{date} ({count}). Event name? [Enter to skip, q to stop] ");
        if writer.write_all(question.as_bytes()).await.is_err() || writer.flush().await.is_err() {
            return NamingDecision::Stop;
        }
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => decide(None),
            Ok(_) => decide(Some(&line)),
        }
    }
}
