use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::debug;

use crate::{
    cli::ClientArgs,
    line::{read_line, write_line},
    signal::{ExitSignal, ExitSignals},
};

/// What a line typed at the prompt asks the client to do.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Exit,
    Blank,
    Message(&'a str),
}

pub fn classify_input(line: &str) -> Input<'_> {
    match line.trim() {
        "exit" => Input::Exit,
        "" => Input::Blank,
        text => Input::Message(text),
    }
}

pub fn parse_username(line: &str) -> Result<String> {
    let username = line.trim();
    if username.is_empty() {
        bail!("username cannot be empty");
    }
    Ok(username.to_string())
}

enum LoopExit {
    Finished,
    Signalled(ExitSignal),
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    debug!("connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    let username = prompt_username(&mut stdin, &mut input).await?;
    write_line(&mut writer, &username)
        .await
        .context("failed to send username")?;
    let mut signals = ExitSignals::install().context("failed to install signal handlers")?;
    print_banner(&username).await?;

    let receiver = tokio::spawn(receive_messages(BufReader::new(reader)));
    let exit = run_input_loop(&mut stdin, &mut writer, &mut input, &mut signals).await;
    receiver.abort();
    shutdown_connection(&mut writer).await;

    if let LoopExit::Signalled(signal) = exit? {
        debug!(?signal, "leaving on signal");
        // stdin is read on a blocking thread that would hold up runtime shutdown.
        std::process::exit(0);
    }

    Ok(())
}

async fn prompt_username<R>(stdin: &mut R, input: &mut String) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    write_prompt("Enter your username: ").await?;
    input.clear();
    stdin
        .read_line(input)
        .await
        .context("failed to read username")?;
    parse_username(input)
}

async fn print_banner(username: &str) -> io::Result<()> {
    write_stdout(&format!("Welcome to the chatroom, {username}!")).await?;
    write_stdout("Type 'exit' to quit or press Ctrl+C.").await?;
    write_stdout("------------------------------------").await
}

/// Each pass reads one line and forwards it. The whole pass races the exit
/// signals, so a signal still wins while a write to a stalled server is pending.
async fn run_input_loop<R, W>(
    stdin: &mut R,
    writer: &mut W,
    input: &mut String,
    signals: &mut ExitSignals,
) -> Result<LoopExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        input.clear();
        select! {
            keep_going = forward_next_line(stdin, writer, input) => {
                if !keep_going? {
                    return Ok(LoopExit::Finished);
                }
            }
            signal = signals.recv() => {
                write_stdout("\n\nExiting chatroom...").await?;
                return Ok(LoopExit::Signalled(signal));
            }
        }
    }
}

/// Returns `false` once the client should stop.
async fn forward_next_line<R, W>(stdin: &mut R, writer: &mut W, input: &mut String) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if stdin.read_line(input).await? == 0 {
        write_stdout("Exiting chatroom...").await?;
        return Ok(false);
    }

    match classify_input(input) {
        Input::Exit => {
            write_stdout("Exiting chatroom...").await?;
            Ok(false)
        }
        Input::Blank => Ok(true),
        Input::Message(text) => {
            // The server never echoes our own lines back.
            write_stdout(&format!("You: {text}")).await?;
            if let Err(error) = write_line(writer, text).await {
                write_stdout(&format!("Error sending message: {error}")).await?;
                write_stdout("Server may be down. Exiting...").await?;
                return Ok(false);
            }
            Ok(true)
        }
    }
}

async fn receive_messages(mut reader: BufReader<OwnedReadHalf>) {
    loop {
        match read_line(&mut reader).await {
            Ok(Some(line)) => {
                if write_stdout(line.trim()).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("server closed the connection");
                return;
            }
            Err(error) => {
                debug!(?error, "failed to read from server");
                return;
            }
        }
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        debug!(?error, "failed to shut down connection cleanly");
    }
}

async fn write_prompt(prompt: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await
}

/// Writes one whole line in a single call so the receive task and the input
/// loop never interleave halves of each other's lines.
async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    stdout.write_all(&encoded).await?;
    stdout.flush().await
}
