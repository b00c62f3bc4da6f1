//! Shutting readers down while they produce.

use anyhow::Result;
use ironsplit::testing::*;
use ironsplit::{
    InputFormatReader, OperatorContext, OutputPort, ParallelRegion, Punctuation, ReaderParams,
    ReaderState, StreamItem, channel_sink,
};
use std::sync::mpsc::Receiver;
use std::thread;

const LINES: usize = 50_000;

fn big_input() -> (OperatorContext, std::sync::Arc<ironsplit::MemoryFileSystem>) {
    let data: Vec<u8> = numbered_lines(LINES)
        .iter()
        .flat_map(|l| format!("{l}\n").into_bytes())
        .collect();
    let fs = mock_memory_fs(&[("/in/big.txt", &data)], 64 * 1024);
    let ctx = OperatorContext::new("cancel").register_filesystem(fs.clone());
    (ctx, fs)
}

/// Drain `rx` on another thread until the producer hangs up.
fn drain(rx: Receiver<StreamItem>) -> thread::JoinHandle<Vec<StreamItem>> {
    thread::spawn(move || rx.into_iter().collect())
}

#[test]
fn test_shutdown_stops_a_running_reader() -> Result<()> {
    let (ctx, fs) = big_input();
    let (sink, rx) = channel_sink(1);
    let mut reader = InputFormatReader::initialize(
        ReaderParams::new(["mem:///in/big.txt"]),
        &ctx,
        vec![OutputPort::new(key_value_schema(), sink)],
    )?;
    reader.all_ports_ready()?;

    // The bounded channel holds the producer back until we have seen a few items.
    let mut first = Vec::new();
    for _ in 0..10 {
        first.push(rx.recv()?);
    }
    // Interrupt while the producer is blocked on the full channel, then let it
    // run into the cancellation.
    let token = reader.cancellation_token().expect("running reader has a token");
    token.cancel();
    let rest = drain(rx);

    reader.shutdown()?;
    assert_eq!(reader.state(), ReaderState::Terminated);

    let rest = rest.join().expect("drain thread panicked");
    let total = first.len() + rest.iter().filter(|i| i.as_tuple().is_some()).count();
    assert!(total < LINES, "reader was not interrupted");
    assert!(
        !rest
            .iter()
            .any(|i| i.is_punctuation(Punctuation::FinalMarker))
    );
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn test_cancellation_token_interrupts_production() -> Result<()> {
    let (ctx, fs) = big_input();
    let (sink, rx) = channel_sink(1);
    let mut reader = InputFormatReader::initialize(
        ReaderParams::new(["mem:///in/big.txt"]),
        &ctx,
        vec![OutputPort::new(key_value_schema(), sink)],
    )?;
    let token = reader.cancellation_token().expect("token before start");
    reader.all_ports_ready()?;
    rx.recv()?;
    token.cancel();
    let rest = drain(rx);

    // Cancellation is not reported as a failure.
    reader.join()?;
    let rest = rest.join().expect("drain thread panicked");
    assert!(rest.len() < LINES);
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn test_dropping_a_running_reader_stops_it() -> Result<()> {
    let (ctx, fs) = big_input();
    let (sink, rx) = channel_sink(1);
    let mut reader = InputFormatReader::initialize(
        ReaderParams::new(["mem:///in/big.txt"]),
        &ctx,
        vec![OutputPort::new(key_value_schema(), sink)],
    )?;
    reader.all_ports_ready()?;
    rx.recv()?;
    drop(reader);

    // The producer exits and releases the sender, so draining terminates.
    let rest = drain(rx).join().expect("drain thread panicked");
    assert!(rest.len() < LINES);
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn test_shutdown_of_a_whole_region() -> Result<()> {
    let (ctx, _) = big_input();
    let mut receivers = Vec::new();
    let mut region = ParallelRegion::new(2)?.context(ctx).launch(
        &ReaderParams::new(["mem:///in/big.txt"]),
        |_| {
            let (sink, rx) = channel_sink(1);
            receivers.push(rx);
            OutputPort::new(key_value_schema(), sink)
        },
    )?;
    let drains: Vec<_> = receivers.into_iter().map(drain).collect();

    region.shutdown()?;
    assert!(region.states().iter().all(|s| *s == ReaderState::Terminated));
    for d in drains {
        d.join().expect("drain thread panicked");
    }
    Ok(())
}

#[test]
fn test_dropped_receiver_is_a_sink_error() -> Result<()> {
    let (ctx, _) = big_input();
    let (sink, rx) = channel_sink(1);
    let mut reader = InputFormatReader::initialize(
        ReaderParams::new(["mem:///in/big.txt"]),
        &ctx,
        vec![OutputPort::new(key_value_schema(), sink)],
    )?;
    drop(rx);
    reader.all_ports_ready()?;
    let err = reader.join().unwrap_err();
    assert!(matches!(err, ironsplit::Error::Sink(_)), "unexpected error: {err}");
    Ok(())
}
